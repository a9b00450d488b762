//! Bot-side product catalog
//!
//! `CatalogIndex` holds the latest exported catalog in memory and answers searches;
//! `CatalogResponder` turns the three bot operations into reply text.

mod index;
mod reply;

pub use index::{CatalogIndex, CatalogSnapshot, SearchResults};
pub use reply::{format_rupiah, CatalogResponder};
