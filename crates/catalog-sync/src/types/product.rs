//! Product rows of the exported catalog

use serde::{Deserialize, Serialize};

/// Column names of a catalog file, in file order
pub const CATALOG_COLUMNS: [&str; 5] = ["namaitem", "konversi", "satuan", "hargapokok", "hargajual"];

/// Extension of exported catalog files
pub const CATALOG_EXTENSION: &str = "csv";

/// One (item, unit of sale) row
///
/// Derived from the item master, item-unit and item-price-by-unit tables. Uniqueness
/// is (name, unit) in practice but is not enforced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    /// Item name
    #[serde(rename = "namaitem")]
    pub name: String,
    /// Base units per unit of sale
    #[serde(rename = "konversi")]
    pub conversion_factor: f64,
    /// Unit of sale (KG, PACK, PCS, ...)
    #[serde(rename = "satuan")]
    pub unit: String,
    /// Cost price per unit of sale
    #[serde(rename = "hargapokok")]
    pub cost_price: f64,
    /// Selling price per unit of sale
    #[serde(rename = "hargajual")]
    pub sell_price: f64,
}

impl ProductRecord {
    pub fn new(
        name: impl Into<String>,
        conversion_factor: f64,
        unit: impl Into<String>,
        cost_price: f64,
        sell_price: f64,
    ) -> Self {
        Self {
            name: name.into(),
            conversion_factor,
            unit: unit.into(),
            cost_price,
            sell_price,
        }
    }
}
