//! Dropbox backup source
//!
//! Uses the Dropbox HTTP API directly:
//! - OAuth2 refresh-token exchange for short-lived access tokens
//! - `files/list_folder` (+ `/continue`) to enumerate backups
//! - `files/get_temporary_link` to fetch the newest one

mod auth;
mod client;

pub use auth::DropboxAuth;
pub use client::DropboxBackupSource;
