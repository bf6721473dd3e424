//! # lectern-store
//!
//! Account, library and scan-ledger state for the Lectern media server.
//!
//! The crate is synchronous. User accounts are persisted as JSON documents in
//! a SQLite database through the [`Database`] handle; every document passes
//! through [`migrations::normalize_loaded_account`] on the way out so older
//! shapes are upgraded in one place. Scan runs are written as JSON-lines log
//! files rather than database rows.

pub mod account;
pub mod database;
pub mod migrations;
pub mod models;
pub mod scans;
pub mod users;

mod error;

pub use account::{
    AccountType, AudioBookmark, MediaProgress, MediaProgressUpdate, Permissions,
    PermissionsUpdate, TagAccessMode, UserAccount, UserAccountUpdate,
};
pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use scans::{LogLevel, ScanKind, ScanLogEntry, ScanRun};
