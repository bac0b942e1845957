//! Read-only decoder for the SQLite database file format.

pub mod btree;
pub mod core;
pub mod db;
pub mod error;
pub mod storage;

pub use btree::{BTreePage, PageType};
pub use db::{Database, DatabaseInfo};
pub use error::{DecodeError, Result};
