pub mod sqlite;
pub mod utils;

pub use sqlite::core::cell::Cell;
pub use sqlite::core::header::DatabaseHeader;
pub use sqlite::core::record::{Record, Value};
pub use sqlite::core::schema::{SchemaEntry, SchemaKind, TableSchema};
pub use sqlite::storage::pager::Page;
pub use sqlite::storage::table::Row;
pub use sqlite::{BTreePage, Database, DatabaseInfo, DecodeError, PageType, Result};
