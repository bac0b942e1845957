//! SQLite File Format Implementation
//!
//! This module is the entry point for reading SQLite database files according
//! to the SQLite file format specification.
//!
//! # SQLite File Structure
//!
//! A SQLite database file consists of one or more pages of equal size. The
//! first page (page 1) contains:
//!
//! - Database header (100 bytes)
//! - Root page of the sqlite_schema table
//!
//! Page `n` starts at file offset `(n - 1) * page_size`.
//!
//! ## B-tree Page Structure
//!
//! Each page reachable from the schema is a B-tree page that contains:
//!
//! - Page header (8 bytes on leaves, 12 on interior pages)
//! - Cell pointer array
//! - Unallocated space
//! - Cell content area
//! - Reserved region
//!
//! ### B-tree Page Header Format
//!
//! - Byte 0: Page type
//! - Bytes 1-2: First freeblock offset
//! - Bytes 3-4: Number of cells
//! - Bytes 5-6: Cell content offset
//! - Byte 7: Number of fragmented free bytes
//! - Bytes 8-11: Right-most child page (interior pages only)
//!
//! Cell pointers are offsets from the start of the physical page, including on
//! page 1 where the b-tree header itself starts at byte 100.

use crate::sqlite::core::header::DatabaseHeader;
use crate::sqlite::core::schema::{list_schema_entries, SchemaEntry, SchemaKind, TableSchema};
use crate::sqlite::error::{DecodeError, Result};
use crate::sqlite::storage::pager::{Page, PageStore};
use crate::sqlite::storage::table::{Row, TableScan};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Represents an open SQLite database file
#[derive(Debug)]
pub struct Database<R = File> {
    store: PageStore<R>,
}

/// Contains metadata about a SQLite database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseInfo {
    page_size: u32,
    page_count: u32,
    num_tables: usize,
}

impl DatabaseInfo {
    /// Returns the page size in bytes
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Returns the number of tables in the schema, internal ones included
    pub fn num_tables(&self) -> usize {
        self.num_tables
    }
}

impl Database<File> {
    /// Opens a SQLite database file at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            store: PageStore::open(path)?,
        })
    }
}

impl<R: Read + Seek> Database<R> {
    /// Opens a database held by any seekable reader, such as an in-memory buffer
    pub fn from_reader(source: R) -> Result<Self> {
        Ok(Self {
            store: PageStore::from_reader(source)?,
        })
    }

    pub fn header(&self) -> &DatabaseHeader {
        self.store.header()
    }

    pub fn store(&self) -> &PageStore<R> {
        &self.store
    }

    /// Returns page `number` (1-based); use [`Page::btree`] to decode it
    pub fn page(&self, number: u32) -> Result<Arc<Page>> {
        self.store.get_page(number)
    }

    /// Every entry of the schema table in stored order
    pub fn schema(&self) -> Result<Vec<SchemaEntry>> {
        list_schema_entries(&self.store)
    }

    /// User tables, leaving out SQLite's internal `sqlite_` tables
    pub fn tables(&self) -> Result<Vec<SchemaEntry>> {
        Ok(self
            .schema()?
            .into_iter()
            .filter(|entry| entry.kind == SchemaKind::Table && !entry.is_internal())
            .collect())
    }

    /// Looks up a table by name, ignoring ASCII case
    pub fn find_table(&self, name: &str) -> Result<SchemaEntry> {
        self.schema()?
            .into_iter()
            .find(|entry| entry.kind == SchemaKind::Table && entry.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| DecodeError::TableNotFound {
                name: name.to_string(),
            })
    }

    /// Column layout of table `name`
    pub fn table_schema(&self, name: &str) -> Result<TableSchema> {
        let entry = self.find_table(name)?;
        Ok(TableSchema::parse(
            &entry.name,
            entry.sql.as_deref().unwrap_or_default(),
        ))
    }

    /// Reads every row of table `name` in rowid order. An `INTEGER PRIMARY KEY`
    /// column is filled in from the row id.
    pub fn scan(&self, name: &str) -> Result<Vec<Row>> {
        let entry = self.find_table(name)?;
        let schema = TableSchema::parse(&entry.name, entry.sql.as_deref().unwrap_or_default());
        info!("Scanning table '{}' from root page {}", entry.name, entry.root_page);

        let mut rows = TableScan::new(&self.store, entry.root_page).rows()?;
        if let Some(column) = schema.rowid_alias {
            debug!("Column {} aliases the rowid", column);
            for row in &mut rows {
                row.resolve_rowid_alias(column);
            }
        }
        Ok(rows)
    }

    /// Number of rows in table `name`
    pub fn count(&self, name: &str) -> Result<usize> {
        let entry = self.find_table(name)?;
        TableScan::new(&self.store, entry.root_page).count()
    }

    /// Reads the page geometry and counts the tables in the schema
    pub fn info(&self) -> Result<DatabaseInfo> {
        let num_tables = self
            .schema()?
            .iter()
            .filter(|entry| entry.kind == SchemaKind::Table)
            .count();

        Ok(DatabaseInfo {
            page_size: self.store.page_size(),
            page_count: self.store.page_count(),
            num_tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::core::record::Value;
    use crate::utils::mock::{schema_record, table_leaf_cell, MockDatabase, PageBuilder};

    fn fruit_db() -> MockDatabase {
        let sql =
            "CREATE TABLE apples (id integer primary key autoincrement, name text, color text)";
        let schema = PageBuilder::table_leaf()
            .with_cell(table_leaf_cell(
                1,
                &schema_record("table", "apples", "apples", Some(2), sql),
            ))
            .with_cell(table_leaf_cell(
                2,
                &schema_record(
                    "table",
                    "sqlite_sequence",
                    "sqlite_sequence",
                    Some(3),
                    "CREATE TABLE sqlite_sequence(name,seq)",
                ),
            ));

        MockDatabase::new(1024, schema)
            .with_page(
                &PageBuilder::table_leaf()
                    .with_row(
                        1,
                        &[
                            Value::Null,
                            Value::Text("Granny Smith".into()),
                            Value::Text("Light Green".into()),
                        ],
                    )
                    .with_row(
                        2,
                        &[
                            Value::Null,
                            Value::Text("Fuji".into()),
                            Value::Text("Red".into()),
                        ],
                    ),
            )
            .with_page(&PageBuilder::table_leaf())
    }

    #[test]
    fn test_info() -> Result<()> {
        let db = fruit_db().open()?;
        let info = db.info()?;
        assert_eq!(info.page_size(), 1024);
        assert_eq!(info.page_count(), 3);
        assert_eq!(info.num_tables(), 2);
        Ok(())
    }

    #[test]
    fn test_tables_skip_internal() -> Result<()> {
        let db = fruit_db().open()?;
        let names: Vec<_> = db.tables()?.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["apples"]);
        Ok(())
    }

    #[test]
    fn test_scan_resolves_rowid_alias() -> Result<()> {
        let db = fruit_db().open()?;
        let rows = db.scan("APPLES")?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].to_string(), "1|Granny Smith|Light Green");
        assert_eq!(rows[1].get(0), Some(&Value::Integer(2)));
        assert_eq!(db.count("apples")?, 2);
        Ok(())
    }

    #[test]
    fn test_missing_table() -> Result<()> {
        let db = fruit_db().open()?;
        assert!(matches!(
            db.scan("pears"),
            Err(DecodeError::TableNotFound { name }) if name == "pears"
        ));
        Ok(())
    }

    #[test]
    fn test_table_schema() -> Result<()> {
        let db = fruit_db().open()?;
        let schema = db.table_schema("apples")?;
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.rowid_alias, Some(0));
        Ok(())
    }
}
