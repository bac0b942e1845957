#![allow(dead_code)]

use sqlite_decoder::utils::mock::{schema_record, table_leaf_cell, MockDatabase, PageBuilder};
use sqlite_decoder::Value;
use std::io::Write;
use tempfile::NamedTempFile;

/// Three user tables `a`, `b`, `c` at root pages 2, 3 and 4, each holding a
/// single row
pub fn three_table_db(page_size: u32) -> MockDatabase {
    ["a", "b", "c"].iter().enumerate().fold(
        MockDatabase::with_tables(page_size, &[("a", 2), ("b", 3), ("c", 4)]),
        |db, (i, name)| {
            db.with_page(&PageBuilder::table_leaf().with_row(
                1,
                &[Value::Null, Value::Text(format!("{}-{}", name, i))],
            ))
        },
    )
}

/// Schema with a table `fruit` at page 2, a view without a root page and an
/// index at page 3
pub fn mixed_schema_db() -> MockDatabase {
    let schema = PageBuilder::table_leaf()
        .with_cell(table_leaf_cell(
            1,
            &schema_record(
                "table",
                "fruit",
                "fruit",
                Some(2),
                "CREATE TABLE fruit (id INTEGER PRIMARY KEY, name TEXT NOT NULL, weight REAL)",
            ),
        ))
        .with_cell(table_leaf_cell(
            2,
            &schema_record(
                "view",
                "heavy",
                "heavy",
                None,
                "CREATE VIEW heavy AS SELECT * FROM fruit WHERE weight > 1",
            ),
        ))
        .with_cell(table_leaf_cell(
            3,
            &schema_record(
                "index",
                "fruit_name",
                "fruit",
                Some(3),
                "CREATE INDEX fruit_name ON fruit (name)",
            ),
        ));

    MockDatabase::new(4096, schema)
        .with_page(
            &PageBuilder::table_leaf()
                .with_row(1, &[Value::Null, Value::Text("fig".into()), Value::Real(0.5)])
                .with_row(2, &[Value::Null, Value::Text("melon".into()), Value::Real(2.0)]),
        )
        .with_page(&PageBuilder::new(sqlite_decoder::PageType::IndexLeaf))
}

/// Writes the database to a temporary file that lives as long as the handle
pub fn write_temp(db: &MockDatabase) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(&db.to_bytes()).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}
