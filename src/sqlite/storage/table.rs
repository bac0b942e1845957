//! Table b-tree traversal.
//!
//! Interior pages hand out their left children in pointer order and then the
//! right-most child, so a depth-first walk yields rows in rowid order.

use crate::sqlite::btree::BTreePage;
use crate::sqlite::core::cell::Cell;
use crate::sqlite::core::record::{Truncation, Value};
use crate::sqlite::error::{DecodeError, Result};
use crate::sqlite::storage::pager::PageStore;
use itertools::Itertools;
use std::collections::HashSet;
use std::fmt::{self, Display};
use std::io::{Read, Seek};
use tracing::debug;

/// One table row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub row_id: i64,
    pub values: Vec<Value>,
    /// Set when trailing columns live on an overflow chain and are missing
    pub truncation: Option<Truncation>,
}

impl Row {
    /// Fills an `INTEGER PRIMARY KEY` column, which is stored as NULL, with
    /// the row id
    pub fn resolve_rowid_alias(&mut self, column: usize) {
        if let Some(value @ Value::Null) = self.values.get_mut(column) {
            *value = Value::Integer(self.row_id);
        }
    }

    pub fn get(&self, column: usize) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.values.iter().join("|"))
    }
}

/// Depth-first reader over the table b-tree rooted at `root_page`
#[derive(Debug)]
pub struct TableScan<'s, R> {
    store: &'s PageStore<R>,
    root_page: u32,
}

impl<'s, R: Read + Seek> TableScan<'s, R> {
    pub fn new(store: &'s PageStore<R>, root_page: u32) -> Self {
        Self { store, root_page }
    }

    /// Decodes every row in rowid order
    pub fn rows(&self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        self.walk(self.root_page, &mut HashSet::new(), &mut |leaf: &BTreePage<'_>| {
            for index in 0..leaf.cell_count() {
                if let Cell::TableLeaf {
                    row_id, payload, ..
                } = leaf.cell(index)?
                {
                    let record = payload
                        .record()
                        .map_err(|err| err.in_cell(leaf.number(), index))?;
                    let truncation = record.truncation();
                    rows.push(Row {
                        row_id,
                        values: record.into_values(),
                        truncation,
                    });
                }
            }
            Ok(())
        })?;

        debug!("Scanned {} rows from root page {}", rows.len(), self.root_page);
        Ok(rows)
    }

    /// Counts rows from the leaf cell counts without decoding any record
    pub fn count(&self) -> Result<usize> {
        let mut count = 0;
        self.walk(self.root_page, &mut HashSet::new(), &mut |leaf: &BTreePage<'_>| {
            count += usize::from(leaf.cell_count());
            Ok(())
        })?;
        Ok(count)
    }

    /// Visits the leaves under `number`. A well-formed tree reaches each page
    /// once; a second visit to any page in `visited` is corruption.
    fn walk<F>(&self, number: u32, visited: &mut HashSet<u32>, visit_leaf: &mut F) -> Result<()>
    where
        F: FnMut(&BTreePage<'_>) -> Result<()>,
    {
        if !visited.insert(number) {
            return Err(DecodeError::CorruptPage {
                page: number,
                reason: format!("b-tree reaches page {} more than once", number),
            });
        }

        let page = self.store.get_page(number)?;
        let btree = page.btree()?;
        let page_type = btree.page_type();
        if !page_type.is_table() {
            return Err(DecodeError::CorruptPage {
                page: number,
                reason: format!("expected a table b-tree page, found {}", page_type),
            });
        }

        if page_type.is_leaf() {
            return visit_leaf(&btree);
        }

        for child in btree.child_pages()? {
            self.walk(child, visited, visit_leaf)?;
        }
        Ok(())
    }
}
