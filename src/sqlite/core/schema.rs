//! The schema table (`sqlite_schema`) rooted at page 1.
//!
//! Each row has 5 columns in order:
//! - type: "table", "index", "view" or "trigger"
//! - name: name of the object
//! - tbl_name: table the object belongs to
//! - rootpage: page number of its root b-tree, NULL or 0 for views and triggers
//! - sql: CREATE statement, NULL for automatic indexes

use super::record::Value;
use crate::sqlite::error::{DecodeError, Result};
use crate::sqlite::storage::pager::PageStore;
use crate::sqlite::storage::table::TableScan;
use regex::Regex;
use std::fmt::{self, Display};
use std::io::{Read, Seek};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Page number of the schema table's root
pub const SCHEMA_ROOT_PAGE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Table,
    Index,
    View,
    Trigger,
}

impl FromStr for SchemaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "table" => Ok(SchemaKind::Table),
            "index" => Ok(SchemaKind::Index),
            "view" => Ok(SchemaKind::View),
            "trigger" => Ok(SchemaKind::Trigger),
            _ => Err(format!("unknown schema object type '{}'", s)),
        }
    }
}

impl Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaKind::Table => "table",
            SchemaKind::Index => "index",
            SchemaKind::View => "view",
            SchemaKind::Trigger => "trigger",
        };
        f.write_str(name)
    }
}

/// One row of the schema table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub kind: SchemaKind,
    pub name: String,
    pub table_name: String,
    /// Root b-tree page; 0 when the object has none and must not be read
    pub root_page: u32,
    pub sql: Option<String>,
}

impl SchemaEntry {
    /// Maps the schema columns positionally
    pub fn from_values(values: &[Value]) -> Result<Self> {
        let text = |column: usize, label: &str| -> Result<String> {
            match values.get(column) {
                Some(Value::Text(text)) => Ok(text.clone()),
                other => Err(DecodeError::CorruptRecord {
                    offset: column,
                    reason: format!("schema column {} is {:?}, expected text", label, other),
                }),
            }
        };

        let kind_text = text(0, "type")?;
        let kind = kind_text
            .parse::<SchemaKind>()
            .map_err(|reason| DecodeError::CorruptRecord { offset: 0, reason })?;

        let root_page = match values.get(3) {
            Some(Value::Null) | None => 0,
            Some(Value::Integer(page)) => {
                u32::try_from(*page).map_err(|_| DecodeError::CorruptRecord {
                    offset: 3,
                    reason: format!("rootpage {} is not a page number", page),
                })?
            }
            Some(other) => {
                return Err(DecodeError::CorruptRecord {
                    offset: 3,
                    reason: format!("rootpage is {:?}, expected an integer", other),
                })
            }
        };

        Ok(Self {
            kind,
            name: text(1, "name")?,
            table_name: text(2, "tbl_name")?,
            root_page,
            sql: values.get(4).and_then(Value::as_text).map(str::to_string),
        })
    }

    /// Objects SQLite creates for itself, such as `sqlite_sequence`
    pub fn is_internal(&self) -> bool {
        self.name.starts_with("sqlite_")
    }

    /// Whether the entry has a b-tree that can be read
    pub fn has_root_page(&self) -> bool {
        self.root_page != 0
    }
}

/// Enumerates the schema table in stored order.
///
/// A table-interior page 1 (a schema too large for one page) is walked the
/// same way as any other table b-tree.
pub fn list_schema_entries<R: Read + Seek>(store: &PageStore<R>) -> Result<Vec<SchemaEntry>> {
    let rows = TableScan::new(store, SCHEMA_ROOT_PAGE).rows()?;

    let entries = rows
        .iter()
        .map(|row| {
            SchemaEntry::from_values(&row.values).map_err(|err| DecodeError::CorruptPage {
                page: SCHEMA_ROOT_PAGE,
                reason: format!("schema row {}: {}", row.row_id, err),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!("Found {} schema entries", entries.len());
    Ok(entries)
}

/// A column declared in a CREATE TABLE statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: String,
}

/// Column layout of a table, taken from its CREATE TABLE statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Index of the INTEGER PRIMARY KEY column, stored as NULL and read from the rowid
    pub rowid_alias: Option<usize>,
    pub sql: String,
}

fn column_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)^\s*("(?:[^"]|"")+"|\[[^\]]+\]|`[^`]+`|[^\s(]+)\s*(.*)$"#)
            .expect("column definition regex")
    })
}

fn table_constraint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(CONSTRAINT|PRIMARY\s+KEY|UNIQUE|CHECK|FOREIGN\s+KEY)\b")
            .expect("table constraint regex")
    })
}

fn type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?is)^(.*?)\s*(\bCONSTRAINT\b|\bPRIMARY\b|\bNOT\b|\bNULL\b|\bUNIQUE\b|\bCHECK\b|\bDEFAULT\b|\bCOLLATE\b|\bREFERENCES\b|\bGENERATED\b|\bAS\b|$)",
        )
        .expect("column type regex")
    })
}

fn primary_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bPRIMARY\s+KEY\b").expect("primary key regex"))
}

impl TableSchema {
    /// Extracts the column list from `sql`. Only the column definitions are
    /// looked at; table constraints are skipped.
    pub fn parse(name: &str, sql: &str) -> Self {
        debug!("Parsing schema for table '{}': {}", name, sql);

        let body = match (sql.find('('), sql.rfind(')')) {
            (Some(start), Some(end)) if start < end => &sql[start + 1..end],
            _ => "",
        };

        let mut columns = Vec::new();
        let mut rowid_alias = None;
        for definition in split_top_level(body).into_iter().map(str::trim) {
            if definition.is_empty() || table_constraint_regex().is_match(definition) {
                continue;
            }
            let Some(caps) = column_regex().captures(definition) else {
                continue;
            };

            let name = unquote(&caps[1]);
            let rest = caps.get(2).map_or("", |m| m.as_str());
            let column_type = type_regex()
                .captures(rest)
                .and_then(|c| c.get(1))
                .map_or("", |m| m.as_str())
                .trim()
                .to_string();

            if column_type.eq_ignore_ascii_case("INTEGER") && primary_key_regex().is_match(rest) {
                rowid_alias = Some(columns.len());
            }
            debug!("Found column: {} (type: {})", name, column_type);
            columns.push(ColumnDef { name, column_type });
        }

        TableSchema {
            name: name.to_string(),
            columns,
            rowid_alias,
            sql: sql.to_string(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }
}

/// Splits on commas that are not nested inside parentheses or quotes
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '[') => quote = Some(']'),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn unquote(name: &str) -> String {
    match name.chars().next() {
        Some('"') => strip_one(name, '"', '"').replace("\"\"", "\""),
        Some('[') => strip_one(name, '[', ']').to_string(),
        Some('`') => strip_one(name, '`', '`').replace("``", "`"),
        _ => name.to_string(),
    }
}

/// Removes exactly one `open` and one `close` delimiter
fn strip_one(name: &str, open: char, close: char) -> &str {
    let inner = name.strip_prefix(open).unwrap_or(name);
    inner.strip_suffix(close).unwrap_or(inner)
}
