//! Builders for synthetic database files, used by unit and integration tests.
//!
//! Everything here writes bytes in the on-disk format without going through
//! the decoder, so tests can check the decoder against hand-built pages.

use std::io::Cursor;

use crate::sqlite::btree::PageType;
use crate::sqlite::core::header::DatabaseHeader;
use crate::sqlite::core::record::Value;
use crate::sqlite::core::varint::{encode_varint, varint_len};
use crate::sqlite::db::Database;
use crate::sqlite::error::Result;

/// Serial type code and body bytes for one value
fn serialize_value(value: &Value) -> (i64, Vec<u8>) {
    match value {
        Value::Null => (0, Vec::new()),
        Value::Integer(0) => (8, Vec::new()),
        Value::Integer(1) => (9, Vec::new()),
        Value::Integer(v) => {
            let (code, width) = match *v {
                v if i8::try_from(v).is_ok() => (1, 1),
                v if i16::try_from(v).is_ok() => (2, 2),
                v if (-(1i64 << 23)..(1i64 << 23)).contains(&v) => (3, 3),
                v if i32::try_from(v).is_ok() => (4, 4),
                v if (-(1i64 << 47)..(1i64 << 47)).contains(&v) => (5, 6),
                _ => (6, 8),
            };
            (code, v.to_be_bytes()[8 - width..].to_vec())
        }
        Value::Real(v) => (7, v.to_be_bytes().to_vec()),
        Value::Text(text) => (13 + 2 * text.len() as i64, text.as_bytes().to_vec()),
        Value::Blob(bytes) => (12 + 2 * bytes.len() as i64, bytes.clone()),
    }
}

/// Encodes values as a record payload: header size, serial types, body
pub fn encode_record(values: &[Value]) -> Vec<u8> {
    let mut types = Vec::new();
    let mut body = Vec::new();
    for value in values {
        let (code, bytes) = serialize_value(value);
        types.extend(encode_varint(code));
        body.extend(bytes);
    }

    // The header size counts its own varint
    let mut header_size = types.len() + 1;
    while types.len() + varint_len(header_size as i64) != header_size {
        header_size = types.len() + varint_len(header_size as i64);
    }

    let mut record = encode_varint(header_size as i64);
    record.extend(types);
    record.extend(body);
    record
}

pub fn table_leaf_cell(row_id: i64, record: &[u8]) -> Vec<u8> {
    let mut cell = encode_varint(record.len() as i64);
    cell.extend(encode_varint(row_id));
    cell.extend_from_slice(record);
    cell
}

pub fn table_interior_cell(left_child_page: u32, key: i64) -> Vec<u8> {
    let mut cell = left_child_page.to_be_bytes().to_vec();
    cell.extend(encode_varint(key));
    cell
}

pub fn index_leaf_cell(record: &[u8]) -> Vec<u8> {
    let mut cell = encode_varint(record.len() as i64);
    cell.extend_from_slice(record);
    cell
}

pub fn index_interior_cell(left_child_page: u32, record: &[u8]) -> Vec<u8> {
    let mut cell = left_child_page.to_be_bytes().to_vec();
    cell.extend(index_leaf_cell(record));
    cell
}

/// A schema table row: type, name, tbl_name, rootpage, sql
pub fn schema_record(
    kind: &str,
    name: &str,
    table_name: &str,
    root_page: Option<i64>,
    sql: &str,
) -> Vec<u8> {
    encode_record(&[
        Value::Text(kind.to_string()),
        Value::Text(name.to_string()),
        Value::Text(table_name.to_string()),
        root_page.map_or(Value::Null, Value::Integer),
        Value::Text(sql.to_string()),
    ])
}

/// Lays out one b-tree page: header, pointer array, and cells packed from the
/// end of the page in the order they were added.
#[derive(Debug, Clone)]
pub struct PageBuilder {
    page_type: PageType,
    cells: Vec<Vec<u8>>,
    rightmost_pointer: Option<u32>,
}

impl PageBuilder {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            cells: Vec::new(),
            rightmost_pointer: if page_type.is_leaf() { None } else { Some(0) },
        }
    }

    pub fn table_leaf() -> Self {
        Self::new(PageType::TableLeaf)
    }

    pub fn table_interior(rightmost_pointer: u32) -> Self {
        Self::new(PageType::TableInterior).with_rightmost(rightmost_pointer)
    }

    pub fn with_rightmost(mut self, page: u32) -> Self {
        self.rightmost_pointer = Some(page);
        self
    }

    /// Adds a pre-encoded cell
    pub fn with_cell(mut self, cell: Vec<u8>) -> Self {
        self.cells.push(cell);
        self
    }

    /// Adds a table leaf row
    pub fn with_row(self, row_id: i64, values: &[Value]) -> Self {
        self.with_cell(table_leaf_cell(row_id, &encode_record(values)))
    }

    pub fn with_interior_cell(self, left_child_page: u32, key: i64) -> Self {
        self.with_cell(table_interior_cell(left_child_page, key))
    }

    /// Renders the page. `is_first_page` leaves the first 100 bytes for the
    /// database header.
    pub fn build(&self, page_size: usize, is_first_page: bool) -> Vec<u8> {
        let mut page = vec![0u8; page_size];
        let header_offset = if is_first_page {
            DatabaseHeader::HEADER_SIZE
        } else {
            0
        };

        let mut content_start = page_size;
        let mut pointers = Vec::with_capacity(self.cells.len());
        for cell in &self.cells {
            content_start -= cell.len();
            page[content_start..content_start + cell.len()].copy_from_slice(cell);
            pointers.push(content_start as u16);
        }

        let header = &mut page[header_offset..];
        header[0] = self.page_type.tag();
        header[3..5].copy_from_slice(&(self.cells.len() as u16).to_be_bytes());
        // 65536 is stored as 0, which `as u16` already produces
        header[5..7].copy_from_slice(&(content_start as u16).to_be_bytes());
        if let Some(pointer) = self.rightmost_pointer {
            header[8..12].copy_from_slice(&pointer.to_be_bytes());
        }

        let array_start = self.page_type.header_size();
        for (i, pointer) in pointers.iter().enumerate() {
            let at = array_start + 2 * i;
            header[at..at + 2].copy_from_slice(&pointer.to_be_bytes());
        }

        page
    }
}

/// A whole synthetic database file
#[derive(Debug, Clone)]
pub struct MockDatabase {
    header: DatabaseHeader,
    pages: Vec<Vec<u8>>,
}

impl MockDatabase {
    /// Starts a file whose page 1 is laid out by `schema_page`
    pub fn new(page_size: u32, schema_page: PageBuilder) -> Self {
        let header = DatabaseHeader {
            page_size,
            ..DatabaseHeader::default()
        };
        let first = schema_page.build(page_size as usize, true);
        Self {
            header,
            pages: vec![first],
        }
    }

    /// A database whose schema lists `tables` as `(name, root_page)` pairs
    pub fn with_tables(page_size: u32, tables: &[(&str, i64)]) -> Self {
        let schema = tables.iter().enumerate().fold(
            PageBuilder::table_leaf(),
            |schema, (i, (name, root_page))| {
                let sql = format!("CREATE TABLE {} (id INTEGER PRIMARY KEY, name TEXT)", name);
                schema.with_cell(table_leaf_cell(
                    i as i64 + 1,
                    &schema_record("table", name, name, Some(*root_page), &sql),
                ))
            },
        );
        Self::new(page_size, schema)
    }

    pub fn header_mut(&mut self) -> &mut DatabaseHeader {
        &mut self.header
    }

    /// Appends the next page
    pub fn with_page(mut self, page: &PageBuilder) -> Self {
        let bytes = page.build(self.header.page_size as usize, false);
        self.pages.push(bytes);
        self
    }

    /// Appends raw bytes as the next page
    pub fn with_raw_page(mut self, bytes: Vec<u8>) -> Self {
        self.pages.push(bytes);
        self
    }

    /// Serializes the file, filling the header's page count
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = DatabaseHeader {
            page_count: self.pages.len() as u32,
            ..self.header.clone()
        };

        let mut file: Vec<u8> = self.pages.concat();
        file[..DatabaseHeader::HEADER_SIZE].copy_from_slice(&header.to_bytes());
        file
    }

    /// Opens the file from memory
    pub fn open(&self) -> Result<Database<Cursor<Vec<u8>>>> {
        Database::from_reader(Cursor::new(self.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::core::record::decode_record;

    #[test]
    fn test_encoded_record_decodes() -> Result<()> {
        let values = vec![
            Value::Null,
            Value::Integer(0),
            Value::Integer(1),
            Value::Integer(-100),
            Value::Integer(70_000),
            Value::Integer(1 << 40),
            Value::Integer(i64::MAX),
            Value::Real(3.25),
            Value::Text("text".into()),
            Value::Blob(vec![1, 2, 3]),
        ];
        assert_eq!(decode_record(&encode_record(&values))?.into_values(), values);
        Ok(())
    }

    #[test]
    fn test_long_header_size_counts_itself() -> Result<()> {
        // 127 one-byte serial types push the header size to a two byte varint
        let values = vec![Value::Null; 127];
        let record = encode_record(&values);
        assert_eq!(&record[..2], &encode_varint(129)[..]);
        assert_eq!(decode_record(&record)?.len(), 127);
        Ok(())
    }
}
