//! Typed decode errors.
//!
//! Every structural error carries the page, cell or byte offset that produced
//! it so a corrupt file can be diagnosed from the message alone.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database header too short: {len} bytes, expected 100")]
    HeaderTooShort { len: usize },

    #[error("invalid SQLite magic string")]
    InvalidMagic,

    #[error("invalid page size {raw} (must be a power of two between 512 and 65536)")]
    InvalidPageSize { raw: u16 },

    #[error("invalid text encoding {raw}")]
    InvalidTextEncoding { raw: u32 },

    #[error("malformed varint at offset {offset}")]
    MalformedVarint { offset: usize },

    #[error("invalid serial type {serial_type} at offset {offset}")]
    InvalidSerialType { serial_type: i64, offset: usize },

    #[error("unexpected end of data at offset {offset}: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: usize, reason: String },

    #[error("unknown page type 0x{tag:02x} on page {page}")]
    UnknownPageType { page: u32, tag: u8 },

    #[error("page {page} out of range (database has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("short read on page {page}: expected {expected} bytes, got {actual}")]
    ShortRead {
        page: u32,
        expected: usize,
        actual: usize,
    },

    #[error("cell index {index} out of range on page {page} ({cell_count} cells)")]
    CellIndexOutOfRange {
        page: u32,
        index: u16,
        cell_count: u16,
    },

    #[error("corrupt page {page}: {reason}")]
    CorruptPage { page: u32, reason: String },

    #[error("table-interior cells carry no record")]
    NoRecord,

    #[error("payload truncated: {local} of {total} bytes local, overflow continues at page {overflow_page}")]
    TruncatedPayload {
        total: u64,
        local: usize,
        overflow_page: u32,
    },

    #[error("page {page}, cell {index}: {source}")]
    InCell {
        page: u32,
        index: u16,
        #[source]
        source: Box<DecodeError>,
    },

    #[error("table '{name}' not found")]
    TableNotFound { name: String },
}

impl DecodeError {
    /// Attaches page and cell context to an error raised while decoding a cell.
    pub fn in_cell(self, page: u32, index: u16) -> Self {
        match self {
            already @ DecodeError::InCell { .. } => already,
            other => DecodeError::InCell {
                page,
                index,
                source: Box::new(other),
            },
        }
    }

    /// Strips any `InCell` wrappers and returns the underlying error.
    pub fn root_cause(&self) -> &DecodeError {
        match self {
            DecodeError::InCell { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
