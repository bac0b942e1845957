//! SQLite Record Format Implementation
//!
//! This module handles parsing SQLite records (rows) according to the file format specification.
//!
//! ## Record Format
//!
//! A record consists of:
//!
//! - A header containing:
//!   - Header size (varint), counting itself
//!   - Serial type codes (sequence of varints), one per column
//! - The column values, contiguous and in header order
//!
//! The serial type codes in the header describe the data type and size of each field:
//!
//! - 0: NULL
//! - 1: 8-bit signed int
//! - 2: 16-bit signed int
//! - 3: 24-bit signed int
//! - 4: 32-bit signed int
//! - 5: 48-bit signed int
//! - 6: 64-bit signed int
//! - 7: IEEE 754 64-bit float
//! - 8: integer 0
//! - 9: integer 1
//! - 10,11: Reserved for internal use, never valid on disk
//! - N >= 12 and even: BLOB of (N-12)/2 bytes
//! - N >= 13 and odd: Text of (N-13)/2 bytes
//!
//! Decoding walks two cursors in lockstep: one over the serial types in the
//! header, one over the values in the body.

use super::header::TextEncoding;
use super::varint::Varint;
use crate::sqlite::error::{DecodeError, Result};
use std::fmt::{self, Display};
use tracing::trace;

/// Storage class and width of one column, as declared in a record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialType {
    Null,
    Int8,
    Int16,
    Int24,
    Int32,
    Int48,
    Int64,
    Float64,
    Zero,
    One,
    Blob(usize),
    Text(usize),
}

impl SerialType {
    /// Maps a serial type code to its decoding rule. `offset` is only used to
    /// report where an invalid code was found.
    pub fn from_code(code: i64, offset: usize) -> Result<Self> {
        let serial_type = match code {
            0 => SerialType::Null,
            1 => SerialType::Int8,
            2 => SerialType::Int16,
            3 => SerialType::Int24,
            4 => SerialType::Int32,
            5 => SerialType::Int48,
            6 => SerialType::Int64,
            7 => SerialType::Float64,
            8 => SerialType::Zero,
            9 => SerialType::One,
            n if n >= 12 && n % 2 == 0 => SerialType::Blob(((n - 12) / 2) as usize),
            n if n >= 13 => SerialType::Text(((n - 13) / 2) as usize),
            _ => {
                return Err(DecodeError::InvalidSerialType {
                    serial_type: code,
                    offset,
                })
            }
        };
        Ok(serial_type)
    }

    /// Number of body bytes a value of this type occupies
    pub fn size(&self) -> usize {
        match *self {
            SerialType::Null | SerialType::Zero | SerialType::One => 0,
            SerialType::Int8 => 1,
            SerialType::Int16 => 2,
            SerialType::Int24 => 3,
            SerialType::Int32 => 4,
            SerialType::Int48 => 6,
            SerialType::Int64 | SerialType::Float64 => 8,
            SerialType::Blob(len) | SerialType::Text(len) => len,
        }
    }
}

/// A decoded column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(value) => write!(f, "{}", value),
            Value::Real(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{:.1}", value)
            }
            Value::Real(value) => write!(f, "{}", value),
            Value::Text(text) => write!(f, "{}", text),
            Value::Blob(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// Where a payload stops being local: the rest lives on overflow pages that are
/// never followed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    /// Declared payload length
    pub total: u64,
    /// Bytes present on the page
    pub local: usize,
    /// First page of the overflow chain
    pub overflow_page: u32,
}

impl From<Truncation> for DecodeError {
    fn from(t: Truncation) -> Self {
        DecodeError::TruncatedPayload {
            total: t.total,
            local: t.local,
            overflow_page: t.overflow_page,
        }
    }
}

/// Values decoded from one record.
///
/// A record decoded from a truncated payload holds only the columns that were
/// fully local and remembers the truncation so callers can decide whether a
/// partial row is acceptable.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
    truncation: Option<Truncation>,
}

impl Record {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, column: usize) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn truncation(&self) -> Option<Truncation> {
        self.truncation
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    /// Returns the values, or [`DecodeError::TruncatedPayload`] if part of
    /// the record lives on overflow pages
    pub fn into_complete(self) -> Result<Vec<Value>> {
        match self.truncation {
            Some(truncation) => Err(truncation.into()),
            None => Ok(self.values),
        }
    }
}

/// Cursor pair over one record: `header_pos` walks the serial types,
/// `body_pos` walks the values they describe.
pub struct RecordReader<'a> {
    data: &'a [u8],
    header_pos: usize,
    header_end: usize,
    body_pos: usize,
    encoding: TextEncoding,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8], encoding: TextEncoding) -> Result<Self> {
        let (header_size, consumed) = data.read_varint(0)?;
        let header_end = usize::try_from(header_size).map_err(|_| DecodeError::CorruptRecord {
            offset: 0,
            reason: format!("negative header size {}", header_size),
        })?;

        if header_end < consumed {
            return Err(DecodeError::CorruptRecord {
                offset: 0,
                reason: format!(
                    "header size {} smaller than its own varint ({} bytes)",
                    header_end, consumed
                ),
            });
        }
        if header_end > data.len() {
            return Err(DecodeError::UnexpectedEof {
                offset: 0,
                needed: header_end,
                available: data.len(),
            });
        }

        Ok(Self {
            data,
            header_pos: consumed,
            header_end,
            body_pos: header_end,
            encoding,
        })
    }

    /// Reads the next serial type from the header cursor, or `None` once the
    /// header is exhausted
    pub fn next_serial_type(&mut self) -> Result<Option<SerialType>> {
        if self.header_pos >= self.header_end {
            return Ok(None);
        }
        let offset = self.header_pos;
        // A serial type may not straddle the end of the header
        let (code, consumed) = self.data[..self.header_end].read_varint(offset)?;
        self.header_pos += consumed;
        SerialType::from_code(code, offset).map(Some)
    }

    /// Reads one value of `serial_type` from the body cursor
    pub fn read_value(&mut self, serial_type: SerialType) -> Result<Value> {
        let size = serial_type.size();
        let bytes = self.take(size)?;
        let value = match serial_type {
            SerialType::Null => Value::Null,
            SerialType::Zero => Value::Integer(0),
            SerialType::One => Value::Integer(1),
            SerialType::Int8
            | SerialType::Int16
            | SerialType::Int24
            | SerialType::Int32
            | SerialType::Int48
            | SerialType::Int64 => Value::Integer(read_signed(bytes)),
            SerialType::Float64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Value::Real(f64::from_be_bytes(raw))
            }
            SerialType::Blob(_) => Value::Blob(bytes.to_vec()),
            SerialType::Text(_) => Value::Text(decode_text(bytes, self.encoding)),
        };
        Ok(value)
    }

    /// Whether a value of `serial_type` fits in the remaining body bytes
    pub fn fits(&self, serial_type: SerialType) -> bool {
        self.body_pos + serial_type.size() <= self.data.len()
    }

    fn take(&mut self, size: usize) -> Result<&'a [u8]> {
        let end = self.body_pos + size;
        if end > self.data.len() {
            return Err(DecodeError::UnexpectedEof {
                offset: self.body_pos,
                needed: size,
                available: self.data.len() - self.body_pos,
            });
        }
        let bytes = &self.data[self.body_pos..end];
        self.body_pos = end;
        Ok(bytes)
    }
}

/// Reads only the serial types of a record header
pub fn read_record_header(payload: &[u8]) -> Result<Vec<SerialType>> {
    let mut reader = RecordReader::new(payload, TextEncoding::Utf8)?;
    let mut serial_types = Vec::new();
    while let Some(serial_type) = reader.next_serial_type()? {
        serial_types.push(serial_type);
    }
    Ok(serial_types)
}

/// Decodes a complete UTF-8 record payload
pub fn decode_record(payload: &[u8]) -> Result<Record> {
    decode_record_with_encoding(payload, TextEncoding::Utf8)
}

/// Decodes a complete record payload, reading text in `encoding`
pub fn decode_record_with_encoding(payload: &[u8], encoding: TextEncoding) -> Result<Record> {
    let mut reader = RecordReader::new(payload, encoding)?;
    let mut values = Vec::new();

    while let Some(serial_type) = reader.next_serial_type()? {
        values.push(reader.read_value(serial_type)?);
    }

    trace!(columns = values.len(), "decoded record");
    Ok(Record {
        values,
        truncation: None,
    })
}

/// Decodes the local prefix of a payload whose tail lives on overflow pages.
///
/// Stops at the first column that does not fit locally. If the header itself
/// is not local, no columns are returned.
pub fn decode_partial_record(
    local: &[u8],
    encoding: TextEncoding,
    truncation: Truncation,
) -> Result<Record> {
    let mut values = Vec::new();

    let mut reader = match RecordReader::new(local, encoding) {
        Ok(reader) => reader,
        Err(DecodeError::UnexpectedEof { .. }) | Err(DecodeError::MalformedVarint { .. }) => {
            return Ok(Record {
                values,
                truncation: Some(truncation),
            })
        }
        Err(err) => return Err(err),
    };

    while let Some(serial_type) = reader.next_serial_type()? {
        if !reader.fits(serial_type) {
            break;
        }
        values.push(reader.read_value(serial_type)?);
    }

    trace!(
        columns = values.len(),
        local = truncation.local,
        total = truncation.total,
        "decoded partial record"
    );
    Ok(Record {
        values,
        truncation: Some(truncation),
    })
}

/// Sign-extends a big-endian two's complement integer of 1 to 8 bytes
fn read_signed(bytes: &[u8]) -> i64 {
    let fill = if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        0xff
    } else {
        0x00
    };
    let mut raw = [fill; 8];
    raw[8 - bytes.len()..].copy_from_slice(bytes);
    i64::from_be_bytes(raw)
}

fn decode_text(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        TextEncoding::Utf16le => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        TextEncoding::Utf16be => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
    }
}
