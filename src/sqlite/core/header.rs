//! SQLite Database Header Implementation
//!
//! Handles parsing of the SQLite database header (first 100 bytes of the file)
//! according to the file format specification.
//!
//! ## Database Header Format (First 100 bytes)
//!
//! - Bytes 0-15: Header string "SQLite format 3\0"
//! - Bytes 16-17: Page size in bytes (big-endian, 1 means 65536)
//! - Byte 18: File format write version
//! - Byte 19: File format read version
//! - Byte 20: Reserved space at end of each page
//! - Bytes 21-23: Maximum embedded payload fraction, minimum embedded payload fraction, leaf payload fraction
//! - Bytes 24-27: File change counter
//! - Bytes 28-31: Size of database file in pages
//! - Bytes 32-35: First freelist trunk page
//! - Bytes 36-39: Total number of freelist pages
//! - Bytes 40-43: Schema cookie
//! - Bytes 44-47: Schema format number
//! - Bytes 48-51: Default page cache size
//! - Bytes 52-55: Largest root b-tree page number
//! - Bytes 56-59: Database text encoding (1:UTF-8, 2:UTF-16le, 3:UTF-16be)
//! - Bytes 60-63: User version
//! - Bytes 64-67: Incremental vacuum mode
//! - Bytes 68-71: Application ID
//! - Bytes 72-91: Reserved for expansion
//! - Bytes 92-95: Version-valid-for number
//! - Bytes 96-99: SQLite version number

use super::{parse_u16, parse_u32, parse_u8, skip, ParseResult};
use crate::sqlite::error::{DecodeError, Result};
use tracing::debug;

/// Text encoding used for every string in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16le,
    Utf16be,
}

impl TextEncoding {
    fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            // A freshly created, still empty file stores 0
            0 | 1 => Ok(TextEncoding::Utf8),
            2 => Ok(TextEncoding::Utf16le),
            3 => Ok(TextEncoding::Utf16be),
            _ => Err(DecodeError::InvalidTextEncoding { raw }),
        }
    }

    fn to_raw(self) -> u32 {
        match self {
            TextEncoding::Utf8 => 1,
            TextEncoding::Utf16le => 2,
            TextEncoding::Utf16be => 3,
        }
    }
}

/// Represents the SQLite database header (first 100 bytes)
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseHeader {
    /// Page size in bytes, already remapped so 65536 is representable
    pub page_size: u32,
    /// File format write version (byte 18)
    pub write_version: u8,
    /// File format read version (byte 19)
    pub read_version: u8,
    /// Reserved space at end of each page (byte 20)
    pub reserved_space: u8,
    /// Maximum embedded payload fraction (byte 21)
    pub max_payload_fraction: u8,
    /// Minimum embedded payload fraction (byte 22)
    pub min_payload_fraction: u8,
    /// Leaf payload fraction (byte 23)
    pub leaf_payload_fraction: u8,
    /// File change counter (bytes 24-27)
    pub file_change_counter: u32,
    /// Size of database file in pages (bytes 28-31)
    pub page_count: u32,
    /// First freelist trunk page (bytes 32-35)
    pub first_freelist_trunk: u32,
    /// Total number of freelist pages (bytes 36-39)
    pub total_freelist_pages: u32,
    /// Schema cookie (bytes 40-43)
    pub schema_cookie: u32,
    /// Schema format number (bytes 44-47)
    pub schema_format: u32,
    /// Default page cache size (bytes 48-51)
    pub page_cache_size: u32,
    /// Largest root b-tree page number (bytes 52-55)
    pub largest_root_page: u32,
    /// Database text encoding (bytes 56-59)
    pub text_encoding: TextEncoding,
    /// User version (bytes 60-63)
    pub user_version: u32,
    /// Incremental vacuum mode (bytes 64-67)
    pub incremental_vacuum: u32,
    /// Application ID (bytes 68-71)
    pub application_id: u32,
    /// Version valid for number (bytes 92-95)
    pub version_valid_for: u32,
    /// SQLite version number (bytes 96-99)
    pub sqlite_version_number: u32,
}

impl Default for DatabaseHeader {
    fn default() -> Self {
        Self {
            page_size: 4096,
            write_version: 1,
            read_version: 1,
            reserved_space: 0,
            max_payload_fraction: 64,
            min_payload_fraction: 32,
            leaf_payload_fraction: 32,
            file_change_counter: 1,
            page_count: 1,
            first_freelist_trunk: 0,
            total_freelist_pages: 0,
            schema_cookie: 1,
            schema_format: 4,
            page_cache_size: 0,
            largest_root_page: 0,
            text_encoding: TextEncoding::Utf8,
            user_version: 0,
            incremental_vacuum: 0,
            application_id: 0,
            version_valid_for: 1,
            sqlite_version_number: 3_045_000,
        }
    }
}

impl DatabaseHeader {
    /// Size of the SQLite database header in bytes
    pub const HEADER_SIZE: usize = 100;

    /// Magic string that should appear at the start of every SQLite file
    pub const MAGIC_STRING: &'static [u8; 16] = b"SQLite format 3\0";

    pub const MIN_PAGE_SIZE: u32 = 512;
    pub const MAX_PAGE_SIZE: u32 = 65536;

    /// Parses a database header from raw bytes
    pub fn parse(header_bytes: &[u8]) -> Result<Self> {
        if header_bytes.len() < Self::HEADER_SIZE {
            return Err(DecodeError::HeaderTooShort {
                len: header_bytes.len(),
            });
        }

        if &header_bytes[..16] != Self::MAGIC_STRING {
            return Err(DecodeError::InvalidMagic);
        }

        let (_, header) = parse_fields(&header_bytes[16..Self::HEADER_SIZE]).map_err(|_| {
            DecodeError::HeaderTooShort {
                len: header_bytes.len(),
            }
        })?;
        let header = header?;

        debug!(
            page_size = header.page_size,
            page_count = header.page_count,
            "parsed database header"
        );
        Ok(header)
    }

    /// Serializes the header back into its 100-byte on-disk form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(Self::HEADER_SIZE);

        // 65536 does not fit in two bytes and is stored as 1
        let raw_page_size: u16 = if self.page_size == Self::MAX_PAGE_SIZE {
            1
        } else {
            self.page_size as u16
        };

        buffer.extend_from_slice(Self::MAGIC_STRING);
        buffer.extend_from_slice(&raw_page_size.to_be_bytes());
        buffer.push(self.write_version);
        buffer.push(self.read_version);
        buffer.push(self.reserved_space);
        buffer.push(self.max_payload_fraction);
        buffer.push(self.min_payload_fraction);
        buffer.push(self.leaf_payload_fraction);
        for field in [
            self.file_change_counter,
            self.page_count,
            self.first_freelist_trunk,
            self.total_freelist_pages,
            self.schema_cookie,
            self.schema_format,
            self.page_cache_size,
            self.largest_root_page,
            self.text_encoding.to_raw(),
            self.user_version,
            self.incremental_vacuum,
            self.application_id,
        ] {
            buffer.extend_from_slice(&field.to_be_bytes());
        }
        buffer.extend_from_slice(&[0u8; 20]);
        buffer.extend_from_slice(&self.version_valid_for.to_be_bytes());
        buffer.extend_from_slice(&self.sqlite_version_number.to_be_bytes());

        buffer
    }

    /// Bytes of each page available to b-tree content
    pub fn usable_size(&self) -> u32 {
        self.page_size - u32::from(self.reserved_space)
    }

    /// Returns true if the database uses UTF-8 encoding
    pub fn is_utf8(&self) -> bool {
        self.text_encoding == TextEncoding::Utf8
    }
}

/// Maps the stored page size to bytes, rejecting anything the format forbids.
fn decode_page_size(raw: u16) -> Result<u32> {
    let size = if raw == 1 {
        DatabaseHeader::MAX_PAGE_SIZE
    } else {
        u32::from(raw)
    };

    if size < DatabaseHeader::MIN_PAGE_SIZE || !size.is_power_of_two() {
        return Err(DecodeError::InvalidPageSize { raw });
    }
    Ok(size)
}

// Parses bytes 16..100. The outer result is nom's, the inner one carries
// semantic validation failures.
fn parse_fields(input: &[u8]) -> ParseResult<'_, Result<DatabaseHeader>> {
    let (input, raw_page_size) = parse_u16(input)?;
    let (input, write_version) = parse_u8(input)?;
    let (input, read_version) = parse_u8(input)?;
    let (input, reserved_space) = parse_u8(input)?;
    let (input, max_payload_fraction) = parse_u8(input)?;
    let (input, min_payload_fraction) = parse_u8(input)?;
    let (input, leaf_payload_fraction) = parse_u8(input)?;
    let (input, file_change_counter) = parse_u32(input)?;
    let (input, page_count) = parse_u32(input)?;
    let (input, first_freelist_trunk) = parse_u32(input)?;
    let (input, total_freelist_pages) = parse_u32(input)?;
    let (input, schema_cookie) = parse_u32(input)?;
    let (input, schema_format) = parse_u32(input)?;
    let (input, page_cache_size) = parse_u32(input)?;
    let (input, largest_root_page) = parse_u32(input)?;
    let (input, raw_encoding) = parse_u32(input)?;
    let (input, user_version) = parse_u32(input)?;
    let (input, incremental_vacuum) = parse_u32(input)?;
    let (input, application_id) = parse_u32(input)?;
    let (input, _reserved) = skip(input, 20)?;
    let (input, version_valid_for) = parse_u32(input)?;
    let (input, sqlite_version_number) = parse_u32(input)?;

    let header = decode_page_size(raw_page_size).and_then(|page_size| {
        Ok(DatabaseHeader {
            page_size,
            write_version,
            read_version,
            reserved_space,
            max_payload_fraction,
            min_payload_fraction,
            leaf_payload_fraction,
            file_change_counter,
            page_count,
            first_freelist_trunk,
            total_freelist_pages,
            schema_cookie,
            schema_format,
            page_cache_size,
            largest_root_page,
            text_encoding: TextEncoding::from_raw(raw_encoding)?,
            user_version,
            incremental_vacuum,
            application_id,
            version_valid_for,
            sqlite_version_number,
        })
    });

    Ok((input, header))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with(page_size: u32, page_count: u32) -> DatabaseHeader {
        DatabaseHeader {
            page_size,
            page_count,
            ..DatabaseHeader::default()
        }
    }

    #[test]
    fn test_serialized_header_is_100_bytes() {
        assert_eq!(DatabaseHeader::default().to_bytes().len(), 100);
    }

    #[test]
    fn test_round_trip_all_page_sizes() -> Result<()> {
        let mut page_size = DatabaseHeader::MIN_PAGE_SIZE;
        while page_size <= DatabaseHeader::MAX_PAGE_SIZE {
            for page_count in [1, 2, 1000, u32::MAX] {
                let bytes = header_with(page_size, page_count).to_bytes();
                let parsed = DatabaseHeader::parse(&bytes)?;
                assert_eq!(parsed.page_size, page_size);
                assert_eq!(parsed.page_count, page_count);
            }
            page_size *= 2;
        }
        Ok(())
    }

    #[test]
    fn test_page_size_one_means_65536() -> Result<()> {
        let mut bytes = header_with(4096, 1).to_bytes();
        bytes[16..18].copy_from_slice(&1u16.to_be_bytes());
        assert_eq!(DatabaseHeader::parse(&bytes)?.page_size, 65536);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_page_sizes() {
        for raw in [0u16, 256, 1000, 4095] {
            let mut bytes = header_with(4096, 1).to_bytes();
            bytes[16..18].copy_from_slice(&raw.to_be_bytes());
            let err = DatabaseHeader::parse(&bytes).unwrap_err();
            assert!(
                matches!(err, DecodeError::InvalidPageSize { raw: r } if r == raw),
                "raw page size {raw}"
            );
        }
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let mut bytes = header_with(4096, 1).to_bytes();
        bytes[0] = b's';
        assert!(matches!(
            DatabaseHeader::parse(&bytes),
            Err(DecodeError::InvalidMagic)
        ));
    }

    #[test]
    fn test_rejects_short_buffer() {
        let bytes = header_with(4096, 1).to_bytes();
        assert!(matches!(
            DatabaseHeader::parse(&bytes[..99]),
            Err(DecodeError::HeaderTooShort { len: 99 })
        ));
    }

    #[test]
    fn test_reads_metadata_fields() -> Result<()> {
        let original = DatabaseHeader {
            reserved_space: 8,
            schema_cookie: 42,
            text_encoding: TextEncoding::Utf16be,
            application_id: 0x1234_5678,
            ..header_with(1024, 7)
        };
        let parsed = DatabaseHeader::parse(&original.to_bytes())?;

        assert_eq!(parsed, original);
        assert_eq!(parsed.usable_size(), 1016);
        assert!(!parsed.is_utf8());
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_text_encoding() {
        let mut bytes = header_with(4096, 1).to_bytes();
        bytes[56..60].copy_from_slice(&9u32.to_be_bytes());
        assert!(matches!(
            DatabaseHeader::parse(&bytes),
            Err(DecodeError::InvalidTextEncoding { raw: 9 })
        ));
    }
}
