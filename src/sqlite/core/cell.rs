//! B-tree cell decoding.
//!
//! ## Cell Formats
//!
//! - Table leaf: payload length (varint), rowid (varint), payload, overflow page (u32, only if spilled)
//! - Table interior: left child page (u32), rowid key (varint)
//! - Index leaf: payload length (varint), payload, overflow page (u32, only if spilled)
//! - Index interior: left child page (u32), payload length (varint), payload, overflow page
//!
//! Payloads too large for the page keep only a prefix locally. The rest lives
//! on an overflow chain that this decoder reports but never follows.

use super::header::TextEncoding;
use super::record::{decode_partial_record, decode_record_with_encoding, Record, Truncation};
use super::varint::Varint;
use crate::sqlite::btree::PageType;
use crate::sqlite::error::{DecodeError, Result};
use tracing::trace;

/// Page-independent parameters needed to decode cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageGeometry {
    /// Page size minus the reserved bytes at the end of each page
    pub usable_size: usize,
    pub encoding: TextEncoding,
}

impl PageGeometry {
    pub fn new(usable_size: usize, encoding: TextEncoding) -> Self {
        Self {
            usable_size,
            encoding,
        }
    }
}

/// Payload bytes of a cell as stored on the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Payload<'a> {
    local: &'a [u8],
    truncation: Option<Truncation>,
    encoding: TextEncoding,
}

impl<'a> Payload<'a> {
    /// The bytes present on this page
    pub fn local(&self) -> &'a [u8] {
        self.local
    }

    pub fn truncation(&self) -> Option<Truncation> {
        self.truncation
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    /// Decodes the payload as a record. Truncated payloads yield their local
    /// columns with the truncation marker set.
    pub fn record(&self) -> Result<Record> {
        match self.truncation {
            None => decode_record_with_encoding(self.local, self.encoding),
            Some(truncation) => decode_partial_record(self.local, self.encoding, truncation),
        }
    }
}

/// One decoded cell, borrowing its payload from the page buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    TableLeaf {
        payload_length: u64,
        row_id: i64,
        payload: Payload<'a>,
    },
    TableInterior {
        left_child_page: u32,
        key: i64,
    },
    IndexLeaf {
        payload_length: u64,
        payload: Payload<'a>,
    },
    IndexInterior {
        left_child_page: u32,
        payload_length: u64,
        payload: Payload<'a>,
    },
}

impl<'a> Cell<'a> {
    pub fn row_id(&self) -> Option<i64> {
        match self {
            Cell::TableLeaf { row_id, .. } => Some(*row_id),
            Cell::TableInterior { key, .. } => Some(*key),
            _ => None,
        }
    }

    pub fn left_child_page(&self) -> Option<u32> {
        match self {
            Cell::TableInterior {
                left_child_page, ..
            }
            | Cell::IndexInterior {
                left_child_page, ..
            } => Some(*left_child_page),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Payload<'a>> {
        match self {
            Cell::TableLeaf { payload, .. }
            | Cell::IndexLeaf { payload, .. }
            | Cell::IndexInterior { payload, .. } => Some(payload),
            Cell::TableInterior { .. } => None,
        }
    }

    /// Decodes the cell's record
    pub fn record(&self) -> Result<Record> {
        self.payload().ok_or(DecodeError::NoRecord)?.record()
    }
}

/// Decodes the cell at `offset` of `page` according to `page_type`.
/// `page` is the whole physical page and `offset` comes straight from the cell
/// pointer array.
pub fn decode_cell<'a>(
    page: &'a [u8],
    offset: usize,
    page_type: PageType,
    geometry: PageGeometry,
) -> Result<Cell<'a>> {
    match page_type {
        PageType::TableLeaf => decode_table_leaf_cell(page, offset, geometry),
        PageType::TableInterior => decode_table_interior_cell(page, offset),
        PageType::IndexLeaf => decode_index_leaf_cell(page, offset, geometry),
        PageType::IndexInterior => decode_index_interior_cell(page, offset, geometry),
    }
}

pub fn decode_table_leaf_cell(
    page: &[u8],
    offset: usize,
    geometry: PageGeometry,
) -> Result<Cell<'_>> {
    let (payload_length, consumed) = page.read_varint(offset)?;
    let mut pos = offset + consumed;
    let (row_id, consumed) = page.read_varint(pos)?;
    pos += consumed;

    let payload_length = payload_length as u64;
    let payload = read_payload(page, pos, payload_length, PageType::TableLeaf, geometry)?;
    trace!(offset, row_id, payload_length, "decoded table leaf cell");

    Ok(Cell::TableLeaf {
        payload_length,
        row_id,
        payload,
    })
}

pub fn decode_table_interior_cell(page: &[u8], offset: usize) -> Result<Cell<'_>> {
    let left_child_page = read_u32(page, offset)?;
    let (key, _) = page.read_varint(offset + 4)?;

    Ok(Cell::TableInterior {
        left_child_page,
        key,
    })
}

pub fn decode_index_leaf_cell(
    page: &[u8],
    offset: usize,
    geometry: PageGeometry,
) -> Result<Cell<'_>> {
    let (payload_length, consumed) = page.read_varint(offset)?;
    let payload_length = payload_length as u64;
    let payload = read_payload(
        page,
        offset + consumed,
        payload_length,
        PageType::IndexLeaf,
        geometry,
    )?;

    Ok(Cell::IndexLeaf {
        payload_length,
        payload,
    })
}

pub fn decode_index_interior_cell(
    page: &[u8],
    offset: usize,
    geometry: PageGeometry,
) -> Result<Cell<'_>> {
    let left_child_page = read_u32(page, offset)?;
    let (payload_length, consumed) = page.read_varint(offset + 4)?;
    let payload_length = payload_length as u64;
    let payload = read_payload(
        page,
        offset + 4 + consumed,
        payload_length,
        PageType::IndexInterior,
        geometry,
    )?;

    Ok(Cell::IndexInterior {
        left_child_page,
        payload_length,
        payload,
    })
}

/// Number of payload bytes stored on the page itself for a payload of
/// `payload_length` bytes.
///
/// - Table leaf max local: `U - 35`
/// - Index max local: `((U - 12) * 64 / 255) - 23`
/// - Min local (all kinds): `((U - 12) * 32 / 255) - 23`
/// - Spilled payloads keep `M + (P - M) % (U - 4)` bytes if that fits under the
///   max, otherwise `M`
pub fn local_payload_size(page_type: PageType, payload_length: u64, usable_size: usize) -> usize {
    let max_local = match page_type {
        PageType::TableLeaf | PageType::TableInterior => usable_size.saturating_sub(35),
        PageType::IndexLeaf | PageType::IndexInterior => {
            (usable_size.saturating_sub(12) * 64 / 255).saturating_sub(23)
        }
    };

    if payload_length <= max_local as u64 {
        return payload_length as usize;
    }

    let min_local = (usable_size.saturating_sub(12) * 32 / 255).saturating_sub(23);
    let spill_unit = usable_size.saturating_sub(4).max(1) as u64;
    let surplus = min_local as u64 + (payload_length - min_local as u64) % spill_unit;

    if surplus <= max_local as u64 {
        surplus as usize
    } else {
        min_local
    }
}

fn read_payload(
    page: &[u8],
    start: usize,
    payload_length: u64,
    page_type: PageType,
    geometry: PageGeometry,
) -> Result<Payload<'_>> {
    let local_size = local_payload_size(page_type, payload_length, geometry.usable_size);
    let local = slice(page, start, local_size)?;

    let truncation = if (local_size as u64) < payload_length {
        let overflow_page = read_u32(page, start + local_size)?;
        trace!(
            payload_length,
            local_size,
            overflow_page,
            "payload spills to overflow pages"
        );
        Some(Truncation {
            total: payload_length,
            local: local_size,
            overflow_page,
        })
    } else {
        None
    };

    Ok(Payload {
        local,
        truncation,
        encoding: geometry.encoding,
    })
}

fn slice(page: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    page.get(start..start + len)
        .ok_or(DecodeError::UnexpectedEof {
            offset: start,
            needed: len,
            available: page.len().saturating_sub(start),
        })
}

fn read_u32(page: &[u8], offset: usize) -> Result<u32> {
    let bytes = slice(page, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
