//! B-tree pages
//!
//! ## B-tree Page Structure
//!
//! Each b-tree page in the database file contains:
//!
//! - Page header (8 bytes for leaves, 12 for interior pages)
//! - Cell pointer array
//! - Unallocated space
//! - Cell content area
//! - Reserved region
//!
//! On page 1 all of this starts after the 100-byte database header, but cell
//! pointers are still offsets from the start of the physical page.
//!
//! ### B-tree Page Header Format
//!
//! - Byte 0: Page type
//! - Bytes 1-2: First freeblock offset
//! - Bytes 3-4: Number of cells
//! - Bytes 5-6: Cell content offset (0 means 65536)
//! - Byte 7: Number of fragmented free bytes
//! - Bytes 8-11: Right-most child pointer (interior pages only)

use crate::sqlite::core::cell::{decode_cell, Cell, PageGeometry};
use crate::sqlite::core::header::{DatabaseHeader, TextEncoding};
use crate::sqlite::core::{parse_u16, parse_u32, parse_u8, ParseResult};
use crate::sqlite::error::{DecodeError, Result};
use std::fmt::{self, Display};
use tracing::debug;

/// Kind of b-tree page, from its first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    IndexInterior,
    TableInterior,
    IndexLeaf,
    TableLeaf,
}

impl PageType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x02 => Some(PageType::IndexInterior),
            0x05 => Some(PageType::TableInterior),
            0x0a => Some(PageType::IndexLeaf),
            0x0d => Some(PageType::TableLeaf),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            PageType::IndexInterior => 0x02,
            PageType::TableInterior => 0x05,
            PageType::IndexLeaf => 0x0a,
            PageType::TableLeaf => 0x0d,
        }
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, PageType::TableLeaf | PageType::IndexLeaf)
    }

    pub fn is_table(self) -> bool {
        matches!(self, PageType::TableLeaf | PageType::TableInterior)
    }

    /// Size of the page header in bytes
    pub fn header_size(self) -> usize {
        if self.is_leaf() {
            8
        } else {
            12
        }
    }
}

impl Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageType::IndexInterior => "index-interior",
            PageType::TableInterior => "table-interior",
            PageType::IndexLeaf => "index-leaf",
            PageType::TableLeaf => "table-leaf",
        };
        f.write_str(name)
    }
}

/// Represents a B-tree page header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreePageHeader {
    pub page_type: PageType,
    /// Offset to first freeblock, 0 if none
    pub first_freeblock: u16,
    /// Number of cells in page
    pub cell_count: u16,
    /// Offset to cell content area
    pub content_area_start: u32,
    /// Number of fragmented free bytes
    pub fragmented_free_bytes: u8,
    /// Right-most child page, interior pages only
    pub rightmost_pointer: Option<u32>,
}

impl BTreePageHeader {
    /// Parse a B-tree page header from the start of a page body. `page` is
    /// only used for error context.
    pub fn parse(body: &[u8], page: u32) -> Result<Self> {
        let tag = *body.first().ok_or_else(|| DecodeError::CorruptPage {
            page,
            reason: "empty page body".to_string(),
        })?;
        let page_type =
            PageType::from_tag(tag).ok_or(DecodeError::UnknownPageType { page, tag })?;

        let (_, header) =
            parse_header_fields(body, page_type).map_err(|_| DecodeError::CorruptPage {
                page,
                reason: format!("{} page header truncated", page_type),
            })?;
        Ok(header)
    }

    /// Size of this header in bytes
    pub fn size(&self) -> usize {
        self.page_type.header_size()
    }
}

fn parse_header_fields(input: &[u8], page_type: PageType) -> ParseResult<'_, BTreePageHeader> {
    let (input, _tag) = parse_u8(input)?;
    let (input, first_freeblock) = parse_u16(input)?;
    let (input, cell_count) = parse_u16(input)?;
    let (input, raw_content_start) = parse_u16(input)?;
    let (input, fragmented_free_bytes) = parse_u8(input)?;
    let (input, rightmost_pointer) = if page_type.is_leaf() {
        (input, None)
    } else {
        let (input, pointer) = parse_u32(input)?;
        (input, Some(pointer))
    };

    let content_area_start = if raw_content_start == 0 {
        65536
    } else {
        u32::from(raw_content_start)
    };

    Ok((
        input,
        BTreePageHeader {
            page_type,
            first_freeblock,
            cell_count,
            content_area_start,
            fragmented_free_bytes,
            rightmost_pointer,
        },
    ))
}

/// A parsed b-tree page, borrowing the physical page buffer it came from
#[derive(Debug, Clone)]
pub struct BTreePage<'a> {
    number: u32,
    data: &'a [u8],
    header_offset: usize,
    header: BTreePageHeader,
    geometry: PageGeometry,
}

impl<'a> BTreePage<'a> {
    /// Parses a whole physical page. On the first page the b-tree header
    /// starts after the database header.
    ///
    /// Without a database header at hand the whole buffer is treated as usable
    /// and text as UTF-8; use [`BTreePage::parse_page`] when the geometry is
    /// known.
    pub fn parse(data: &'a [u8], is_first_page: bool) -> Result<Self> {
        let number = if is_first_page { 1 } else { 0 };
        let geometry = PageGeometry::new(data.len(), TextEncoding::Utf8);
        Self::parse_page(data, number, geometry)
    }

    /// Parses physical page `number`
    pub fn parse_page(data: &'a [u8], number: u32, geometry: PageGeometry) -> Result<Self> {
        let header_offset = if number == 1 {
            DatabaseHeader::HEADER_SIZE
        } else {
            0
        };
        let body = data.get(header_offset..).unwrap_or_default();
        let header = BTreePageHeader::parse(body, number)?;

        let array_end = header_offset + header.size() + 2 * usize::from(header.cell_count);
        if array_end > data.len() {
            return Err(DecodeError::CorruptPage {
                page: number,
                reason: format!(
                    "{} cell pointers overrun the page ({} > {} bytes)",
                    header.cell_count,
                    array_end,
                    data.len()
                ),
            });
        }

        debug!(
            page = number,
            page_type = %header.page_type,
            cells = header.cell_count,
            "parsed b-tree page"
        );

        Ok(Self {
            number,
            data,
            header_offset,
            header,
            geometry,
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn header(&self) -> &BTreePageHeader {
        &self.header
    }

    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    /// Returns number of cells in the page
    pub fn cell_count(&self) -> u16 {
        self.header.cell_count
    }

    pub fn rightmost_pointer(&self) -> Option<u32> {
        self.header.rightmost_pointer
    }

    /// Gets raw page data, including the database header on page 1
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Offset of the cell pointer array within the physical page
    pub fn cell_pointer_array_offset(&self) -> usize {
        self.header_offset + self.header.size()
    }

    /// Reads and returns the cell pointer array, in stored order
    pub fn cell_pointers(&self) -> Vec<usize> {
        let start = self.cell_pointer_array_offset();
        self.data[start..start + 2 * usize::from(self.header.cell_count)]
            .chunks_exact(2)
            .map(|ptr| usize::from(u16::from_be_bytes([ptr[0], ptr[1]])))
            .collect()
    }

    /// Offset of cell `index` within the physical page
    pub fn cell_pointer(&self, index: u16) -> Result<usize> {
        if index >= self.header.cell_count {
            return Err(DecodeError::CellIndexOutOfRange {
                page: self.number,
                index,
                cell_count: self.header.cell_count,
            });
        }
        let at = self.cell_pointer_array_offset() + 2 * usize::from(index);
        let pointer = usize::from(u16::from_be_bytes([self.data[at], self.data[at + 1]]));

        if pointer < self.cell_pointer_array_offset() || pointer >= self.data.len() {
            return Err(DecodeError::CorruptPage {
                page: self.number,
                reason: format!("cell {} points outside the content area ({})", index, pointer),
            });
        }
        Ok(pointer)
    }

    /// Decodes cell `index`
    pub fn cell(&self, index: u16) -> Result<Cell<'a>> {
        let pointer = self.cell_pointer(index)?;
        decode_cell(self.data, pointer, self.header.page_type, self.geometry)
            .map_err(|err| err.in_cell(self.number, index))
    }

    /// Decodes every cell in stored order
    pub fn cells(&self) -> impl Iterator<Item = Result<Cell<'a>>> + '_ {
        (0..self.header.cell_count).map(move |index| self.cell(index))
    }

    /// Gets child page numbers of an interior page: every left child in
    /// pointer order, then the right-most pointer. Leaves have no children.
    pub fn child_pages(&self) -> Result<Vec<u32>> {
        let Some(rightmost) = self.header.rightmost_pointer else {
            return Ok(Vec::new());
        };

        let mut children = Vec::with_capacity(usize::from(self.header.cell_count) + 1);
        for cell in self.cells() {
            if let Some(child) = cell?.left_child_page() {
                children.push(child);
            }
        }
        children.push(rightmost);

        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::core::record::Value;
    use crate::utils::mock::{encode_record, index_interior_cell, table_leaf_cell, PageBuilder};

    #[test]
    fn test_empty_table_leaf() -> Result<()> {
        let mut data = vec![0u8; 512];
        data[0] = 0x0d;

        let page = BTreePage::parse(&data, false)?;
        assert_eq!(page.page_type(), PageType::TableLeaf);
        assert_eq!(page.cell_count(), 0);
        assert!(page.cell_pointers().is_empty());
        assert_eq!(page.header().content_area_start, 65536);
        assert_eq!(page.rightmost_pointer(), None);
        Ok(())
    }

    #[test]
    fn test_page_type_tags() {
        for page_type in [
            PageType::IndexInterior,
            PageType::TableInterior,
            PageType::IndexLeaf,
            PageType::TableLeaf,
        ] {
            assert_eq!(PageType::from_tag(page_type.tag()), Some(page_type));
        }
        assert_eq!(PageType::TableLeaf.header_size(), 8);
        assert_eq!(PageType::IndexInterior.header_size(), 12);
    }

    #[test]
    fn test_unknown_page_type() {
        for tag in [0x00u8, 0x01, 0x0c, 0xff] {
            let mut data = vec![0u8; 512];
            data[0] = tag;
            let err = BTreePage::parse(&data, false).unwrap_err();
            assert!(matches!(
                err,
                DecodeError::UnknownPageType { page: 0, tag: t } if t == tag
            ));
        }
    }

    #[test]
    fn test_interior_header_and_children() -> Result<()> {
        let data = PageBuilder::table_interior(9)
            .with_interior_cell(3, 10)
            .with_interior_cell(4, 20)
            .build(1024, false);

        let page = BTreePage::parse(&data, false)?;
        assert_eq!(page.page_type(), PageType::TableInterior);
        assert_eq!(page.rightmost_pointer(), Some(9));
        assert_eq!(page.cell_pointer_array_offset(), 12);
        assert_eq!(page.child_pages()?, vec![3, 4, 9]);
        assert_eq!(page.cell(1)?.row_id(), Some(20));
        Ok(())
    }

    #[test]
    fn test_index_interior_page() -> Result<()> {
        let key = vec![Value::Text("kiwi".into()), Value::Integer(4)];
        let data = PageBuilder::new(PageType::IndexInterior)
            .with_rightmost(8)
            .with_cell(index_interior_cell(6, &encode_record(&key)))
            .build(512, false);

        let page = BTreePage::parse(&data, false)?;
        assert_eq!(page.page_type(), PageType::IndexInterior);
        assert_eq!(page.child_pages()?, vec![6, 8]);

        let cell = page.cell(0)?;
        assert_eq!(cell.row_id(), None);
        assert_eq!(cell.record()?.into_values(), key);
        Ok(())
    }

    #[test]
    fn test_bad_record_fails_only_its_cell() -> Result<()> {
        // Serial type 10 is reserved
        let data = PageBuilder::table_leaf()
            .with_cell(table_leaf_cell(1, &[0x02, 0x0a]))
            .with_row(2, &[Value::Integer(3)])
            .build(512, false);

        let page = BTreePage::parse(&data, false)?;
        let records: Vec<_> = page
            .cells()
            .map(|cell| cell.and_then(|cell| cell.record()))
            .collect();

        assert_eq!(records.len(), 2);
        assert!(matches!(
            records[0],
            Err(DecodeError::InvalidSerialType { serial_type: 10, .. })
        ));
        assert_eq!(
            records[1].as_ref().map(|record| record.values().to_vec()).ok(),
            Some(vec![Value::Integer(3)])
        );
        Ok(())
    }

    #[test]
    fn test_first_page_pointers_are_not_re_offset() -> Result<()> {
        let record = encode_record(&[Value::Text("hello".into())]);
        let data = PageBuilder::table_leaf()
            .with_cell(table_leaf_cell(1, &record))
            .build(512, true);

        let page = BTreePage::parse(&data, true)?;
        assert_eq!(page.cell_pointer_array_offset(), 108);

        let pointer = page.cell_pointer(0)?;
        assert_eq!(pointer, 512 - table_leaf_cell(1, &record).len());
        assert_eq!(
            page.cell(0)?.record()?.into_values(),
            vec![Value::Text("hello".into())]
        );
        Ok(())
    }

    #[test]
    fn test_cell_index_out_of_range() -> Result<()> {
        let data = PageBuilder::table_leaf().build(512, false);
        let page = BTreePage::parse(&data, false)?;
        assert!(matches!(
            page.cell(0),
            Err(DecodeError::CellIndexOutOfRange {
                index: 0,
                cell_count: 0,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_pointer_array_overrunning_page() {
        let mut data = vec![0u8; 512];
        data[0] = 0x0d;
        data[3..5].copy_from_slice(&300u16.to_be_bytes());
        assert!(matches!(
            BTreePage::parse(&data, false),
            Err(DecodeError::CorruptPage { .. })
        ));
    }

    #[test]
    fn test_pointer_outside_page() -> Result<()> {
        let mut data = vec![0u8; 512];
        data[0] = 0x0d;
        data[3..5].copy_from_slice(&1u16.to_be_bytes());
        data[8..10].copy_from_slice(&2u16.to_be_bytes());

        let page = BTreePage::parse(&data, false)?;
        assert!(matches!(
            page.cell(0),
            Err(DecodeError::CorruptPage { page: 0, .. })
        ));
        Ok(())
    }
}
