//! Page addressing and caching.
//!
//! Page `n` lives at file offset `(n - 1) * page_size`. Page 1 is read in full
//! but its logical body starts after the 100-byte database header.

use crate::sqlite::btree::BTreePage;
use crate::sqlite::core::cell::PageGeometry;
use crate::sqlite::core::header::DatabaseHeader;
use crate::sqlite::error::{DecodeError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace};

/// One physical page, read once and shared read-only
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    number: u32,
    data: Vec<u8>,
    geometry: PageGeometry,
}

impl Page {
    pub fn new(number: u32, data: Vec<u8>, geometry: PageGeometry) -> Self {
        Self {
            number,
            data,
            geometry,
        }
    }

    /// 1-based page number
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn is_first(&self) -> bool {
        self.number == 1
    }

    /// The whole physical page
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Offset of the logical body within the physical page
    pub fn body_offset(&self) -> usize {
        if self.is_first() {
            DatabaseHeader::HEADER_SIZE
        } else {
            0
        }
    }

    /// The page without the database header on page 1
    pub fn body(&self) -> &[u8] {
        &self.data[self.body_offset()..]
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Parses the page as a b-tree page
    pub fn btree(&self) -> Result<BTreePage<'_>> {
        BTreePage::parse_page(&self.data, self.number, self.geometry)
    }
}

/// Reads pages from a database file, caching each page after its first read.
///
/// The seek+read pair runs under a lock, so a `&PageStore` can be shared
/// between threads that decode different pages.
#[derive(Debug)]
pub struct PageStore<R = File> {
    source: Mutex<R>,
    header: DatabaseHeader,
    page_count: u32,
    cache: Mutex<HashMap<u32, Arc<Page>>>,
}

impl PageStore<File> {
    /// Opens the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening database file {}", path.display());
        Self::from_reader(File::open(path)?)
    }
}

impl<R: Read + Seek> PageStore<R> {
    /// Reads the database header from `source` and establishes the geometry
    pub fn from_reader(mut source: R) -> Result<Self> {
        let mut header_bytes = [0u8; DatabaseHeader::HEADER_SIZE];
        source.seek(SeekFrom::Start(0))?;
        let read = read_full(&mut source, &mut header_bytes)?;
        let header = DatabaseHeader::parse(&header_bytes[..read])?;

        let file_len = source.seek(SeekFrom::End(0))?;
        let page_count = if header.page_count == 0 {
            // Legacy writers leave the in-header size at 0
            (file_len / u64::from(header.page_size)) as u32
        } else {
            header.page_count
        };

        info!(
            page_size = header.page_size,
            page_count,
            file_len,
            "Read database geometry"
        );

        Ok(Self {
            source: Mutex::new(source),
            header,
            page_count,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn header(&self) -> &DatabaseHeader {
        &self.header
    }

    pub fn page_size(&self) -> u32 {
        self.header.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn geometry(&self) -> PageGeometry {
        PageGeometry::new(self.header.usable_size() as usize, self.header.text_encoding)
    }

    /// Returns page `number`, reading it from the file on first access
    pub fn get_page(&self, number: u32) -> Result<Arc<Page>> {
        if number == 0 || number > self.page_count {
            return Err(DecodeError::PageOutOfRange {
                page: number,
                page_count: self.page_count,
            });
        }

        if let Some(page) = lock(&self.cache).get(&number) {
            trace!(page = number, "page cache hit");
            return Ok(Arc::clone(page));
        }

        let page = Arc::new(self.read_page(number)?);
        let mut cache = lock(&self.cache);
        Ok(Arc::clone(cache.entry(number).or_insert(page)))
    }

    /// Reads a page straight from the file, bypassing the cache
    pub fn read_page(&self, number: u32) -> Result<Page> {
        let page_size = self.header.page_size as usize;
        let offset = u64::from(number - 1) * u64::from(self.header.page_size);
        debug!("Seeking to offset: {} for page {}", offset, number);

        let mut data = vec![0u8; page_size];
        let read = {
            let mut source = lock(&self.source);
            source.seek(SeekFrom::Start(offset))?;
            read_full(&mut *source, &mut data)?
        };

        if read != page_size {
            let body_offset = if number == 1 {
                DatabaseHeader::HEADER_SIZE
            } else {
                0
            };
            return Err(DecodeError::ShortRead {
                page: number,
                expected: page_size - body_offset,
                actual: read.saturating_sub(body_offset),
            });
        }

        Ok(Page::new(number, data, self.geometry()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Every critical section leaves the data consistent, so a poisoned lock is
    // still usable
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reads until `buf` is full or the source is exhausted. Returns the number of
/// bytes read; a short count means end of file.
fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::btree::PageType;
    use crate::utils::mock::{MockDatabase, PageBuilder};
    use std::io::Cursor;

    fn two_page_file() -> Vec<u8> {
        MockDatabase::with_tables(1024, &[("t", 2)])
            .with_page(&PageBuilder::table_leaf())
            .to_bytes()
    }

    #[test]
    fn test_page_addressing() -> Result<()> {
        let mut file = two_page_file();
        // Mark the second page so its offset can be recognised
        file[1024 + 1023] = 0xab;
        let store = PageStore::from_reader(Cursor::new(file.clone()))?;

        let first = store.get_page(1)?;
        assert_eq!(first.data().len(), 1024);
        assert_eq!(first.body().len(), 1024 - 100);
        assert_eq!(first.body(), &file[100..1024]);

        let second = store.get_page(2)?;
        assert_eq!(second.body_offset(), 0);
        assert_eq!(second.data(), &file[1024..2048]);
        assert_eq!(second.data()[1023], 0xab);
        Ok(())
    }

    #[test]
    fn test_page_out_of_range() -> Result<()> {
        let store = PageStore::from_reader(Cursor::new(two_page_file()))?;
        for number in [0, 3] {
            assert!(matches!(
                store.get_page(number),
                Err(DecodeError::PageOutOfRange { page, page_count: 2 }) if page == number
            ));
        }
        Ok(())
    }

    #[test]
    fn test_short_read_is_not_padded() -> Result<()> {
        let mut file = two_page_file();
        file.truncate(1024 + 600);
        let store = PageStore::from_reader(Cursor::new(file))?;

        assert!(matches!(
            store.get_page(2),
            Err(DecodeError::ShortRead {
                page: 2,
                expected: 1024,
                actual: 600
            })
        ));
        Ok(())
    }

    #[test]
    fn test_short_first_page_is_measured_against_body() -> Result<()> {
        let mut file = two_page_file();
        file.truncate(600);
        let store = PageStore::from_reader(Cursor::new(file))?;

        assert!(matches!(
            store.get_page(1),
            Err(DecodeError::ShortRead {
                page: 1,
                expected: 924,
                actual: 500
            })
        ));
        Ok(())
    }

    #[test]
    fn test_reserved_space_shrinks_usable_size() -> Result<()> {
        let mut db =
            MockDatabase::with_tables(1024, &[("t", 2)]).with_page(&PageBuilder::table_leaf());
        db.header_mut().reserved_space = 32;
        let store = PageStore::from_reader(Cursor::new(db.to_bytes()))?;

        assert_eq!(store.header().reserved_space, 32);
        assert_eq!(store.geometry().usable_size, 992);
        assert_eq!(store.get_page(2)?.geometry().usable_size, 992);
        Ok(())
    }

    #[test]
    fn test_pages_are_cached() -> Result<()> {
        let store = PageStore::from_reader(Cursor::new(two_page_file()))?;
        let a = store.get_page(2)?;
        let b = store.get_page(2)?;
        assert!(Arc::ptr_eq(&a, &b));
        Ok(())
    }

    #[test]
    fn test_zero_page_count_falls_back_to_file_length() -> Result<()> {
        let mut file = two_page_file();
        file[28..32].copy_from_slice(&0u32.to_be_bytes());
        let store = PageStore::from_reader(Cursor::new(file))?;
        assert_eq!(store.page_count(), 2);
        Ok(())
    }

    #[test]
    fn test_truncated_header() {
        let file = two_page_file();
        let err = PageStore::from_reader(Cursor::new(file[..40].to_vec())).unwrap_err();
        assert!(matches!(err, DecodeError::HeaderTooShort { len: 40 }));
    }

    #[test]
    fn test_page_btree_view() -> Result<()> {
        let store = PageStore::from_reader(Cursor::new(two_page_file()))?;
        let page = store.get_page(1)?;
        let btree = page.btree()?;
        assert_eq!(btree.page_type(), PageType::TableLeaf);
        assert_eq!(btree.number(), 1);
        assert_eq!(btree.cell_count(), 1);
        Ok(())
    }

    #[test]
    fn test_concurrent_reads() -> Result<()> {
        let file = MockDatabase::with_tables(512, &[])
            .with_page(&PageBuilder::table_leaf())
            .with_page(&PageBuilder::table_leaf())
            .with_page(&PageBuilder::table_leaf())
            .to_bytes();
        let store = PageStore::from_reader(Cursor::new(file))?;

        let numbers = std::thread::scope(|scope| {
            let handles: Vec<_> = (1..=4)
                .map(|number| {
                    let store = &store;
                    scope.spawn(move || store.get_page(number).map(|page| page.number()))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("reader thread panicked"))
                .collect::<Result<Vec<_>>>()
        })?;

        assert_eq!(numbers, vec![1, 2, 3, 4]);
        Ok(())
    }
}
