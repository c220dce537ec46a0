//! Page file layer - persistent storage consumed by the buffer pool.
//!
//! The buffer pool talks to storage exclusively through the [`PageFile`]
//! trait; [`DiskFile`] is the file-backed implementation. File handles
//! carry a process-unique [`FileId`] so the pool can key its directory on
//! handle identity rather than path.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::page::{Page, PAGE_SIZE};
use ferro_common::prelude::*;

/// Source of process-unique file ids. Never reused, so a file that is
/// closed and reopened gets a fresh identity (and a fresh resident set).
static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// Abstract page file consumed by the buffer pool.
pub trait PageFile: Send + Sync {
    /// Stable identity of this handle.
    fn id(&self) -> FileId;

    /// Name for error messages only; never used as an identity.
    fn filename(&self) -> String;

    /// Allocate a new page in the file and return it bearing its assigned
    /// page number. The file is extended immediately.
    fn allocate_page(&self) -> Result<Page>;

    /// Read an existing page.
    fn read_page(&self, page_no: PageNo) -> Result<Page>;

    /// Persist a page by its embedded page number.
    fn write_page(&self, page: &Page) -> Result<()>;

    /// Remove a page from the file. Its number may be handed out again by
    /// a later `allocate_page`.
    fn delete_page(&self, page_no: PageNo) -> Result<()>;

    /// High-water count of pages ever allocated.
    fn num_pages(&self) -> u64;
}

/// File-backed page store.
///
/// Pages live at `page_no * PAGE_SIZE`. Deleted page numbers are kept in
/// an in-memory free set and reused by allocation; rebuilding the free set
/// across reopen belongs to the recovery layer, which this engine does not
/// carry.
pub struct DiskFile {
    id: FileId,
    path: PathBuf,
    file: Mutex<File>,
    next_page_no: AtomicU64,
    free_pages: Mutex<BTreeSet<u64>>,
}

impl DiskFile {
    /// Create a new page file, truncating anything already at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| {
                Error::Storage(StorageError::IoError(format!(
                    "Failed to create page file: {}",
                    e
                )))
            })?;

        debug!(path = %path.display(), "created page file");

        Ok(Self {
            id: FileId(NEXT_FILE_ID.fetch_add(1, Ordering::SeqCst)),
            path,
            file: Mutex::new(file),
            next_page_no: AtomicU64::new(0),
            free_pages: Mutex::new(BTreeSet::new()),
        })
    }

    /// Open an existing page file. The page count is derived from the file
    /// length.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                Error::Storage(StorageError::IoError(format!(
                    "Failed to open page file: {}",
                    e
                )))
            })?;

        let metadata = file.metadata().map_err(|e| {
            Error::Storage(StorageError::IoError(format!(
                "Failed to get file metadata: {}",
                e
            )))
        })?;
        let num_pages = metadata.len() / PAGE_SIZE as u64;

        debug!(path = %path.display(), num_pages, "opened page file");

        Ok(Self {
            id: FileId(NEXT_FILE_ID.fetch_add(1, Ordering::SeqCst)),
            path,
            file: Mutex::new(file),
            next_page_no: AtomicU64::new(num_pages),
            free_pages: Mutex::new(BTreeSet::new()),
        })
    }

    /// Get the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_allocated(&self, page_no: PageNo) -> Result<()> {
        if page_no.0 >= self.next_page_no.load(Ordering::SeqCst)
            || self.free_pages.lock().contains(&page_no.0)
        {
            return Err(Error::Storage(StorageError::PageNotFound(page_no.0)));
        }
        Ok(())
    }

    fn write_block(&self, page_no: PageNo, block: &[u8]) -> Result<()> {
        let offset = page_no.0 * PAGE_SIZE as u64;
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(offset)).map_err(|e| {
            Error::Storage(StorageError::IoError(format!("Failed to seek: {}", e)))
        })?;
        file.write_all(block).map_err(|e| {
            Error::Storage(StorageError::IoError(format!(
                "Failed to write page: {}",
                e
            )))
        })?;

        Ok(())
    }
}

impl PageFile for DiskFile {
    fn id(&self) -> FileId {
        self.id
    }

    fn filename(&self) -> String {
        self.path.display().to_string()
    }

    fn allocate_page(&self) -> Result<Page> {
        let page_no = {
            let mut free = self.free_pages.lock();
            match free.pop_first() {
                Some(n) => PageNo(n),
                None => PageNo(self.next_page_no.fetch_add(1, Ordering::SeqCst)),
            }
        };

        // Write the fresh page through so the file is extended right away.
        let page = Page::new(page_no);
        self.write_block(page_no, &page.checksummed_bytes())?;

        debug!(file = %self.id, page_no = %page_no, "allocated page");
        Ok(page)
    }

    fn read_page(&self, page_no: PageNo) -> Result<Page> {
        self.ensure_allocated(page_no)?;

        let offset = page_no.0 * PAGE_SIZE as u64;
        let mut buffer = vec![0u8; PAGE_SIZE];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset)).map_err(|e| {
                Error::Storage(StorageError::IoError(format!("Failed to seek: {}", e)))
            })?;
            file.read_exact(&mut buffer).map_err(|e| {
                Error::Storage(StorageError::IoError(format!(
                    "Failed to read page: {}",
                    e
                )))
            })?;
        }

        let page = Page::from_bytes(Bytes::from(buffer))?;
        if page.page_no() != page_no {
            return Err(Error::Storage(StorageError::PageCorrupted(page_no.0)));
        }

        Ok(page)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        let page_no = page.page_no();
        self.ensure_allocated(page_no)?;
        self.write_block(page_no, &page.checksummed_bytes())
    }

    fn delete_page(&self, page_no: PageNo) -> Result<()> {
        self.ensure_allocated(page_no)?;
        self.free_pages.lock().insert(page_no.0);
        debug!(file = %self.id, page_no = %page_no, "deleted page");
        Ok(())
    }

    fn num_pages(&self) -> u64 {
        self.next_page_no.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for DiskFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskFile")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("num_pages", &self.num_pages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_allocate() {
        let dir = tempdir().unwrap();
        let file = DiskFile::create(dir.path().join("test.db")).unwrap();

        let p0 = file.allocate_page().unwrap();
        let p1 = file.allocate_page().unwrap();

        assert_eq!(p0.page_no(), PageNo(0));
        assert_eq!(p1.page_no(), PageNo(1));
        assert_eq!(file.num_pages(), 2);
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let file = DiskFile::create(dir.path().join("test.db")).unwrap();

        let mut page = file.allocate_page().unwrap();
        page.data_mut()[..5].copy_from_slice(b"hello");
        file.write_page(&page).unwrap();

        let loaded = file.read_page(page.page_no()).unwrap();
        assert_eq!(&loaded.data()[..5], b"hello");
    }

    #[test]
    fn test_read_unallocated_fails() {
        let dir = tempdir().unwrap();
        let file = DiskFile::create(dir.path().join("test.db")).unwrap();

        let err = file.read_page(PageNo(9)).unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::PageNotFound(9))
        ));
    }

    #[test]
    fn test_delete_then_read_fails() {
        let dir = tempdir().unwrap();
        let file = DiskFile::create(dir.path().join("test.db")).unwrap();

        let page = file.allocate_page().unwrap();
        let page_no = page.page_no();
        file.delete_page(page_no).unwrap();

        assert!(file.read_page(page_no).is_err());
        assert!(file.delete_page(page_no).is_err());
    }

    #[test]
    fn test_freed_page_number_reused() {
        let dir = tempdir().unwrap();
        let file = DiskFile::create(dir.path().join("test.db")).unwrap();

        let p0 = file.allocate_page().unwrap().page_no();
        let _p1 = file.allocate_page().unwrap().page_no();
        file.delete_page(p0).unwrap();

        let p2 = file.allocate_page().unwrap().page_no();
        assert_eq!(p2, p0);
    }

    #[test]
    fn test_handles_have_distinct_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let a = DiskFile::create(&path).unwrap();
        a.allocate_page().unwrap();
        let b = DiskFile::open(&path).unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(b.num_pages(), 1);
    }

    #[test]
    fn test_reopen_sees_written_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let file = DiskFile::create(&path).unwrap();
            let mut page = file.allocate_page().unwrap();
            page.data_mut()[..7].copy_from_slice(b"durable");
            file.write_page(&page).unwrap();
        }

        let file = DiskFile::open(&path).unwrap();
        let loaded = file.read_page(PageNo(0)).unwrap();
        assert_eq!(&loaded.data()[..7], b"durable");
    }
}
