//! Page format for FerroDB.
//!
//! A page is a fixed-size block with a small embedded header followed by
//! opaque client data. The buffer pool treats the whole block as plain
//! data; only the file layer interprets the header.
//!
//! Page Layout (16KB default):
//! ```text
//! +------------------+  0x0000
//! | page_no   (8B)   |
//! | checksum  (4B)   |
//! +------------------+  0x000C
//! |   CLIENT DATA    |
//! +------------------+  PAGE_SIZE (0x4000)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ferro_common::prelude::*;

/// Default page size: 16KB (optimized for modern SSDs)
pub const PAGE_SIZE: usize = 16 * 1024;

/// Page header size: 12 bytes
pub const PAGE_HEADER_SIZE: usize = 12;

/// Bytes of client data per page
pub const PAGE_DATA_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Page header (12 bytes, fixed layout)
///
/// Layout:
/// - page_no: u64 (8 bytes) - Page number assigned by the file layer
/// - checksum: u32 (4 bytes) - CRC32 of the block excluding this field;
///   zero means "not yet checksummed" and is accepted on load
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct PageHeader {
    pub page_no: u64,
    pub checksum: u32,
}

impl PageHeader {
    pub fn read_from(data: &[u8]) -> Self {
        let mut buf = &data[..PAGE_HEADER_SIZE];
        Self {
            page_no: buf.get_u64_le(),
            checksum: buf.get_u32_le(),
        }
    }

    pub fn write_to(&self, data: &mut [u8]) {
        let mut buf = &mut data[..PAGE_HEADER_SIZE];
        buf.put_u64_le(self.page_no);
        buf.put_u32_le(self.checksum);
    }
}

/// A fixed-size page.
///
/// Created by the file layer with its page number already embedded; the
/// data region is zeroed until a client writes into it.
pub struct Page {
    block: BytesMut,
}

impl Page {
    /// Create a new zeroed page with the given page number.
    pub fn new(page_no: PageNo) -> Self {
        let mut block = BytesMut::zeroed(PAGE_SIZE);
        let header = PageHeader {
            page_no: page_no.0,
            checksum: 0,
        };
        header.write_to(&mut block);

        Self { block }
    }

    /// Load a page from raw bytes, verifying length and checksum.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        if data.len() != PAGE_SIZE {
            return Err(Error::Storage(StorageError::PageCorrupted(0)));
        }

        let page = Self {
            block: BytesMut::from(data.as_ref()),
        };

        if !page.verify_checksum() {
            return Err(Error::Storage(StorageError::PageCorrupted(
                page.page_no().0,
            )));
        }

        Ok(page)
    }

    /// Serialize the page with a freshly computed checksum.
    pub fn checksummed_bytes(&self) -> Bytes {
        let mut block = self.block.clone();
        let mut header = PageHeader::read_from(&block);
        header.checksum = self.compute_checksum();
        header.write_to(&mut block);
        block.freeze()
    }

    /// Get the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::read_from(&self.block)
    }

    /// Get the page number.
    pub fn page_no(&self) -> PageNo {
        PageNo(self.header().page_no)
    }

    /// Get the client data region.
    pub fn data(&self) -> &[u8] {
        &self.block[PAGE_HEADER_SIZE..]
    }

    /// Get the client data region mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.block[PAGE_HEADER_SIZE..]
    }

    /// Get the raw block.
    pub fn as_slice(&self) -> &[u8] {
        &self.block
    }

    /// Compute CRC32 of the block, excluding the checksum field (bytes 8-12).
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.block[0..8]); // page_no
        hasher.update(&self.block[PAGE_HEADER_SIZE..]); // client data
        hasher.finalize()
    }

    /// Verify the page checksum.
    pub fn verify_checksum(&self) -> bool {
        let header = self.header();
        if header.checksum == 0 {
            // Page written before any checksum was stamped
            return true;
        }
        header.checksum == self.compute_checksum()
    }
}

impl Clone for Page {
    fn clone(&self) -> Self {
        Self {
            block: self.block.clone(),
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("page_no", &self.header().page_no)
            .field("checksum", &self.header().checksum)
            .finish()
    }
}
