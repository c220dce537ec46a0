//! Frame descriptors for the buffer pool.

use std::fmt;
use std::sync::Arc;

use crate::file::PageFile;
use ferro_common::prelude::*;

/// Index of a frame in the pool's frame table.
pub type FrameId = usize;

/// Per-frame metadata.
///
/// A descriptor is either invalid (empty slot) or describes the page
/// resident in its payload slot. `file` and `page_no` are meaningful only
/// while `valid` is set; `page_no` may go stale after `clear` since the
/// cleared `valid` bit makes it unreadable.
pub struct FrameDesc {
    /// Own index in the frame table; immutable.
    pub frame_no: FrameId,
    /// Whether the frame currently holds a page.
    pub valid: bool,
    /// Owning file of the resident page.
    pub file: Option<Arc<dyn PageFile>>,
    /// Page identifier within `file`.
    pub page_no: PageNo,
    /// Outstanding pins. A pinned frame is never an eviction victim.
    pub pin_count: u32,
    /// Modified since load; must be written back before reuse.
    pub dirty: bool,
    /// CLOCK reference bit.
    pub ref_bit: bool,
}

impl FrameDesc {
    pub fn new(frame_no: FrameId) -> Self {
        Self {
            frame_no,
            valid: false,
            file: None,
            page_no: PageNo::INVALID,
            pin_count: 0,
            dirty: false,
            ref_bit: false,
        }
    }

    /// Install a freshly loaded page: valid, pinned once, referenced, clean.
    pub fn set(&mut self, file: Arc<dyn PageFile>, page_no: PageNo) {
        self.valid = true;
        self.file = Some(file);
        self.page_no = page_no;
        self.pin_count = 1;
        self.ref_bit = true;
        self.dirty = false;
    }

    /// Return the descriptor to the empty state. `page_no` is left stale.
    pub fn clear(&mut self) {
        self.valid = false;
        self.file = None;
        self.pin_count = 0;
        self.ref_bit = false;
        self.dirty = false;
    }

    /// Owning file and page, if the frame is valid.
    pub fn owner(&self) -> Option<(&Arc<dyn PageFile>, PageNo)> {
        if !self.valid {
            return None;
        }
        self.file.as_ref().map(|f| (f, self.page_no))
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }
}

impl fmt::Display for FrameDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) if self.valid => write!(
                f,
                "frame {}: file '{}' page {} pin={} dirty={} ref={}",
                self.frame_no,
                file.filename(),
                self.page_no,
                self.pin_count,
                self.dirty,
                self.ref_bit as u8,
            ),
            _ => write!(f, "frame {}: empty", self.frame_no),
        }
    }
}

impl fmt::Debug for FrameDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDesc")
            .field("frame_no", &self.frame_no)
            .field("valid", &self.valid)
            .field("file", &self.file.as_ref().map(|file| file.id()))
            .field("page_no", &self.page_no)
            .field("pin_count", &self.pin_count)
            .field("dirty", &self.dirty)
            .field("ref_bit", &self.ref_bit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::DiskFile;
    use tempfile::tempdir;

    #[test]
    fn test_new_frame_is_empty() {
        let desc = FrameDesc::new(3);
        assert_eq!(desc.frame_no, 3);
        assert!(!desc.valid);
        assert!(desc.file.is_none());
        assert_eq!(desc.pin_count, 0);
        assert!(!desc.dirty);
        assert!(!desc.ref_bit);
        assert!(desc.owner().is_none());
    }

    #[test]
    fn test_set_then_clear() {
        let dir = tempdir().unwrap();
        let file: Arc<dyn PageFile> =
            Arc::new(DiskFile::create(dir.path().join("t.db")).unwrap());

        let mut desc = FrameDesc::new(0);
        desc.set(Arc::clone(&file), PageNo(5));

        assert!(desc.valid);
        assert_eq!(desc.page_no, PageNo(5));
        assert_eq!(desc.pin_count, 1);
        assert!(desc.ref_bit);
        assert!(!desc.dirty);
        let (owner, page_no) = desc.owner().unwrap();
        assert_eq!(owner.id(), file.id());
        assert_eq!(page_no, PageNo(5));

        desc.dirty = true;
        desc.clear();

        assert!(!desc.valid);
        assert!(desc.file.is_none());
        assert_eq!(desc.pin_count, 0);
        assert!(!desc.dirty);
        assert!(!desc.ref_bit);
    }

    #[test]
    fn test_display() {
        let desc = FrameDesc::new(1);
        assert_eq!(desc.to_string(), "frame 1: empty");
    }
}
