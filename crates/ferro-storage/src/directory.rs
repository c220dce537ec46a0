//! Frame directory - resident page index for the buffer pool.
//!
//! Maps `(FileId, PageNo)` to the frame holding that page. Keys follow
//! file handle identity, never paths, so two handles onto one path keep
//! disjoint resident sets.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::frame::FrameId;
use ferro_common::prelude::*;

/// O(1) expected-time index over the resident set.
pub struct FrameDirectory {
    entries: HashMap<(FileId, PageNo), FrameId>,
}

impl FrameDirectory {
    /// Create a directory sized for a pool of `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        // Leave ~20% headroom over the frame count, rounded up to odd.
        let mut capacity = num_frames + num_frames.div_ceil(5);
        if capacity % 2 == 0 {
            capacity += 1;
        }
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Register a resident page. Fails if the key is already present.
    pub fn insert(&mut self, file: FileId, page_no: PageNo, frame_no: FrameId) -> Result<()> {
        match self.entries.entry((file, page_no)) {
            Entry::Occupied(e) => Err(Error::Storage(StorageError::HashAlreadyPresent {
                page_no: page_no.0,
                frame_no: *e.get(),
            })),
            Entry::Vacant(v) => {
                v.insert(frame_no);
                Ok(())
            }
        }
    }

    /// Frame holding `(file, page_no)`, if resident.
    pub fn lookup(&self, file: FileId, page_no: PageNo) -> Option<FrameId> {
        self.entries.get(&(file, page_no)).copied()
    }

    /// Unregister a resident page, returning the frame it occupied.
    pub fn remove(&mut self, file: FileId, page_no: PageNo) -> Result<FrameId> {
        self.entries
            .remove(&(file, page_no))
            .ok_or(Error::Storage(StorageError::HashNotFound))
    }

    /// Resident pages of one file, in no particular order.
    pub fn pages_of(&self, file: FileId) -> impl Iterator<Item = (PageNo, FrameId)> + '_ {
        self.entries
            .iter()
            .filter(move |((f, _), _)| *f == file)
            .map(|((_, page_no), frame_no)| (*page_no, *frame_no))
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lookup_remove() {
        let mut dir = FrameDirectory::new(8);
        let file = FileId(1);

        assert_eq!(dir.lookup(file, PageNo(3)), None);

        dir.insert(file, PageNo(3), 5).unwrap();
        assert_eq!(dir.lookup(file, PageNo(3)), Some(5));
        assert_eq!(dir.len(), 1);

        assert_eq!(dir.remove(file, PageNo(3)).unwrap(), 5);
        assert_eq!(dir.lookup(file, PageNo(3)), None);
        assert!(dir.is_empty());
    }

    #[test]
    fn test_double_insert_fails() {
        let mut dir = FrameDirectory::new(8);
        dir.insert(FileId(1), PageNo(3), 5).unwrap();

        let err = dir.insert(FileId(1), PageNo(3), 6).unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::HashAlreadyPresent {
                page_no: 3,
                frame_no: 5
            })
        ));
        // Original mapping untouched
        assert_eq!(dir.lookup(FileId(1), PageNo(3)), Some(5));
    }

    #[test]
    fn test_remove_missing_fails() {
        let mut dir = FrameDirectory::new(8);
        let err = dir.remove(FileId(1), PageNo(3)).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::HashNotFound)));
    }

    #[test]
    fn test_files_keep_disjoint_keys() {
        let mut dir = FrameDirectory::new(8);
        dir.insert(FileId(1), PageNo(0), 0).unwrap();
        dir.insert(FileId(2), PageNo(0), 1).unwrap();

        assert_eq!(dir.lookup(FileId(1), PageNo(0)), Some(0));
        assert_eq!(dir.lookup(FileId(2), PageNo(0)), Some(1));
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_pages_of_filters_by_file() {
        let mut dir = FrameDirectory::new(8);
        dir.insert(FileId(1), PageNo(0), 0).unwrap();
        dir.insert(FileId(1), PageNo(7), 2).unwrap();
        dir.insert(FileId(2), PageNo(0), 1).unwrap();

        let mut pages: Vec<_> = dir.pages_of(FileId(1)).collect();
        pages.sort();
        assert_eq!(pages, vec![(PageNo(0), 0), (PageNo(7), 2)]);
        assert_eq!(dir.pages_of(FileId(3)).count(), 0);
    }
}
