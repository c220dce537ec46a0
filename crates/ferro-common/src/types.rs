//! Core types for FerroDB

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an open page file.
///
/// Assigned from a process-wide counter when a file handle is created, so
/// identity follows the handle, not the path: two handles onto the same
/// path get distinct ids and therefore distinct resident sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub u64);

/// Unique identifier for a page within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageNo(pub u64);

impl PageNo {
    pub const INVALID: PageNo = PageNo(u64::MAX);

    pub fn is_valid(&self) -> bool {
        self.0 != u64::MAX
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file:{}", self.0)
    }
}

impl fmt::Display for PageNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
