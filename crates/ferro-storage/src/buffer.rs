//! Buffer pool implementation for FerroDB.
//!
//! Keeps a bounded working set of page frames between clients and the page
//! file layer:
//! - CLOCK eviction with a per-frame reference bit (one second chance)
//! - Pin counting to prevent eviction of pages in use
//! - Dirty page tracking with write-back before frame reuse
//! - A hash directory for O(1) residency lookups
//!
//! All entry points serialize on one pool-wide mutex; file I/O happens
//! under that lock. Payload slots are shared out to clients as
//! [`PageHandle`]s backed by per-frame `RwLock`s whose addresses are
//! stable for the pool's lifetime. A handle must only be used while the
//! client's pin is held: the pin is what keeps the frame from being
//! recycled under the handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, trace, warn};

use crate::directory::FrameDirectory;
use crate::file::PageFile;
use crate::frame::{FrameDesc, FrameId};
use crate::page::Page;
use ferro_common::prelude::*;

/// Client view of a resident page.
///
/// Cheap to clone (it is an `Arc`); valid for as long as the pin taken by
/// the `read_page`/`alloc_page` call that produced it. Writing through the
/// handle does not mark the page dirty by itself - pass `dirty = true` to
/// [`BufferPool::unpin_page`] when done.
#[derive(Debug)]
pub struct PageHandle {
    payload: Arc<RwLock<Page>>,
}

impl PageHandle {
    /// Lock the page for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.payload.read()
    }

    /// Lock the page for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Page> {
        self.payload.write()
    }

    pub fn page_no(&self) -> PageNo {
        self.payload.read().page_no()
    }
}

impl Clone for PageHandle {
    fn clone(&self) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
        }
    }
}

/// Buffer pool manager with CLOCK replacement.
pub struct BufferPool {
    inner: Mutex<PoolInner>,
}

struct PoolInner {
    frames: Vec<FrameDesc>,
    payloads: Vec<Arc<RwLock<Page>>>,
    directory: FrameDirectory,
    clock_hand: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    write_backs: u64,
}

impl BufferPool {
    /// Create a pool with a fixed number of frames.
    ///
    /// # Panics
    ///
    /// Panics if `num_frames` is zero.
    pub fn new(num_frames: usize) -> Self {
        assert!(num_frames > 0, "buffer pool requires at least one frame");

        let frames = (0..num_frames).map(FrameDesc::new).collect();
        let payloads = (0..num_frames)
            .map(|_| Arc::new(RwLock::new(Page::new(PageNo::INVALID))))
            .collect();

        Self {
            inner: Mutex::new(PoolInner {
                frames,
                payloads,
                directory: FrameDirectory::new(num_frames),
                // Start just before frame 0; the hand advances before it
                // inspects, so the first sweep begins at 0.
                clock_hand: num_frames - 1,
                hits: 0,
                misses: 0,
                evictions: 0,
                write_backs: 0,
            }),
        }
    }

    /// Create a pool sized from a [`StorageConfig`].
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| Error::Config(errors.join("; ")))?;
        Ok(Self::new(config.buffer_pool_frames))
    }

    /// Fetch a page, pinning its frame. Loads from `file` on a miss.
    pub fn read_page(&self, file: &Arc<dyn PageFile>, page_no: PageNo) -> Result<PageHandle> {
        let mut inner = self.inner.lock();
        let result = inner.read_page(file, page_no);
        debug_assert!(inner.invariants_hold());
        result
    }

    /// Release one pin on `(file, page_no)`, optionally marking it dirty.
    ///
    /// Unpinning a page that is not resident is a silent no-op; unpinning
    /// a resident page whose pin count is already zero is an error.
    pub fn unpin_page(
        &self,
        file: &Arc<dyn PageFile>,
        page_no: PageNo,
        dirty: bool,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let result = inner.unpin_page(file, page_no, dirty);
        debug_assert!(inner.invariants_hold());
        result
    }

    /// Allocate a fresh page in `file` and pin it into a frame.
    pub fn alloc_page(&self, file: &Arc<dyn PageFile>) -> Result<(PageNo, PageHandle)> {
        let mut inner = self.inner.lock();
        let result = inner.alloc_page(file);
        debug_assert!(inner.invariants_hold());
        result
    }

    /// Drop a page from the pool (it must be unpinned) and delete it from
    /// its file. The file-layer delete happens whether or not the page was
    /// resident.
    pub fn dispose_page(&self, file: &Arc<dyn PageFile>, page_no: PageNo) -> Result<()> {
        let mut inner = self.inner.lock();
        let result = inner.dispose_page(file, page_no);
        debug_assert!(inner.invariants_hold());
        result
    }

    /// Write back and drop every resident page of `file`.
    ///
    /// Fails on the first pinned page encountered; pages processed before
    /// the failure stay flushed and evicted.
    pub fn flush_file(&self, file: &Arc<dyn PageFile>) -> Result<()> {
        let mut inner = self.inner.lock();
        let result = inner.flush_file(file);
        debug_assert!(inner.invariants_hold());
        result
    }

    /// Get buffer pool statistics.
    pub fn stats(&self) -> crate::BufferPoolStats {
        self.inner.lock().stats()
    }

    /// Dump one descriptor line per frame plus a valid-frame summary.
    pub fn print_self(&self) {
        println!("{}", self);
    }
}

impl fmt::Display for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let mut valid_frames = 0;
        for desc in &inner.frames {
            writeln!(f, "{}", desc)?;
            if desc.valid {
                valid_frames += 1;
            }
        }
        write!(f, "Total Number of Valid Frames: {}", valid_frames)
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        // Dirty pages reach their files even when a client leaked a pin.
        self.inner.lock().flush_all_on_teardown();
    }
}

impl PoolInner {
    fn num_frames(&self) -> usize {
        self.frames.len()
    }

    fn handle(&self, frame_no: FrameId) -> PageHandle {
        PageHandle {
            payload: Arc::clone(&self.payloads[frame_no]),
        }
    }

    fn read_page(&mut self, file: &Arc<dyn PageFile>, page_no: PageNo) -> Result<PageHandle> {
        if let Some(frame_no) = self.directory.lookup(file.id(), page_no) {
            let desc = &mut self.frames[frame_no];
            desc.ref_bit = true;
            desc.pin_count += 1;
            self.hits += 1;
            trace!(file = %file.id(), page_no = %page_no, frame_no, "buffer pool hit");
            return Ok(self.handle(frame_no));
        }

        self.misses += 1;
        debug!(file = %file.id(), page_no = %page_no, "buffer pool miss, loading from disk");

        let frame_no = self.alloc_frame()?;
        // A failed read leaves the frame empty and the directory untouched.
        let page = file.read_page(page_no)?;
        *self.payloads[frame_no].write() = page;
        self.directory.insert(file.id(), page_no, frame_no)?;
        self.frames[frame_no].set(Arc::clone(file), page_no);

        Ok(self.handle(frame_no))
    }

    fn unpin_page(
        &mut self,
        file: &Arc<dyn PageFile>,
        page_no: PageNo,
        dirty: bool,
    ) -> Result<()> {
        // Not resident: nothing to unpin.
        let Some(frame_no) = self.directory.lookup(file.id(), page_no) else {
            return Ok(());
        };

        let desc = &mut self.frames[frame_no];
        if desc.pin_count == 0 {
            return Err(Error::Storage(StorageError::PageNotPinned {
                filename: file.filename(),
                page_no: page_no.0,
                frame_no,
            }));
        }

        if dirty {
            // Sticky until the page is written back or evicted.
            desc.dirty = true;
        }
        desc.pin_count -= 1;
        Ok(())
    }

    fn alloc_page(&mut self, file: &Arc<dyn PageFile>) -> Result<(PageNo, PageHandle)> {
        let page = file.allocate_page()?;
        let page_no = page.page_no();

        let frame_no = self.alloc_frame()?;
        *self.payloads[frame_no].write() = page;
        self.directory.insert(file.id(), page_no, frame_no)?;
        self.frames[frame_no].set(Arc::clone(file), page_no);

        debug!(file = %file.id(), page_no = %page_no, frame_no, "allocated new page");
        Ok((page_no, self.handle(frame_no)))
    }

    fn dispose_page(&mut self, file: &Arc<dyn PageFile>, page_no: PageNo) -> Result<()> {
        if let Some(frame_no) = self.directory.lookup(file.id(), page_no) {
            if self.frames[frame_no].is_pinned() {
                return Err(Error::Storage(StorageError::PagePinned {
                    filename: file.filename(),
                    page_no: page_no.0,
                    frame_no,
                }));
            }
            self.directory.remove(file.id(), page_no)?;
            self.frames[frame_no].clear();
        }

        file.delete_page(page_no)
    }

    fn flush_file(&mut self, file: &Arc<dyn PageFile>) -> Result<()> {
        let target = file.id();

        // Walk the directory, not the frame-file pointers: a directory
        // entry aimed at a non-valid frame is an invariant breach this
        // pass must surface rather than skip. Frame order keeps the
        // processing sequence stable across calls.
        let mut resident: Vec<(PageNo, FrameId)> = self.directory.pages_of(target).collect();
        resident.sort_by_key(|&(_, frame_no)| frame_no);

        for (page_no, frame_no) in resident {
            let desc = &self.frames[frame_no];
            if desc.is_pinned() {
                return Err(Error::Storage(StorageError::PagePinned {
                    filename: file.filename(),
                    page_no: page_no.0,
                    frame_no,
                }));
            }
            if !desc.valid {
                return Err(Error::Storage(StorageError::BadBuffer {
                    frame_no,
                    valid: desc.valid,
                    dirty: desc.dirty,
                    ref_bit: desc.ref_bit,
                }));
            }

            if desc.dirty {
                let page = self.payloads[frame_no].read();
                file.write_page(&page)?;
                drop(page);
                self.frames[frame_no].dirty = false;
                self.write_backs += 1;
                trace!(file = %target, page_no = %page_no, frame_no, "flushed dirty page");
            }

            self.directory.remove(target, page_no)?;
            self.frames[frame_no].clear();
        }

        debug!(file = %target, "flushed file");
        Ok(())
    }

    /// CLOCK victim selection.
    ///
    /// Returns an empty frame; a valid victim is written back (if dirty),
    /// removed from the directory, and cleared before it is handed out.
    /// Installing the new page is the caller's job.
    fn alloc_frame(&mut self) -> Result<FrameId> {
        let num_frames = self.num_frames();
        // Counts pinned frames skipped by this invocation only; a full
        // sweep of nothing but pinned frames means the pool is exhausted.
        let mut pinned_skips = 0;

        loop {
            self.clock_hand = (self.clock_hand + 1) % num_frames;
            let hand = self.clock_hand;

            if !self.frames[hand].valid {
                return Ok(hand);
            }

            if self.frames[hand].is_pinned() {
                pinned_skips += 1;
                if pinned_skips == num_frames {
                    return Err(Error::Storage(StorageError::BufferExceeded));
                }
                continue;
            }

            if self.frames[hand].ref_bit {
                // Second chance: referenced since the hand last passed.
                self.frames[hand].ref_bit = false;
                continue;
            }

            // Cold frame: the victim. Write-back happens before the
            // directory entry goes away and before the frame is reused.
            let owner = self.frames[hand]
                .owner()
                .map(|(f, page_no)| (Arc::clone(f), page_no));
            if let Some((file, page_no)) = owner {
                if self.frames[hand].dirty {
                    let page = self.payloads[hand].read();
                    file.write_page(&page)?;
                    drop(page);
                    self.frames[hand].dirty = false;
                    self.write_backs += 1;
                }
                self.directory.remove(file.id(), page_no)?;
                self.evictions += 1;
                trace!(file = %file.id(), page_no = %page_no, frame_no = hand, "evicted page");
            }
            self.frames[hand].clear();

            return Ok(hand);
        }
    }

    fn flush_all_on_teardown(&mut self) {
        for frame_no in 0..self.num_frames() {
            let desc = &self.frames[frame_no];
            if !desc.valid || !desc.dirty {
                continue;
            }
            if desc.is_pinned() {
                warn!(
                    frame_no,
                    page_no = %desc.page_no,
                    pin_count = desc.pin_count,
                    "page still pinned at pool teardown"
                );
            }

            let owner = desc.owner().map(|(f, page_no)| (Arc::clone(f), page_no));
            if let Some((file, page_no)) = owner {
                let page = self.payloads[frame_no].read();
                match file.write_page(&page) {
                    Ok(()) => {
                        drop(page);
                        self.frames[frame_no].dirty = false;
                        self.write_backs += 1;
                    }
                    Err(e) => {
                        error!(
                            frame_no,
                            page_no = %page_no,
                            error = %e,
                            "failed to write back dirty page at teardown"
                        );
                    }
                }
            }
        }
    }

    fn stats(&self) -> crate::BufferPoolStats {
        let mut valid = 0;
        let mut dirty = 0;
        let mut pinned = 0;

        for desc in &self.frames {
            if desc.valid {
                valid += 1;
                if desc.dirty {
                    dirty += 1;
                }
                if desc.is_pinned() {
                    pinned += 1;
                }
            }
        }

        crate::BufferPoolStats {
            total_frames: self.num_frames(),
            valid_frames: valid,
            dirty_frames: dirty,
            pinned_frames: pinned,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            write_backs: self.write_backs,
        }
    }

    /// Structural invariants checked after every public call in debug
    /// builds: directory and frame table are bijective over valid frames,
    /// and invalid frames are fully cleared.
    fn invariants_hold(&self) -> bool {
        let valid_count = self.frames.iter().filter(|d| d.valid).count();
        if valid_count != self.directory.len() {
            return false;
        }

        for (frame_no, desc) in self.frames.iter().enumerate() {
            if desc.valid {
                let Some(file_id) = desc.file.as_ref().map(|f| f.id()) else {
                    return false;
                };
                if self.directory.lookup(file_id, desc.page_no) != Some(frame_no) {
                    return false;
                }
            } else if desc.pin_count != 0
                || desc.dirty
                || desc.ref_bit
                || desc.file.is_some()
            {
                return false;
            }
        }

        true
    }
}
