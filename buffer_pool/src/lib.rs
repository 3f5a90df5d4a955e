//! A single-threaded buffer pool manager with CLOCK replacement.
//!
//! This crate is the "external collaborator" the B+-tree core consumes: it
//! pins pages in memory behind a [`PageGuard`] that unpins automatically on
//! drop and marks its frame dirty the moment a caller takes a mutable view.
//! Concurrent access from multiple threads is out of scope (see the core
//! crate's non-goals) so frames use plain interior mutability (`RefCell`)
//! rather than the per-frame locks a concurrent implementation would need.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

pub use paged_file::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use paged_file::{PagedFile, PagedFileError};
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum BpmError {
    #[error("buffer pool exhausted: no free frames to evict")]
    NoFreeFrames,
    #[error(transparent)]
    Io(#[from] PagedFileError),
}

/// A pinned page. Provides read access via `Deref`; taking a mutable view
/// via `DerefMut` marks the frame dirty. Dropping the guard unpins the page
/// exactly once.
pub trait PageGuard: Deref<Target = [u8]> + DerefMut {
    fn page_id(&self) -> PageId;
}

/// The behavior every buffer pool manager implementation must provide.
pub trait BufferPoolManager {
    /// Fetches a page, reading it from disk on a miss, and pins it.
    fn fetch_page(&self, page_id: PageId) -> Result<Box<dyn PageGuard + '_>, BpmError>;

    /// Allocates a new page in the backing paged file and pins it.
    fn new_page(&self) -> Result<Box<dyn PageGuard + '_>, BpmError>;

    /// Flushes `page_id` to disk if dirty.
    fn flush_page(&self, page_id: PageId) -> Result<(), BpmError>;

    /// Flushes every dirty frame to disk.
    fn flush_all_pages(&self) -> Result<(), BpmError>;
}

type FrameId = usize;

struct Frame {
    page_id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    pin_count: usize,
    is_dirty: bool,
    is_referenced: bool,
}

/// A CLOCK-replacement buffer pool over a single [`PagedFile`].
pub struct BufferPool {
    frames: Vec<RefCell<Frame>>,
    page_table: RefCell<HashMap<PageId, FrameId>>,
    free_list: RefCell<Vec<FrameId>>,
    paged_file: Rc<PagedFile>,
    pool_size: usize,
    clock_hand: RefCell<usize>,
}

/// A pinned page owned by a [`BufferPool`]. Unpins on drop.
pub struct PoolPageGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame_id: FrameId,
}

impl<'a> PageGuard for PoolPageGuard<'a> {
    fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl<'a> Deref for PoolPageGuard<'a> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        // Safe: the guard holds a pin on this frame, so the pool will not
        // evict or reuse it for the guard's lifetime.
        let frame = self.pool.frames[self.frame_id].borrow();
        unsafe { &*(frame.data.as_slice() as *const [u8]) }
    }
}

impl<'a> DerefMut for PoolPageGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        let mut frame = self.pool.frames[self.frame_id].borrow_mut();
        frame.is_dirty = true;
        unsafe { &mut *(frame.data.as_mut_slice() as *mut [u8]) }
    }
}

impl<'a> Drop for PoolPageGuard<'a> {
    fn drop(&mut self) {
        self.pool.unpin(self.page_id);
    }
}

impl BufferPool {
    pub fn new(pool_size: usize, paged_file: Rc<PagedFile>) -> Self {
        let frames = (0..pool_size)
            .map(|_| {
                RefCell::new(Frame {
                    page_id: INVALID_PAGE_ID,
                    data: Box::new([0; PAGE_SIZE]),
                    pin_count: 0,
                    is_dirty: false,
                    is_referenced: false,
                })
            })
            .collect();
        let free_list = RefCell::new((0..pool_size).collect());
        Self {
            frames,
            page_table: RefCell::new(HashMap::new()),
            free_list,
            paged_file,
            pool_size,
            clock_hand: RefCell::new(0),
        }
    }

    fn unpin(&self, page_id: PageId) {
        let page_table = self.page_table.borrow();
        if let Some(&frame_id) = page_table.get(&page_id) {
            let mut frame = self.frames[frame_id].borrow_mut();
            if frame.pin_count > 0 {
                frame.pin_count -= 1;
            }
            trace!(page_id, pin_count = frame.pin_count, "unpin_page");
        }
    }

    fn find_victim_frame(&self) -> Result<FrameId, BpmError> {
        if let Some(frame_id) = self.free_list.borrow_mut().pop() {
            return Ok(frame_id);
        }

        let mut clock_hand = self.clock_hand.borrow_mut();
        for _ in 0..(2 * self.pool_size) {
            let frame_id = *clock_hand;
            let mut frame = self.frames[frame_id].borrow_mut();
            if frame.pin_count == 0 {
                if frame.is_referenced {
                    frame.is_referenced = false;
                } else {
                    *clock_hand = (*clock_hand + 1) % self.pool_size;
                    return Ok(frame_id);
                }
            }
            *clock_hand = (*clock_hand + 1) % self.pool_size;
        }

        Err(BpmError::NoFreeFrames)
    }

    fn flush_frame_if_dirty(&self, frame_id: FrameId) -> Result<(), BpmError> {
        let mut frame = self.frames[frame_id].borrow_mut();
        if frame.is_dirty {
            self.paged_file.write_page(frame.page_id, &frame.data[..])?;
            frame.is_dirty = false;
        }
        Ok(())
    }
}

impl BufferPoolManager for BufferPool {
    fn fetch_page(&self, page_id: PageId) -> Result<Box<dyn PageGuard + '_>, BpmError> {
        if let Some(&frame_id) = self.page_table.borrow().get(&page_id) {
            let mut frame = self.frames[frame_id].borrow_mut();
            frame.pin_count += 1;
            frame.is_referenced = true;
            drop(frame);
            trace!(page_id, "fetch_page (hit)");
            return Ok(Box::new(PoolPageGuard {
                pool: self,
                page_id,
                frame_id,
            }));
        }

        let frame_id = self.find_victim_frame()?;
        self.flush_frame_if_dirty(frame_id)?;

        let mut frame = self.frames[frame_id].borrow_mut();
        let old_page_id = frame.page_id;
        self.paged_file.read_page(page_id, &mut frame.data[..])?;
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        frame.is_referenced = true;
        drop(frame);

        let mut page_table = self.page_table.borrow_mut();
        page_table.remove(&old_page_id);
        page_table.insert(page_id, frame_id);

        trace!(page_id, "fetch_page (miss)");
        Ok(Box::new(PoolPageGuard {
            pool: self,
            page_id,
            frame_id,
        }))
    }

    fn new_page(&self) -> Result<Box<dyn PageGuard + '_>, BpmError> {
        let new_page_id = self.paged_file.allocate_page()?;

        let frame_id = self.find_victim_frame()?;
        self.flush_frame_if_dirty(frame_id)?;

        let mut frame = self.frames[frame_id].borrow_mut();
        let old_page_id = frame.page_id;
        frame.page_id = new_page_id;
        frame.pin_count = 1;
        frame.is_dirty = true;
        frame.is_referenced = true;
        frame.data = Box::new([0; PAGE_SIZE]);
        drop(frame);

        let mut page_table = self.page_table.borrow_mut();
        page_table.remove(&old_page_id);
        page_table.insert(new_page_id, frame_id);

        debug!(page_id = new_page_id, "new_page");
        Ok(Box::new(PoolPageGuard {
            pool: self,
            page_id: new_page_id,
            frame_id,
        }))
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BpmError> {
        if let Some(&frame_id) = self.page_table.borrow().get(&page_id) {
            self.flush_frame_if_dirty(frame_id)?;
        }
        Ok(())
    }

    fn flush_all_pages(&self) -> Result<(), BpmError> {
        let frame_ids: Vec<FrameId> = self.page_table.borrow().values().copied().collect();
        for frame_id in frame_ids {
            self.flush_frame_if_dirty(frame_id)?;
        }
        Ok(())
    }
}
