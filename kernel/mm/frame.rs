//! Physical frame allocator
//!
//! Manages allocation and deallocation of physical frames, shared by every
//! address space. The pool also owns the core map so that a frame's
//! allocation bit and its owner record change together.

use crate::kernel::mm::coremap::{CoreMap, CoreMapEntry};
use crate::kernel::ThreadId;
use crate::utils::bitmap::Bitmap;
use crate::{Error, Result};

/// Free-frame bitmap
#[derive(Debug, Clone)]
pub struct FrameAllocator {
    /// Bitmap tracking allocated/free frames
    bitmap: Bitmap,
}

impl FrameAllocator {
    /// Create an allocator with every frame free
    pub fn new(total_frames: usize) -> Self {
        Self {
            bitmap: Bitmap::new(total_frames),
        }
    }

    /// Allocate the lowest free frame
    pub fn find(&mut self) -> Option<u32> {
        self.bitmap.find().map(|index| index as u32)
    }

    /// Return a frame to the pool. Returns false if it was not allocated.
    pub fn clear(&mut self, frame: u32) -> bool {
        self.bitmap.clear(frame as usize)
    }

    /// Number of free frames
    pub fn count_clear(&self) -> usize {
        self.bitmap.num_clear()
    }

    /// Whether `frame` is allocated
    pub fn is_allocated(&self, frame: u32) -> bool {
        self.bitmap.test(frame as usize)
    }

    /// Total number of frames
    pub fn total_frames(&self) -> usize {
        self.bitmap.len()
    }
}

/// Frame allocator statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Total number of frames
    pub total_frames: usize,
    /// Number of free frames
    pub free_frames: usize,
    /// Number of allocated frames
    pub allocated_frames: usize,
}

/// Global pool of physical frames with their owners
#[derive(Debug, Clone)]
pub struct FramePool {
    allocator: FrameAllocator,
    coremap: CoreMap,
}

impl FramePool {
    pub fn new(total_frames: usize) -> Self {
        Self {
            allocator: FrameAllocator::new(total_frames),
            coremap: CoreMap::new(total_frames),
        }
    }

    /// Allocate a free frame and record its owner
    pub fn allocate(&mut self, owner: ThreadId, virtual_page: u32) -> Option<u32> {
        let frame = self.allocator.find()?;
        if self.coremap.assign(frame, owner, virtual_page).is_err() {
            self.allocator.clear(frame);
            return None;
        }
        Some(frame)
    }

    /// Release `frame` and forget its owner
    pub fn release(&mut self, frame: u32) -> Result<CoreMapEntry> {
        let entry = self.coremap.release(frame).ok_or(Error::InvalidState)?;
        if !self.allocator.clear(frame) {
            return Err(Error::InvalidState);
        }
        Ok(entry)
    }

    /// Owner of `frame`
    pub fn owner_of(&self, frame: u32) -> Option<CoreMapEntry> {
        self.coremap.get(frame)
    }

    /// Frames owned by `owner`
    pub fn frames_of(&self, owner: ThreadId) -> impl Iterator<Item = u32> + '_ {
        self.coremap.frames_of(owner)
    }

    /// Number of free frames
    pub fn count_clear(&self) -> usize {
        self.allocator.count_clear()
    }

    /// Total number of frames
    pub fn total_frames(&self) -> usize {
        self.allocator.total_frames()
    }

    /// Get memory usage statistics
    pub fn stats(&self) -> FrameStats {
        let free_frames = self.allocator.count_clear();
        FrameStats {
            total_frames: self.allocator.total_frames(),
            free_frames,
            allocated_frames: self.allocator.total_frames() - free_frames,
        }
    }
}
