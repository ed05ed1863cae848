//! Core map: reverse index from physical frame to its owner
//!
//! Owners are recorded by thread identity, never by reference, so the map
//! has no lifetime ties to address spaces.

use crate::kernel::ThreadId;
use crate::{Error, Result};
use alloc::vec;
use alloc::vec::Vec;

/// Owner of one physical frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreMapEntry {
    /// Thread whose address space holds the frame
    pub owner: ThreadId,
    /// Virtual page the frame backs
    pub virtual_page: u32,
}

/// One slot per physical frame
#[derive(Debug, Clone)]
pub struct CoreMap {
    entries: Vec<Option<CoreMapEntry>>,
}

impl CoreMap {
    pub fn new(frames: usize) -> Self {
        Self {
            entries: vec![None; frames],
        }
    }

    /// Owner of `frame`, if any
    pub fn get(&self, frame: u32) -> Option<CoreMapEntry> {
        self.entries.get(frame as usize).copied().flatten()
    }

    /// Record `owner`/`virtual_page` as the owner of `frame`.
    ///
    /// A frame already claimed by someone must be released first.
    pub fn assign(&mut self, frame: u32, owner: ThreadId, virtual_page: u32) -> Result<()> {
        let slot = self
            .entries
            .get_mut(frame as usize)
            .ok_or(Error::InvalidState)?;
        if let Some(previous) = slot {
            log::error!(
                "frame {} already owned by {} (vpn {})",
                frame,
                previous.owner,
                previous.virtual_page
            );
            return Err(Error::InvalidState);
        }
        *slot = Some(CoreMapEntry { owner, virtual_page });
        Ok(())
    }

    /// Forget the owner of `frame`, returning it
    pub fn release(&mut self, frame: u32) -> Option<CoreMapEntry> {
        self.entries.get_mut(frame as usize)?.take()
    }

    /// Frames owned by `owner`
    pub fn frames_of(&self, owner: ThreadId) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, entry)| matches!(entry, Some(e) if e.owner == owner))
            .map(|(frame, _)| frame as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_and_release() {
        let mut map = CoreMap::new(4);
        map.assign(2, ThreadId(1), 7).unwrap();
        assert_eq!(
            map.get(2),
            Some(CoreMapEntry {
                owner: ThreadId(1),
                virtual_page: 7
            })
        );
        assert_eq!(map.release(2).map(|e| e.virtual_page), Some(7));
        assert_eq!(map.get(2), None);
    }

    #[test]
    fn test_frame_has_at_most_one_owner() {
        let mut map = CoreMap::new(4);
        map.assign(0, ThreadId(1), 0).unwrap();
        assert_eq!(map.assign(0, ThreadId(2), 3), Err(Error::InvalidState));
        assert_eq!(map.get(0).map(|e| e.owner), Some(ThreadId(1)));

        map.release(0);
        map.assign(0, ThreadId(2), 3).unwrap();
        assert_eq!(map.get(0).map(|e| e.owner), Some(ThreadId(2)));
    }

    #[test]
    fn test_out_of_range_frame() {
        let mut map = CoreMap::new(2);
        assert_eq!(map.assign(2, ThreadId(1), 0), Err(Error::InvalidState));
        assert_eq!(map.get(5), None);
        assert_eq!(map.release(5), None);
    }

    #[test]
    fn test_frames_of_owner() {
        let mut map = CoreMap::new(4);
        map.assign(0, ThreadId(1), 0).unwrap();
        map.assign(1, ThreadId(2), 0).unwrap();
        map.assign(3, ThreadId(1), 1).unwrap();
        assert_eq!(map.frames_of(ThreadId(1)).collect::<Vec<_>>(), vec![0, 3]);
    }
}
