//! Translation lookaside buffer
//!
//! A small fully associative cache of translation entries. Its contents
//! belong to whichever address space is running; the kernel invalidates it
//! on every context switch.

use crate::config::MAX_TLB_SIZE;
use crate::emulator::policy::{ReplacementPolicy, RoundRobin};
use crate::emulator::translation::TranslationEntry;
use alloc::boxed::Box;
use heapless::Vec;

/// Associative TLB
#[derive(Debug)]
pub struct Tlb {
    /// Slots, all present from creation
    slots: Vec<TranslationEntry, MAX_TLB_SIZE>,
    /// Slot replacement policy
    policy: Box<dyn ReplacementPolicy>,
}

impl Tlb {
    /// Create a TLB with `size` invalid slots and FIFO replacement
    pub fn new(size: usize) -> Self {
        Self::with_policy(size, Box::new(RoundRobin::new()))
    }

    /// Create a TLB with a custom replacement policy.
    ///
    /// `size` must be between 1 and `MAX_TLB_SIZE`; larger values are capped.
    pub fn with_policy(size: usize, policy: Box<dyn ReplacementPolicy>) -> Self {
        debug_assert!(
            size > 0 && size <= MAX_TLB_SIZE,
            "TLB size {} out of range",
            size
        );
        if size > MAX_TLB_SIZE {
            log::warn!("TLB size {} capped to {}", size, MAX_TLB_SIZE);
        }
        let mut slots = Vec::new();
        for _ in 0..size.min(MAX_TLB_SIZE) {
            // Capacity is MAX_TLB_SIZE and we never push past it.
            let _ = slots.push(TranslationEntry::invalid());
        }
        Self { slots, policy }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get a slot
    pub fn slot(&self, index: usize) -> Option<&TranslationEntry> {
        self.slots.get(index)
    }

    /// Iterate over all slots
    pub fn iter(&self) -> impl Iterator<Item = &TranslationEntry> {
        self.slots.iter()
    }

    /// Find the valid entry caching virtual page `vpn`
    pub fn lookup_mut(&mut self, vpn: u32) -> Option<&mut TranslationEntry> {
        self.slots
            .iter_mut()
            .find(|entry| entry.valid() && entry.virtual_page == vpn)
    }

    /// Slots whose valid entry maps physical frame `frame`
    pub fn slots_caching_frame(&self, frame: u32) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(_, entry)| entry.valid() && entry.physical_page == frame)
            .map(|(index, _)| index)
    }

    /// Invalidate a slot, returning its previous contents if they were valid
    pub fn take(&mut self, index: usize) -> Option<TranslationEntry> {
        let slot = self.slots.get_mut(index)?;
        if !slot.valid() {
            return None;
        }
        let previous = *slot;
        slot.set_valid(false);
        Some(previous)
    }

    /// Install `entry` into the slot chosen by the replacement policy.
    ///
    /// Returns the slot index and the valid entry it displaced, if any.
    pub fn load(&mut self, entry: TranslationEntry) -> (usize, Option<TranslationEntry>) {
        let index = self.policy.victim(self.slots.len());
        let displaced = self.take(index);
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = entry;
        }
        (index, displaced)
    }

    /// Invalidate every slot
    pub fn invalidate_all(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.set_valid(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tlb_is_all_invalid() {
        let tlb = Tlb::new(4);
        assert_eq!(tlb.len(), 4);
        assert!(tlb.iter().all(|e| !e.valid()));
    }

    #[test]
    fn test_lookup_matches_only_valid_entries() {
        let mut tlb = Tlb::new(2);
        tlb.load(TranslationEntry::new(5, 1));
        assert_eq!(tlb.lookup_mut(5).map(|e| e.physical_page), Some(1));
        assert!(tlb.lookup_mut(6).is_none());

        tlb.invalidate_all();
        assert!(tlb.lookup_mut(5).is_none());
    }

    #[test]
    fn test_load_is_fifo_and_reports_displaced() {
        let mut tlb = Tlb::new(2);
        assert_eq!(tlb.load(TranslationEntry::new(0, 10)), (0, None));
        assert_eq!(tlb.load(TranslationEntry::new(1, 11)), (1, None));

        let (index, displaced) = tlb.load(TranslationEntry::new(2, 12));
        assert_eq!(index, 0);
        assert_eq!(displaced, Some(TranslationEntry::new(0, 10)));
        assert!(tlb.lookup_mut(0).is_none());
        assert!(tlb.lookup_mut(2).is_some());
    }

    #[test]
    fn test_take_and_frame_search() {
        let mut tlb = Tlb::new(3);
        tlb.load(TranslationEntry::new(0, 7));
        tlb.load(TranslationEntry::new(1, 8));

        assert_eq!(tlb.slots_caching_frame(8).collect::<std::vec::Vec<_>>(), vec![1]);
        assert_eq!(tlb.take(1).map(|e| e.virtual_page), Some(1));
        assert_eq!(tlb.take(1), None);
        assert_eq!(tlb.slots_caching_frame(8).count(), 0);
    }

    #[test]
    fn test_full_size_tlb() {
        let tlb = Tlb::new(MAX_TLB_SIZE);
        assert_eq!(tlb.len(), MAX_TLB_SIZE);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_oversized_tlb_is_rejected() {
        Tlb::new(MAX_TLB_SIZE + 10);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_empty_tlb_is_rejected() {
        Tlb::new(0);
    }
}
