//! Fixed-size free map
//!
//! One bit per item, a set bit meaning "in use". Backs the physical frame
//! allocator.

use alloc::vec;
use alloc::vec::Vec;

const WORD_BITS: usize = u64::BITS as usize;

/// Bitmap over `len` items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// Create a bitmap with every item clear
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Number of items tracked
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether item `which` is in use. Out-of-range items never are.
    pub fn test(&self, which: usize) -> bool {
        which < self.len && self.words[which / WORD_BITS] & Self::mask(which) != 0
    }

    /// Mark item `which` as in use. Returns false if out of range.
    pub fn mark(&mut self, which: usize) -> bool {
        if which >= self.len {
            return false;
        }
        self.words[which / WORD_BITS] |= Self::mask(which);
        true
    }

    /// Mark item `which` as free. Returns false if it was not in use.
    pub fn clear(&mut self, which: usize) -> bool {
        if !self.test(which) {
            return false;
        }
        self.words[which / WORD_BITS] &= !Self::mask(which);
        true
    }

    /// Claim the lowest free item
    pub fn find(&mut self) -> Option<usize> {
        let (index, word) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)?;
        let which = index * WORD_BITS + word.trailing_ones() as usize;
        self.mark(which).then_some(which)
    }

    /// Number of free items
    pub fn num_clear(&self) -> usize {
        let used: u32 = self.words.iter().map(|word| word.count_ones()).sum();
        self.len - used as usize
    }

    fn mask(which: usize) -> u64 {
        1 << (which % WORD_BITS)
    }
}
