//! Random number utilities
//!
//! Pseudo-random generation for replacement decisions. The generator is an
//! owned value so that every consumer can be seeded and replayed.

/// Default generator seed
pub const DEFAULT_SEED: u32 = 0xdeadbeef;

/// Simple linear congruential generator
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    /// Create a generator from a seed
    pub const fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Reseed the generator
    pub fn seed(&mut self, seed: u32) {
        self.state = seed;
    }

    /// Generate the next u32 value
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1103515245).wrapping_add(12345);
        // The low bits of an LCG cycle with a short period.
        self.state.rotate_right(16)
    }

    /// Generate a value in `[min, max)`
    pub fn range(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        min + (self.next_u32() % (max - min))
    }

    /// Generate an index in `[0, len)`
    pub fn index(&mut self, len: usize) -> usize {
        self.range(0, len as u32) as usize
    }
}

impl Default for Lcg {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
