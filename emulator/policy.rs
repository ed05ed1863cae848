//! Replacement policies
//!
//! A policy picks the slot to overwrite when a fixed-size structure is
//! full: the TLB uses [`RoundRobin`], victim-frame selection uses
//! [`RandomChoice`]. Both are deliberately simple and must stay that way,
//! since eviction order is observable.

use crate::utils::random::Lcg;
use core::fmt;

/// Chooses a victim index in `[0, slots)`
pub trait ReplacementPolicy: fmt::Debug {
    /// Pick the next victim
    fn victim(&mut self, slots: usize) -> usize;

    /// Policy name for diagnostics
    fn name(&self) -> &'static str;
}

/// FIFO over slot indices: 0, 1, ..., slots - 1, 0, ...
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    next: usize,
}

impl RoundRobin {
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Index the next call to `victim` will return
    pub fn peek(&self) -> usize {
        self.next
    }
}

impl ReplacementPolicy for RoundRobin {
    fn victim(&mut self, slots: usize) -> usize {
        if slots == 0 {
            return 0;
        }
        let victim = self.next % slots;
        self.next = (victim + 1) % slots;
        victim
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Uniformly random slot
#[derive(Debug, Clone)]
pub struct RandomChoice {
    rng: Lcg,
}

impl RandomChoice {
    pub fn new(seed: u32) -> Self {
        Self { rng: Lcg::new(seed) }
    }
}

impl Default for RandomChoice {
    fn default() -> Self {
        Self { rng: Lcg::default() }
    }
}

impl ReplacementPolicy for RandomChoice {
    fn victim(&mut self, slots: usize) -> usize {
        self.rng.index(slots)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
