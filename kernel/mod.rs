//! Kernel side of the VM subsystem
//!
//! Frame management, executable loading, address spaces and the manager
//! that ties them to the MMU: fault handling, eviction and context switch.

pub mod fs;
pub mod mm;
pub mod vmm;

use core::fmt;

/// Identity of the thread owning an address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread {}", self.0)
    }
}
