//! Machine emulation
//!
//! The "hardware" half of the VM subsystem: physical memory, the MMU with
//! its TLB, translation entries, the register file and the exceptions the
//! machine raises. Nothing here knows about processes or files.

pub mod endian;
pub mod exception;
pub mod mmu;
pub mod policy;
pub mod registers;
pub mod tlb;
pub mod translation;

pub use exception::ExceptionKind;
pub use mmu::{Mmu, PageTable};
pub use policy::{RandomChoice, ReplacementPolicy, RoundRobin};
pub use registers::Registers;
pub use tlb::Tlb;
pub use translation::{EntryFlags, TranslationEntry};
