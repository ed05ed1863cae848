//! nachos-vm - virtual-memory core of a MIPS-like teaching OS emulator
//!
//! The crate emulates the memory-management unit of the simulated machine
//! (physical memory, linear page table or TLB) and implements the kernel
//! side of per-process virtual memory: building address spaces from NOFF
//! executables, demand loading, and eviction to per-process swap files.
//!
//! Everything is driven through [`VmManager`], which owns the MMU, the
//! free-frame pool, the core map and every live [`AddressSpace`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Core modules
#[macro_use]
pub mod utils;
pub mod config;

// Machine emulation: memory, MMU, TLB, registers
pub mod emulator;

// Kernel side of the VM subsystem
pub mod kernel;

// Re-export key types for convenience
pub use config::{LoadingMode, MachineConfig, TranslationMode, VmConfig};
pub use emulator::{ExceptionKind, Mmu, Registers, TranslationEntry};
pub use kernel::fs::{FileSystem, MemFile, MemFileSystem, OpenFile};
pub use kernel::mm::space::{AddressSpace, PageEntry};
pub use kernel::vmm::{VmManager, VmStats};
pub use kernel::ThreadId;

use core::fmt;

/// nachos-vm version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid configuration
    InvalidConfig,
    /// Executable header is malformed or truncated
    InvalidExecutable,
    /// No physical frame can be obtained
    OutOfMemory,
    /// Unknown address space or file
    NotFound,
    /// Address space or file already exists
    AlreadyExists,
    /// Internal invariant violated
    InvalidState,
    /// Short read or write on a file
    Io,
    /// Machine exception raised by the MMU
    Exception(ExceptionKind),
}

impl From<ExceptionKind> for Error {
    fn from(kind: ExceptionKind) -> Self {
        Error::Exception(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig => f.write_str("invalid configuration"),
            Error::InvalidExecutable => f.write_str("invalid executable"),
            Error::OutOfMemory => f.write_str("out of physical memory"),
            Error::NotFound => f.write_str("not found"),
            Error::AlreadyExists => f.write_str("already exists"),
            Error::InvalidState => f.write_str("internal invariant violated"),
            Error::Io => f.write_str("short file transfer"),
            Error::Exception(kind) => write!(f, "machine exception: {}", kind),
        }
    }
}

/// Result type alias
pub type Result<T> = ::core::result::Result<T, Error>;
