//! Machine exception kinds
//!
//! Every failure the MMU can report is one of these kinds; the trap
//! front end dispatches on them.

use core::fmt;

/// Exception types raised by the simulated machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// A program executed a system call
    Syscall = 1,
    /// No valid translation found: page not resident, or TLB miss
    PageFault = 2,
    /// Write attempted to a page marked read-only
    ReadOnly = 3,
    /// Translation resulted in an invalid physical address
    BusError = 4,
    /// Unaligned reference or one past the end of the address space
    AddressError = 5,
    /// Integer overflow in add or sub
    Overflow = 6,
    /// Unimplemented or reserved instruction
    IllegalInstruction = 7,
}

impl ExceptionKind {
    /// Convert a raw trap code; 0 means "no exception"
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ExceptionKind::Syscall),
            2 => Some(ExceptionKind::PageFault),
            3 => Some(ExceptionKind::ReadOnly),
            4 => Some(ExceptionKind::BusError),
            5 => Some(ExceptionKind::AddressError),
            6 => Some(ExceptionKind::Overflow),
            7 => Some(ExceptionKind::IllegalInstruction),
            _ => None,
        }
    }

    /// Raw trap code
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Name used in diagnostics
    pub fn as_str(self) -> &'static str {
        match self {
            ExceptionKind::Syscall => "SYSCALL_EXCEPTION",
            ExceptionKind::PageFault => "PAGE_FAULT_EXCEPTION",
            ExceptionKind::ReadOnly => "READ_ONLY_EXCEPTION",
            ExceptionKind::BusError => "BUS_ERROR_EXCEPTION",
            ExceptionKind::AddressError => "ADDRESS_ERROR_EXCEPTION",
            ExceptionKind::Overflow => "OVERFLOW_EXCEPTION",
            ExceptionKind::IllegalInstruction => "ILLEGAL_INSTR_EXCEPTION",
        }
    }

    /// Whether the kind signals a broken kernel invariant rather than a
    /// misbehaving process
    pub fn is_fatal_to_system(self) -> bool {
        self == ExceptionKind::BusError
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in 1..=7 {
            let kind = ExceptionKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert_eq!(ExceptionKind::from_code(0), None);
        assert_eq!(ExceptionKind::from_code(8), None);
    }

    #[test]
    fn test_only_bus_error_is_fatal_to_system() {
        assert!(ExceptionKind::BusError.is_fatal_to_system());
        assert!(!ExceptionKind::PageFault.is_fatal_to_system());
        assert!(!ExceptionKind::AddressError.is_fatal_to_system());
    }
}
