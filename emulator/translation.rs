//! Translation entries
//!
//! A single page-table or TLB record. The same layout is used by the
//! linear page table of an address space and by the TLB slots.

use bitflags::bitflags;

bitflags! {
    /// Status bits of a translation entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u8 {
        /// The entry can be used for translation
        const VALID     = 1 << 0;
        /// Writes through this entry raise `ReadOnly`
        const READ_ONLY = 1 << 1;
        /// Set by the MMU on every access
        const USE       = 1 << 2;
        /// Set by the MMU on every write
        const DIRTY     = 1 << 3;
    }
}

/// Virtual page to physical frame mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranslationEntry {
    /// Virtual page number
    pub virtual_page: u32,
    /// Physical frame number
    pub physical_page: u32,
    /// Status bits
    pub flags: EntryFlags,
}

impl TranslationEntry {
    /// A valid, writable, clean mapping
    pub fn new(virtual_page: u32, physical_page: u32) -> Self {
        Self {
            virtual_page,
            physical_page,
            flags: EntryFlags::VALID,
        }
    }

    /// An unusable slot
    pub const fn invalid() -> Self {
        Self {
            virtual_page: 0,
            physical_page: 0,
            flags: EntryFlags::empty(),
        }
    }

    pub fn valid(&self) -> bool {
        self.flags.contains(EntryFlags::VALID)
    }

    pub fn read_only(&self) -> bool {
        self.flags.contains(EntryFlags::READ_ONLY)
    }

    pub fn used(&self) -> bool {
        self.flags.contains(EntryFlags::USE)
    }

    pub fn dirty(&self) -> bool {
        self.flags.contains(EntryFlags::DIRTY)
    }

    pub fn set_valid(&mut self, value: bool) {
        self.flags.set(EntryFlags::VALID, value);
    }

    pub fn set_read_only(&mut self, value: bool) {
        self.flags.set(EntryFlags::READ_ONLY, value);
    }

    pub fn set_used(&mut self, value: bool) {
        self.flags.set(EntryFlags::USE, value);
    }

    pub fn set_dirty(&mut self, value: bool) {
        self.flags.set(EntryFlags::DIRTY, value);
    }
}
