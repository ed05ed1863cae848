//! Routines to translate virtual addresses to physical addresses.
//!
//! Software sets up a table of legal translations, and the MMU looks it up
//! on every memory reference. Two kinds of lookup are supported:
//!
//! * Linear page table: the virtual page number indexes the table of the
//!   running address space, which is lent to the MMU for each access.
//! * TLB: an associative search of a small table owned by the MMU. A miss
//!   traps to the kernel as a page fault, even when the page is resident.
//!
//! A machine uses exactly one of the two. The MMU also owns physical memory.

use crate::config::MachineConfig;
use crate::emulator::endian::{short_to_host, short_to_machine, word_to_host, word_to_machine};
use crate::emulator::exception::ExceptionKind;
use crate::emulator::policy::{RandomChoice, ReplacementPolicy};
use crate::emulator::tlb::Tlb;
use crate::emulator::translation::TranslationEntry;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

/// Linear page table as seen by the MMU
pub trait PageTable {
    /// Number of virtual pages covered by the table
    fn page_count(&self) -> usize;

    /// Entry for `vpn` if it is usable for translation; `None` means the
    /// page is not resident
    fn entry_mut(&mut self, vpn: u32) -> Option<&mut TranslationEntry>;
}

/// Memory management unit
#[derive(Debug)]
pub struct Mmu {
    /// Simulated physical memory
    main_memory: Vec<u8>,
    /// Machine geometry
    machine: MachineConfig,
    /// TLB, present only when the machine translates through one
    tlb: Option<Tlb>,
    /// Victim-frame selection
    frame_policy: Box<dyn ReplacementPolicy>,
}

impl Mmu {
    /// Create an MMU with zeroed memory. With `use_tlb` every slot starts
    /// invalid; otherwise translation goes through a lent page table.
    pub fn new(machine: MachineConfig, use_tlb: bool, seed: u32) -> Self {
        Self::with_frame_policy(machine, use_tlb, Box::new(RandomChoice::new(seed)))
    }

    /// Create an MMU with a custom victim-frame policy
    pub fn with_frame_policy(
        machine: MachineConfig,
        use_tlb: bool,
        frame_policy: Box<dyn ReplacementPolicy>,
    ) -> Self {
        Self {
            main_memory: vec![0; machine.memory_size()],
            machine,
            tlb: use_tlb.then(|| Tlb::new(machine.tlb_size)),
            frame_policy,
        }
    }

    /// Machine geometry
    pub fn machine(&self) -> &MachineConfig {
        &self.machine
    }

    /// Physical memory
    pub fn main_memory(&self) -> &[u8] {
        &self.main_memory
    }

    /// Physical memory, mutable
    pub fn main_memory_mut(&mut self) -> &mut [u8] {
        &mut self.main_memory
    }

    /// Bytes of one physical frame
    pub fn frame(&self, frame: u32) -> &[u8] {
        let base = self.machine.frame_base(frame);
        &self.main_memory[base..base + self.machine.page_size as usize]
    }

    /// Bytes of one physical frame, mutable
    pub fn frame_mut(&mut self, frame: u32) -> &mut [u8] {
        let base = self.machine.frame_base(frame);
        &mut self.main_memory[base..base + self.machine.page_size as usize]
    }

    /// Zero one physical frame
    pub fn zero_frame(&mut self, frame: u32) {
        self.frame_mut(frame).fill(0);
    }

    /// The TLB, if the machine has one
    pub fn tlb(&self) -> Option<&Tlb> {
        self.tlb.as_ref()
    }

    /// The TLB, mutable
    pub fn tlb_mut(&mut self) -> Option<&mut Tlb> {
        self.tlb.as_mut()
    }

    /// Read `size` (1, 2, or 4) bytes of virtual memory at `addr`.
    ///
    /// The value is returned in host order, zero-extended.
    pub fn read_mem(
        &mut self,
        page_table: Option<&mut dyn PageTable>,
        addr: u32,
        size: usize,
    ) -> Result<u32, ExceptionKind> {
        log::trace!("Reading VA {:#x}, size {}", addr, size);

        let pa = self.translate(page_table, addr, size, false)? as usize;
        let memory = &self.main_memory;
        let value = match size {
            1 => memory[pa] as u32,
            2 => short_to_host(u16::from_ne_bytes([memory[pa], memory[pa + 1]])) as u32,
            _ => word_to_host(u32::from_ne_bytes([
                memory[pa],
                memory[pa + 1],
                memory[pa + 2],
                memory[pa + 3],
            ])),
        };

        log::trace!("\tvalue read: {:#x}", value);
        Ok(value)
    }

    /// Write the low `size` (1, 2, or 4) bytes of `value` into virtual
    /// memory at `addr`. Nothing is written if translation fails.
    pub fn write_mem(
        &mut self,
        page_table: Option<&mut dyn PageTable>,
        addr: u32,
        size: usize,
        value: u32,
    ) -> Result<(), ExceptionKind> {
        log::trace!("Writing VA {:#x}, size {}, value {:#x}", addr, size, value);

        let pa = self.translate(page_table, addr, size, true)? as usize;
        let memory = &mut self.main_memory;
        match size {
            1 => memory[pa] = value as u8,
            2 => {
                let bytes = short_to_machine(value as u16).to_ne_bytes();
                memory[pa..pa + 2].copy_from_slice(&bytes);
            }
            _ => {
                let bytes = word_to_machine(value).to_ne_bytes();
                memory[pa..pa + 4].copy_from_slice(&bytes);
            }
        }

        Ok(())
    }

    /// Translate a virtual address into a physical address, using either
    /// the lent page table or the TLB.
    ///
    /// Checks, in order: access size and alignment, page lookup,
    /// read-only violation, frame range. On success the `use` bit (and
    /// `dirty` when writing) of the matched entry is set in place.
    pub fn translate(
        &mut self,
        page_table: Option<&mut dyn PageTable>,
        virt_addr: u32,
        size: usize,
        writing: bool,
    ) -> Result<u32, ExceptionKind> {
        if !matches!(size, 1 | 2 | 4) || !is_aligned!(virt_addr as usize, size) {
            log::debug!("alignment problem at {:#x}, size {}", virt_addr, size);
            return Err(ExceptionKind::AddressError);
        }

        let vpn = self.machine.page_number(virt_addr);
        let offset = self.machine.page_offset(virt_addr);
        let num_phys_pages = self.machine.num_phys_pages;
        let page_size = self.machine.page_size;

        let entry = match self.tlb.as_mut() {
            Some(tlb) => tlb.lookup_mut(vpn).ok_or_else(|| {
                // Really a TLB miss: the page may be resident but not cached.
                log::trace!("no valid TLB entry for virtual page {}", vpn);
                ExceptionKind::PageFault
            })?,
            None => {
                let table = page_table.ok_or(ExceptionKind::AddressError)?;
                if vpn as usize >= table.page_count() {
                    log::debug!(
                        "virtual page {} too large for page table size {}",
                        vpn,
                        table.page_count()
                    );
                    return Err(ExceptionKind::AddressError);
                }
                table.entry_mut(vpn).ok_or(ExceptionKind::PageFault)?
            }
        };

        if entry.read_only() && writing {
            log::debug!("{:#x} mapped read-only", virt_addr);
            return Err(ExceptionKind::ReadOnly);
        }

        let frame = entry.physical_page;

        // An invalid translation was loaded into the table or the TLB.
        if frame >= num_phys_pages {
            log::error!("frame {} >= {}", frame, num_phys_pages);
            return Err(ExceptionKind::BusError);
        }

        entry.set_used(true);
        if writing {
            entry.set_dirty(true);
        }

        let pa = frame * page_size + offset;
        log::trace!("translated {:#x} to physical {:#x}", virt_addr, pa);
        Ok(pa)
    }

    /// Install `entry` into the TLB, replacing slots in FIFO order.
    ///
    /// The valid entry that was displaced is returned so the kernel can
    /// write its `use`/`dirty` bits back to the owning page table.
    pub fn tlb_load_entry(&mut self, entry: TranslationEntry) -> Option<TranslationEntry> {
        let tlb = self.tlb.as_mut()?;
        let (index, displaced) = tlb.load(entry);
        log::trace!(
            "TLB slot {} <- vpn {} frame {}",
            index,
            entry.virtual_page,
            entry.physical_page
        );
        displaced
    }

    /// Pick a victim physical frame for eviction
    pub fn choose_frame(&mut self) -> u32 {
        self.frame_policy.victim(self.machine.num_phys_pages as usize) as u32
    }

    /// Log the valid TLB slots
    pub fn dump_tlb(&self) {
        let Some(tlb) = self.tlb.as_ref() else {
            return;
        };
        log::debug!("TLB content:");
        for (i, entry) in tlb.iter().enumerate().filter(|(_, e)| e.valid()) {
            log::debug!(
                "[{}] VPN: {}, Frame: {}, RO: {}, Use: {}, Dirty: {}",
                i,
                entry.virtual_page,
                entry.physical_page,
                entry.read_only(),
                entry.used(),
                entry.dirty()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::policy::RoundRobin;
    use test_case::test_case;

    /// Identity-mapped table where `resident` pages are present
    struct TestTable {
        entries: Vec<TranslationEntry>,
        resident: Vec<bool>,
    }

    impl TestTable {
        fn identity(pages: u32) -> Self {
            Self {
                entries: (0..pages).map(|p| TranslationEntry::new(p, p)).collect(),
                resident: vec![true; pages as usize],
            }
        }
    }

    impl PageTable for TestTable {
        fn page_count(&self) -> usize {
            self.entries.len()
        }

        fn entry_mut(&mut self, vpn: u32) -> Option<&mut TranslationEntry> {
            if self.resident[vpn as usize] {
                self.entries.get_mut(vpn as usize)
            } else {
                None
            }
        }
    }

    fn machine() -> MachineConfig {
        MachineConfig {
            page_size: 128,
            num_phys_pages: 8,
            tlb_size: 4,
            user_stack_size: 1024,
        }
    }

    #[test_case(1, 0x0)]
    #[test_case(1, 0x1)]
    #[test_case(2, 0x2)]
    #[test_case(2, 0x7e)]
    #[test_case(4, 0x4)]
    #[test_case(4, 0x17c)]
    fn test_resident_translation_sets_use(size: usize, addr: u32) {
        let mut mmu = Mmu::new(machine(), false, 1);
        let mut table = TestTable::identity(4);

        let pa = mmu.translate(Some(&mut table), addr, size, false).unwrap();
        assert_eq!(pa, addr);
        assert!((pa as usize) < mmu.machine().memory_size());

        let vpn = (addr / 128) as usize;
        assert!(table.entries[vpn].used());
        assert!(!table.entries[vpn].dirty());
    }

    #[test]
    fn test_write_sets_dirty() {
        let mut mmu = Mmu::new(machine(), false, 1);
        let mut table = TestTable::identity(4);
        mmu.translate(Some(&mut table), 130, 1, true).unwrap();
        assert!(table.entries[1].used());
        assert!(table.entries[1].dirty());
    }

    #[test_case(2, 0x1)]
    #[test_case(4, 0x2)]
    #[test_case(4, 0x3)]
    #[test_case(3, 0x0)]
    fn test_misaligned_access_is_address_error(size: usize, addr: u32) {
        let mut mmu = Mmu::new(machine(), false, 1);
        let mut table = TestTable::identity(4);

        let result = mmu.write_mem(Some(&mut table), addr, size, 0xFFFF_FFFF);
        assert_eq!(result, Err(ExceptionKind::AddressError));
        assert!(mmu.main_memory().iter().all(|b| *b == 0));
        assert!(table.entries.iter().all(|e| !e.used()));
    }

    #[test]
    fn test_page_table_errors() {
        let mut mmu = Mmu::new(machine(), false, 1);
        let mut table = TestTable::identity(4);
        table.resident[2] = false;

        assert_eq!(
            mmu.translate(Some(&mut table), 4 * 128, 1, false),
            Err(ExceptionKind::AddressError)
        );
        assert_eq!(
            mmu.translate(Some(&mut table), 2 * 128, 1, false),
            Err(ExceptionKind::PageFault)
        );

        table.entries[1].set_read_only(true);
        assert_eq!(
            mmu.translate(Some(&mut table), 128, 1, true),
            Err(ExceptionKind::ReadOnly)
        );
        assert!(mmu.translate(Some(&mut table), 128, 1, false).is_ok());

        table.entries[3].physical_page = 8;
        assert_eq!(
            mmu.translate(Some(&mut table), 3 * 128, 1, false),
            Err(ExceptionKind::BusError)
        );
    }

    #[test]
    fn test_no_table_installed_is_address_error() {
        let mut mmu = Mmu::new(machine(), false, 1);
        assert_eq!(mmu.translate(None, 0, 4, false), Err(ExceptionKind::AddressError));
    }

    #[test_case(1, 0xAB)]
    #[test_case(1, 0x00)]
    #[test_case(1, 0xFF)]
    #[test_case(2, 0xBEEF)]
    #[test_case(2, 0xFFFF)]
    #[test_case(4, 0xDEAD_BEEF)]
    #[test_case(4, 0x0000_0001)]
    #[test_case(4, 0xFFFF_FFFF)]
    fn test_write_then_read(size: usize, value: u32) {
        let mut mmu = Mmu::new(machine(), false, 1);
        let mut table = TestTable::identity(4);
        mmu.write_mem(Some(&mut table), 0x104, size, value).unwrap();
        assert_eq!(mmu.read_mem(Some(&mut table), 0x104, size), Ok(value));
    }

    #[test]
    fn test_memory_is_little_endian() {
        let mut mmu = Mmu::new(machine(), false, 1);
        let mut table = TestTable::identity(4);
        mmu.write_mem(Some(&mut table), 8, 4, 0x1122_3344).unwrap();
        assert_eq!(&mmu.main_memory()[8..12], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(mmu.read_mem(Some(&mut table), 8, 2), Ok(0x3344));
    }

    #[test]
    fn test_tlb_miss_then_hit() {
        let mut mmu = Mmu::new(machine(), true, 1);
        assert_eq!(mmu.translate(None, 260, 4, false), Err(ExceptionKind::PageFault));

        assert_eq!(mmu.tlb_load_entry(TranslationEntry::new(2, 5)), None);
        assert_eq!(mmu.translate(None, 260, 4, true), Ok(5 * 128 + 4));

        let cached = mmu.tlb().unwrap().slot(0).unwrap();
        assert!(cached.used());
        assert!(cached.dirty());
    }

    #[test]
    fn test_tlb_ignores_page_table() {
        let mut mmu = Mmu::new(machine(), true, 1);
        let mut table = TestTable::identity(4);
        assert_eq!(
            mmu.translate(Some(&mut table), 0, 4, false),
            Err(ExceptionKind::PageFault)
        );
    }

    #[test]
    fn test_tlb_load_returns_displaced_in_fifo_order() {
        let mut mmu = Mmu::new(machine(), true, 1);
        for vpn in 0..4 {
            assert_eq!(mmu.tlb_load_entry(TranslationEntry::new(vpn, vpn)), None);
        }
        let displaced = mmu.tlb_load_entry(TranslationEntry::new(4, 4));
        assert_eq!(displaced.map(|e| e.virtual_page), Some(0));
        let displaced = mmu.tlb_load_entry(TranslationEntry::new(5, 5));
        assert_eq!(displaced.map(|e| e.virtual_page), Some(1));
    }

    #[test]
    fn test_choose_frame_uses_policy() {
        let mut mmu =
            Mmu::with_frame_policy(machine(), true, Box::new(RoundRobin::new()));
        let frames: Vec<u32> = (0..9).map(|_| mmu.choose_frame()).collect();
        assert_eq!(frames, vec![0, 1, 2, 3, 4, 5, 6, 7, 0]);

        let mut mmu = Mmu::new(machine(), true, 99);
        for _ in 0..100 {
            assert!(mmu.choose_frame() < 8);
        }
    }

    #[test]
    fn test_zero_frame() {
        let mut mmu = Mmu::new(machine(), false, 1);
        mmu.main_memory_mut().fill(0xAA);
        mmu.zero_frame(1);
        assert!(mmu.frame(1).iter().all(|b| *b == 0));
        assert!(mmu.frame(0).iter().all(|b| *b == 0xAA));
        assert!(mmu.frame(2).iter().all(|b| *b == 0xAA));
    }
}
