//! Virtual memory manager
//!
//! Owns the MMU, the frame pool with its core map and every live address
//! space, keyed by owning thread. All fault handling, eviction and context
//! switching goes through here so that the TLB, the page tables and the
//! core map are only ever changed together.

mod transfer;

use crate::config::VmConfig;
use crate::emulator::exception::ExceptionKind;
use crate::emulator::mmu::{Mmu, PageTable};
use crate::emulator::policy::ReplacementPolicy;
use crate::emulator::registers::{Registers, BAD_VADDR_REG};
use crate::emulator::translation::TranslationEntry;
use crate::kernel::fs::{FileSystem, OpenFile};
use crate::kernel::mm::frame::FramePool;
use crate::kernel::mm::source::{self, PageSource};
use crate::kernel::mm::space::{AddressSpace, PageOrigin};
use crate::kernel::ThreadId;
use crate::{Error, Result};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Paging counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmStats {
    /// Page-fault exceptions handled
    pub page_faults: u64,
    /// Faults on pages that were resident but not cached in the TLB
    pub tlb_misses: u64,
    /// Pages brought into memory by a fault
    pub pages_loaded: u64,
    /// Frames taken away from their owner
    pub evictions: u64,
    /// Pages written to swap
    pub swap_outs: u64,
    /// Pages read back from swap
    pub swap_ins: u64,
}

/// Virtual memory manager
#[derive(Debug)]
pub struct VmManager {
    config: VmConfig,
    mmu: Mmu,
    pool: FramePool,
    spaces: BTreeMap<ThreadId, AddressSpace>,
    /// Thread whose address space is installed
    current: Option<ThreadId>,
    registers: Registers,
    fs: Box<dyn FileSystem>,
    source: Box<dyn PageSource>,
    stats: VmStats,
}

impl VmManager {
    /// Create a manager for `config`, with swap files created in `fs`
    pub fn new(config: VmConfig, fs: Box<dyn FileSystem>) -> Result<Self> {
        config.validate()?;
        let mmu = Mmu::new(config.machine, config.uses_tlb(), config.random_seed);
        Ok(Self::with_mmu(config, fs, mmu))
    }

    /// Create a manager with a custom victim-frame policy
    pub fn with_frame_policy(
        config: VmConfig,
        fs: Box<dyn FileSystem>,
        policy: Box<dyn ReplacementPolicy>,
    ) -> Result<Self> {
        config.validate()?;
        let mmu = Mmu::with_frame_policy(config.machine, config.uses_tlb(), policy);
        Ok(Self::with_mmu(config, fs, mmu))
    }

    fn with_mmu(config: VmConfig, fs: Box<dyn FileSystem>, mmu: Mmu) -> Self {
        let source = source::for_mode(config.loading);
        log::info!(
            "VM manager initialized: {:?} translation, {} loading, paging {}, {} frames of {} bytes",
            config.translation,
            source.name(),
            config.paging,
            config.machine.num_phys_pages,
            config.machine.page_size
        );

        Self {
            config,
            pool: FramePool::new(config.machine.num_phys_pages as usize),
            mmu,
            spaces: BTreeMap::new(),
            current: None,
            registers: Registers::new(),
            fs,
            source,
            stats: VmStats::default(),
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    pub fn stats(&self) -> VmStats {
        self.stats
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn file_system_mut(&mut self) -> &mut dyn FileSystem {
        self.fs.as_mut()
    }

    /// Thread whose address space is installed
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    /// Address space owned by `tid`
    pub fn space(&self, tid: ThreadId) -> Option<&AddressSpace> {
        self.spaces.get(&tid)
    }

    /// Build the address space of `tid` from `executable`.
    ///
    /// With paging a swap file named after the thread is created; with
    /// static loading every page is backed before this returns. On failure
    /// nothing is left behind.
    pub fn create_space(&mut self, tid: ThreadId, executable: Arc<dyn OpenFile>) -> Result<()> {
        if self.spaces.contains_key(&tid) {
            return Err(Error::AlreadyExists);
        }

        let mut space = AddressSpace::new(executable, tid, &self.config.machine)?;

        if self.config.paging {
            let name = format!("SWAP.{}", tid.0);
            let file = self.fs.create(&name, space.size() as usize)?;
            space.attach_swap(name, file);
        }

        if let Err(err) = self.source.populate(&mut space, &mut self.mmu, &mut self.pool) {
            log::warn!("{}: could not build address space: {}", tid, err);
            if let Err(release_err) = space.release_frames(&mut self.mmu, &mut self.pool) {
                log::warn!("{}: could not release frames: {}", tid, release_err);
            }
            if let Some(name) = space.swap_name() {
                if let Err(remove_err) = self.fs.remove(name) {
                    log::warn!("{}: could not remove {}: {}", tid, name, remove_err);
                }
            }
            return Err(err);
        }

        self.spaces.insert(tid, space);
        Ok(())
    }

    /// Tear down the address space of `tid`: its frames go back to the pool
    /// zeroed and its swap file is removed.
    pub fn destroy_space(&mut self, tid: ThreadId) -> Result<()> {
        let mut space = self.spaces.remove(&tid).ok_or(Error::NotFound)?;

        // Cached translations die with the space; nothing to write back.
        if let Some(tlb) = self.mmu.tlb_mut() {
            for (_, frame) in space.resident_frames() {
                let slots: Vec<usize> = tlb.slots_caching_frame(frame).collect();
                for slot in slots {
                    tlb.take(slot);
                }
            }
        }

        space.release_frames(&mut self.mmu, &mut self.pool)?;
        if let Some(name) = space.swap_name() {
            self.fs.remove(name)?;
        }
        if self.current == Some(tid) {
            self.current = None;
        }

        log::debug!("{}: address space destroyed", tid);
        Ok(())
    }

    /// Context switch: save the outgoing state and install `tid`
    pub fn switch_to(&mut self, tid: ThreadId) -> Result<()> {
        if !self.spaces.contains_key(&tid) {
            return Err(Error::NotFound);
        }
        if self.current.is_some() {
            self.save_state()?;
        }
        self.restore_state(tid)
    }

    /// Flush every TLB slot back to its page table
    pub fn save_state(&mut self) -> Result<()> {
        let slots = self.mmu.tlb().map_or(0, |tlb| tlb.len());
        for slot in 0..slots {
            self.tlb_save_entry(slot)?;
        }
        Ok(())
    }

    /// Install the address space of `tid`.
    ///
    /// The TLB starts empty; a linear table is lent to the MMU on every
    /// access, so installing it only means recording the current thread.
    pub fn restore_state(&mut self, tid: ThreadId) -> Result<()> {
        let space = self.spaces.get(&tid).ok_or(Error::NotFound)?;
        if let Some(tlb) = self.mmu.tlb_mut() {
            tlb.invalidate_all();
        }
        log::debug!("{}: restored, {} pages", tid, space.num_pages());
        self.current = Some(tid);
        Ok(())
    }

    /// Set up the registers for running the current address space
    pub fn init_registers(&mut self) -> Result<()> {
        let tid = self.current.ok_or(Error::InvalidState)?;
        let space = self.spaces.get(&tid).ok_or(Error::InvalidState)?;
        space.init_registers(&mut self.registers)
    }

    /// Translate a virtual address of the current address space
    pub fn translate(
        &mut self,
        virt_addr: u32,
        size: usize,
        writing: bool,
    ) -> core::result::Result<u32, ExceptionKind> {
        let table = current_table(&mut self.spaces, self.current);
        self.mmu.translate(table, virt_addr, size, writing)
    }

    /// Read virtual memory of the current address space
    pub fn read_mem(&mut self, addr: u32, size: usize) -> core::result::Result<u32, ExceptionKind> {
        let table = current_table(&mut self.spaces, self.current);
        self.mmu.read_mem(table, addr, size)
    }

    /// Write virtual memory of the current address space
    pub fn write_mem(
        &mut self,
        addr: u32,
        size: usize,
        value: u32,
    ) -> core::result::Result<(), ExceptionKind> {
        let table = current_table(&mut self.spaces, self.current);
        self.mmu.write_mem(table, addr, size, value)
    }

    /// Resolve a page fault of the current thread at `bad_vaddr`.
    ///
    /// A page that is not resident is loaded, evicting another if paging
    /// allows it; with a TLB the page's entry is then cached.
    pub fn handle_page_fault(&mut self, bad_vaddr: u32) -> Result<()> {
        self.registers.write(BAD_VADDR_REG, bad_vaddr);
        self.stats.page_faults += 1;

        let tid = self.current.ok_or(Error::InvalidState)?;
        let vpn = self.config.machine.page_number(bad_vaddr);
        let space = self.spaces.get(&tid).ok_or(Error::InvalidState)?;

        log::debug!(
            "page fault in {}, virtual address {:#x}, vpn {}",
            tid,
            bad_vaddr,
            vpn
        );

        if vpn >= space.num_pages() {
            log::warn!("{}: vpn {} outside address space", tid, vpn);
            return Err(ExceptionKind::AddressError.into());
        }

        if space.is_resident(vpn) {
            self.stats.tlb_misses += 1;
        } else if self.source.loads_on_fault() {
            self.load_page(tid, vpn)?;
        } else {
            log::error!("{}: page {} missing without demand loading", tid, vpn);
            return Err(Error::InvalidState);
        }

        if self.config.uses_tlb() {
            let entry = self
                .spaces
                .get(&tid)
                .and_then(|space| space.entry(vpn))
                .copied()
                .ok_or(Error::InvalidState)?;
            self.tlb_load(entry)?;
        }
        Ok(())
    }

    /// Bring page `vpn` of `tid` into memory, returning its frame
    pub fn load_page(&mut self, tid: ThreadId, vpn: u32) -> Result<u32> {
        let space = self.spaces.get(&tid).ok_or(Error::NotFound)?;
        if vpn >= space.num_pages() || space.is_resident(vpn) {
            log::error!("{}: page {} cannot be loaded", tid, vpn);
            return Err(Error::InvalidState);
        }
        let frame = self.obtain_frame(tid, vpn)?;
        let space = self.spaces.get_mut(&tid).ok_or(Error::InvalidState)?;

        match space.load_page(vpn, frame, &mut self.mmu) {
            Ok(origin) => {
                self.stats.pages_loaded += 1;
                if origin == PageOrigin::Swap {
                    self.stats.swap_ins += 1;
                }
                Ok(frame)
            }
            Err(err) => {
                if let Err(release_err) = self.pool.release(frame) {
                    log::warn!("{}: could not release frame {}: {}", tid, frame, release_err);
                }
                Err(err)
            }
        }
    }

    /// A free frame recorded as owned by `tid`/`vpn`, evicting if needed
    fn obtain_frame(&mut self, tid: ThreadId, vpn: u32) -> Result<u32> {
        if let Some(frame) = self.pool.allocate(tid, vpn) {
            return Ok(frame);
        }
        if !self.config.paging {
            log::error!("{}: out of physical frames loading page {}", tid, vpn);
            return Err(Error::OutOfMemory);
        }
        self.remove_page()?;
        self.pool.allocate(tid, vpn).ok_or(Error::OutOfMemory)
    }

    /// Evict the page in a victim frame and free the frame.
    ///
    /// Meant for when no frame is free: the victim must have an owner.
    pub fn remove_page(&mut self) -> Result<u32> {
        let frame = self.mmu.choose_frame();
        let owner = self.pool.owner_of(frame).ok_or_else(|| {
            log::error!("victim frame {} has no owner", frame);
            Error::InvalidState
        })?;

        let cached: Vec<usize> = self
            .mmu
            .tlb()
            .map(|tlb| tlb.slots_caching_frame(frame).collect())
            .unwrap_or_default();
        for slot in cached {
            self.tlb_save_entry(slot)?;
        }

        let space = self
            .spaces
            .get_mut(&owner.owner)
            .ok_or(Error::InvalidState)?;
        let eviction = space.evict_page(owner.virtual_page, &self.mmu)?;
        self.pool.release(frame)?;

        self.stats.evictions += 1;
        if eviction.swapped_out {
            self.stats.swap_outs += 1;
        }
        log::debug!(
            "frame {} taken from {} (vpn {})",
            frame,
            owner.owner,
            owner.virtual_page
        );
        Ok(frame)
    }

    /// Invalidate TLB slot `slot`, writing its entry back to the owning
    /// page table
    pub fn tlb_save_entry(&mut self, slot: usize) -> Result<()> {
        let Some(entry) = self.mmu.tlb_mut().and_then(|tlb| tlb.take(slot)) else {
            return Ok(());
        };
        self.write_back(&entry)
    }

    /// Cache `entry` in the TLB. With paging the entry it displaces is
    /// written back; otherwise its status bits are dropped.
    pub fn tlb_load(&mut self, entry: TranslationEntry) -> Result<()> {
        let displaced = self.mmu.tlb_load_entry(entry);
        match displaced {
            Some(old) if self.config.paging => self.write_back(&old),
            _ => Ok(()),
        }
    }

    /// Copy a cached entry's status bits to the page table of the frame's
    /// owner
    fn write_back(&mut self, entry: &TranslationEntry) -> Result<()> {
        let owner = self
            .pool
            .owner_of(entry.physical_page)
            .ok_or(Error::InvalidState)?;
        if owner.virtual_page != entry.virtual_page {
            log::error!(
                "frame {} cached for vpn {}, owned by vpn {}",
                entry.physical_page,
                entry.virtual_page,
                owner.virtual_page
            );
            return Err(Error::InvalidState);
        }
        self.spaces
            .get_mut(&owner.owner)
            .ok_or(Error::InvalidState)?
            .write_back(entry)
    }
}

/// Page table of the installed address space, lent to the MMU
fn current_table(
    spaces: &mut BTreeMap<ThreadId, AddressSpace>,
    current: Option<ThreadId>,
) -> Option<&mut dyn PageTable> {
    let space = spaces.get_mut(&current?)?;
    Some(space as &mut dyn PageTable)
}
