//! Configuration management
//!
//! Translation scheme (linear page table or TLB), demand loading and paging
//! form a matrix of machine variants. The variant is a value chosen once
//! when the [`VmManager`](crate::kernel::vmm::VmManager) is created.

use crate::utils::random::DEFAULT_SEED;
use crate::{Error, Result};

/// Upper bound on the number of TLB slots
pub const MAX_TLB_SIZE: usize = 64;

/// Bytes left unused above the initial stack pointer
pub const STACK_TOP_MARGIN: u32 = 16;

/// How the MMU resolves a virtual page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationMode {
    /// Linear page table of the running address space, indexed by VPN
    PageTable,
    /// Small associative TLB refilled by the page-fault handler
    Tlb,
}

/// When a page gets its physical frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingMode {
    /// Every page is allocated and filled when the address space is built
    Static,
    /// Pages are allocated and filled on their first fault
    Demand,
}

/// Machine geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Bytes per page (and per physical frame)
    pub page_size: u32,
    /// Number of physical frames
    pub num_phys_pages: u32,
    /// Number of TLB slots
    pub tlb_size: usize,
    /// Bytes of stack appended to every address space
    pub user_stack_size: u32,
}

impl MachineConfig {
    /// Size of physical memory in bytes
    pub const fn memory_size(&self) -> usize {
        self.page_size as usize * self.num_phys_pages as usize
    }

    /// Virtual page number of an address
    pub const fn page_number(&self, addr: u32) -> u32 {
        addr / self.page_size
    }

    /// Offset of an address within its page
    pub const fn page_offset(&self, addr: u32) -> u32 {
        addr % self.page_size
    }

    /// First physical address of a frame
    pub const fn frame_base(&self, frame: u32) -> usize {
        frame as usize * self.page_size as usize
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            page_size: 128,
            num_phys_pages: 32,
            tlb_size: 4,
            user_stack_size: 1024,
        }
    }
}

/// Virtual-memory configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Lookup structure used by the MMU
    pub translation: TranslationMode,
    /// Static or on-demand page population
    pub loading: LoadingMode,
    /// Evict pages to a per-process swap file under memory pressure
    pub paging: bool,
    /// Machine geometry
    pub machine: MachineConfig,
    /// Seed of the victim-frame generator
    pub random_seed: u32,
}

impl VmConfig {
    /// Linear page table, whole image loaded up front
    pub fn userprog() -> Self {
        Self {
            translation: TranslationMode::PageTable,
            loading: LoadingMode::Static,
            paging: false,
            ..Self::default()
        }
    }

    /// TLB, whole image loaded up front
    pub fn use_tlb() -> Self {
        Self {
            translation: TranslationMode::Tlb,
            loading: LoadingMode::Static,
            paging: false,
            ..Self::default()
        }
    }

    /// TLB with demand loading, no eviction
    pub fn demand_loading() -> Self {
        Self {
            translation: TranslationMode::Tlb,
            loading: LoadingMode::Demand,
            paging: false,
            ..Self::default()
        }
    }

    /// TLB with demand loading and eviction to swap
    pub fn paging() -> Self {
        Self::default()
    }

    /// Replace the machine geometry
    pub fn with_machine(mut self, machine: MachineConfig) -> Self {
        self.machine = machine;
        self
    }

    /// Whether the MMU uses a TLB
    pub fn uses_tlb(&self) -> bool {
        self.translation == TranslationMode::Tlb
    }

    /// Whether pages are populated on first touch
    pub fn demand_loading_enabled(&self) -> bool {
        self.loading == LoadingMode::Demand
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let machine = &self.machine;

        if machine.page_size == 0 || machine.page_size % 4 != 0 {
            return Err(Error::InvalidConfig);
        }

        if machine.num_phys_pages == 0 {
            return Err(Error::InvalidConfig);
        }

        if machine.user_stack_size < STACK_TOP_MARGIN {
            return Err(Error::InvalidConfig);
        }

        if self.uses_tlb() && (machine.tlb_size == 0 || machine.tlb_size > MAX_TLB_SIZE) {
            return Err(Error::InvalidConfig);
        }

        if self.paging && !self.demand_loading_enabled() {
            return Err(Error::InvalidConfig);
        }

        Ok(())
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            translation: TranslationMode::Tlb,
            loading: LoadingMode::Demand,
            paging: true,
            machine: MachineConfig::default(),
            random_seed: DEFAULT_SEED,
        }
    }
}
