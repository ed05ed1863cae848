//! How pages of a new address space get their first backing

use crate::config::LoadingMode;
use crate::emulator::mmu::Mmu;
use crate::kernel::mm::frame::FramePool;
use crate::kernel::mm::space::AddressSpace;
use crate::Result;
use alloc::boxed::Box;
use core::fmt;

/// Strategy for populating a freshly built address space
pub trait PageSource: fmt::Debug {
    /// Prepare `space` for running
    fn populate(
        &self,
        space: &mut AddressSpace,
        mmu: &mut Mmu,
        pool: &mut FramePool,
    ) -> Result<()>;

    /// Whether non-resident pages are loaded by the page-fault handler
    fn loads_on_fault(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Every page gets a frame at construction and the image is copied in
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPages;

impl PageSource for StaticPages {
    fn populate(
        &self,
        space: &mut AddressSpace,
        mmu: &mut Mmu,
        pool: &mut FramePool,
    ) -> Result<()> {
        space.allocate_all(mmu, pool)
    }

    fn loads_on_fault(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Nothing is loaded up front; first touch of a page faults it in
#[derive(Debug, Clone, Copy, Default)]
pub struct DemandPages;

impl PageSource for DemandPages {
    fn populate(
        &self,
        space: &mut AddressSpace,
        _mmu: &mut Mmu,
        _pool: &mut FramePool,
    ) -> Result<()> {
        log::debug!(
            "{}: {} pages left to demand loading",
            space.owner(),
            space.num_pages()
        );
        Ok(())
    }

    fn loads_on_fault(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "demand"
    }
}

/// Page source for a loading mode
pub fn for_mode(mode: LoadingMode) -> Box<dyn PageSource> {
    match mode {
        LoadingMode::Static => Box::new(StaticPages),
        LoadingMode::Demand => Box::new(DemandPages),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use crate::kernel::fs::MemFile;
    use crate::kernel::mm::noff::build_image;
    use crate::kernel::ThreadId;
    use alloc::sync::Arc;
    use test_case::test_case;

    #[test_case(LoadingMode::Static, false, 10 ; "static")]
    #[test_case(LoadingMode::Demand, true, 0 ; "demand")]
    fn test_populate(mode: LoadingMode, on_fault: bool, resident: usize) {
        let machine = MachineConfig {
            page_size: 128,
            num_phys_pages: 16,
            tlb_size: 4,
            user_stack_size: 1024,
        };
        let image = build_image(&[7; 200], &[], 0);
        let mut space =
            AddressSpace::new(Arc::new(MemFile::from(image)), ThreadId(3), &machine).unwrap();
        let mut mmu = Mmu::new(machine, false, 1);
        let mut pool = FramePool::new(16);

        let source = for_mode(mode);
        assert_eq!(source.loads_on_fault(), on_fault);
        source.populate(&mut space, &mut mmu, &mut pool).unwrap();
        assert_eq!(space.resident_frames().count(), resident);
        assert_eq!(pool.count_clear(), 16 - resident);
    }
}
