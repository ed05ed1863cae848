//! Per-process address space
//!
//! An address space owns its page table, a handle to the executable it was
//! built from and, when paging is enabled, a private swap file. Frames are
//! handed to it by the manager; it only records them, fills them and gives
//! them back.

use crate::config::{MachineConfig, STACK_TOP_MARGIN};
use crate::emulator::mmu::{Mmu, PageTable};
use crate::emulator::registers::{Registers, NEXT_PC_REG, PC_REG, STACK_REG};
use crate::emulator::translation::TranslationEntry;
use crate::kernel::fs::OpenFile;
use crate::kernel::mm::frame::FramePool;
use crate::kernel::mm::noff::{NoffHeader, Segment};
use crate::kernel::ThreadId;
use crate::utils::div_round_up;
use crate::{Error, Result};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

/// State of one virtual page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEntry {
    /// The page occupies `entry.physical_page`. `swapped` is set once its
    /// backing copy lives in the swap file.
    Resident {
        entry: TranslationEntry,
        swapped: bool,
    },
    /// Not resident; contents come from the executable
    Backed,
    /// Not resident; contents live in the swap file at `swap_offset`
    SwappedOut { swap_offset: u32 },
}

impl PageEntry {
    pub fn is_resident(&self) -> bool {
        matches!(self, PageEntry::Resident { .. })
    }

    /// Frame holding the page, if resident
    pub fn frame(&self) -> Option<u32> {
        match self {
            PageEntry::Resident { entry, .. } => Some(entry.physical_page),
            _ => None,
        }
    }
}

/// Where a loaded page got its contents from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrigin {
    Image,
    Swap,
}

/// Outcome of evicting one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    /// Frame the page occupied
    pub frame: u32,
    /// Whether the frame was written to swap
    pub swapped_out: bool,
}

#[derive(Debug)]
struct SwapFile {
    name: String,
    file: Box<dyn OpenFile>,
}

/// Address space of one user process
#[derive(Debug)]
pub struct AddressSpace {
    owner: ThreadId,
    pages: Vec<PageEntry>,
    page_size: u32,
    header: NoffHeader,
    executable: Arc<dyn OpenFile>,
    swap: Option<SwapFile>,
}

impl AddressSpace {
    /// Decode the executable header and size the address space.
    ///
    /// No frame is assigned yet: every page starts out backed by the image.
    pub fn new(
        executable: Arc<dyn OpenFile>,
        owner: ThreadId,
        machine: &MachineConfig,
    ) -> Result<Self> {
        let header = NoffHeader::read_from(executable.as_ref())?;

        let uninit = &header.uninit_data;
        if !header.code.fits()
            || !header.init_data.fits()
            || uninit.virtual_addr.checked_add(uninit.size).is_none()
        {
            log::error!("{}: segment extents overflow: {:?}", owner, header);
            return Err(Error::InvalidExecutable);
        }

        let size = header.image_size().saturating_add(machine.user_stack_size);
        let num_pages = div_round_up(size, machine.page_size);
        let limit = num_pages
            .checked_mul(machine.page_size)
            .ok_or(Error::InvalidExecutable)?;

        if header.highest_address() > limit {
            log::error!(
                "{}: segments end at {:#x}, beyond the address space ({:#x})",
                owner,
                header.highest_address(),
                limit
            );
            return Err(Error::InvalidExecutable);
        }

        log::debug!(
            "{}: initializing address space, num pages {}, size {}",
            owner,
            num_pages,
            limit
        );

        Ok(Self {
            owner,
            pages: vec![PageEntry::Backed; num_pages as usize],
            page_size: machine.page_size,
            header,
            executable,
            swap: None,
        })
    }

    /// Give the space its private swap file
    pub fn attach_swap(&mut self, name: String, file: Box<dyn OpenFile>) {
        log::debug!("{}: swap file {}", self.owner, name);
        self.swap = Some(SwapFile { name, file });
    }

    /// Name of the swap file, if any
    pub fn swap_name(&self) -> Option<&str> {
        self.swap.as_ref().map(|swap| swap.name.as_str())
    }

    /// Swap file contents, if any
    pub fn swap_file(&self) -> Option<&dyn OpenFile> {
        self.swap.as_ref().map(|swap| swap.file.as_ref())
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn header(&self) -> &NoffHeader {
        &self.header
    }

    pub fn num_pages(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Size of the address space in bytes
    pub fn size(&self) -> u32 {
        self.num_pages() * self.page_size
    }

    /// State of virtual page `vpn`
    pub fn page(&self, vpn: u32) -> Option<&PageEntry> {
        self.pages.get(vpn as usize)
    }

    pub fn is_resident(&self, vpn: u32) -> bool {
        self.page(vpn).is_some_and(PageEntry::is_resident)
    }

    /// Authoritative translation entry of a resident page
    pub fn entry(&self, vpn: u32) -> Option<&TranslationEntry> {
        match self.pages.get(vpn as usize)? {
            PageEntry::Resident { entry, .. } => Some(entry),
            _ => None,
        }
    }

    /// Virtual page number that marks a page as not resident
    pub fn not_resident_marker(&self) -> u32 {
        self.num_pages() + 1
    }

    /// Virtual page number recorded for `vpn`: itself when resident, the
    /// not-resident marker otherwise
    pub fn recorded_virtual_page(&self, vpn: u32) -> Option<u32> {
        let page = self.page(vpn)?;
        Some(match page {
            PageEntry::Resident { entry, .. } => entry.virtual_page,
            _ => self.not_resident_marker(),
        })
    }

    /// Resident pages as `(vpn, frame)`
    pub fn resident_frames(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.pages
            .iter()
            .enumerate()
            .filter_map(|(vpn, page)| page.frame().map(|frame| (vpn as u32, frame)))
    }

    /// Translate a virtual address of a resident page, without faulting
    pub fn translate(&self, virt_addr: u32) -> Option<u32> {
        let vpn = virt_addr / self.page_size;
        let offset = virt_addr % self.page_size;
        self.entry(vpn)
            .map(|entry| entry.physical_page * self.page_size + offset)
    }

    /// Back every page with a frame up front and copy the image in.
    ///
    /// Fails without touching the pool if there are not enough free frames.
    pub fn allocate_all(&mut self, mmu: &mut Mmu, pool: &mut FramePool) -> Result<()> {
        let needed = self.pages.len();
        if pool.count_clear() < needed {
            log::error!(
                "{}: needs {} frames, only {} free",
                self.owner,
                needed,
                pool.count_clear()
            );
            return Err(Error::OutOfMemory);
        }

        for vpn in 0..needed as u32 {
            let frame = pool.allocate(self.owner, vpn).ok_or(Error::OutOfMemory)?;
            mmu.zero_frame(frame);
            self.pages[vpn as usize] = PageEntry::Resident {
                entry: TranslationEntry::new(vpn, frame),
                swapped: false,
            };
        }

        let header = self.header;
        if header.code.size > 0 {
            log::debug!(
                "initializing code segment, at {:#x}, size {}",
                header.code.virtual_addr,
                header.code.size
            );
            self.copy_segment(&header.code, mmu)?;
        }
        if header.init_data.size > 0 {
            log::debug!(
                "initializing data segment, at {:#x}, size {}",
                header.init_data.virtual_addr,
                header.init_data.size
            );
            self.copy_segment(&header.init_data, mmu)?;
        }
        Ok(())
    }

    /// Copy a whole segment through the page table, one page-bounded chunk
    /// at a time; frames need not be contiguous.
    fn copy_segment(&self, segment: &Segment, mmu: &mut Mmu) -> Result<()> {
        let mut copied = 0;
        while copied < segment.size {
            let virt_addr = segment
                .virtual_addr
                .checked_add(copied)
                .ok_or(Error::InvalidExecutable)?;
            let in_page = self.page_size - virt_addr % self.page_size;
            let len = in_page.min(segment.size - copied) as usize;

            let pa = self.translate(virt_addr).ok_or(Error::InvalidState)? as usize;
            let dest = &mut mmu.main_memory_mut()[pa..pa + len];
            let position = segment
                .file_offset(virt_addr)
                .ok_or(Error::InvalidExecutable)? as usize;
            if self.executable.read_at(dest, position) != len {
                log::error!("{}: executable truncated at {:#x}", self.owner, position);
                return Err(Error::Io);
            }
            copied += len as u32;
        }
        Ok(())
    }

    /// Fill `frame` with the contents of virtual page `vpn` and make the
    /// page resident there. The frame must already be recorded as owned by
    /// this space.
    pub fn load_page(&mut self, vpn: u32, frame: u32, mmu: &mut Mmu) -> Result<PageOrigin> {
        let page = *self.pages.get(vpn as usize).ok_or(Error::InvalidState)?;
        if page.is_resident() {
            log::error!("{}: page {} is already resident", self.owner, vpn);
            return Err(Error::InvalidState);
        }
        mmu.zero_frame(frame);

        let origin = match page {
            PageEntry::Resident { .. } => return Err(Error::InvalidState),
            PageEntry::Backed => {
                self.fill_from_image(vpn, frame, mmu)?;
                PageOrigin::Image
            }
            PageEntry::SwappedOut { swap_offset } => {
                let swap = self.swap.as_ref().ok_or(Error::InvalidState)?;
                let dest = mmu.frame_mut(frame);
                if swap.file.read_at(dest, swap_offset as usize) != dest.len() {
                    return Err(Error::Io);
                }
                log::trace!("{}: page {} read from {}", self.owner, vpn, swap.name);
                PageOrigin::Swap
            }
        };

        self.pages[vpn as usize] = PageEntry::Resident {
            entry: TranslationEntry::new(vpn, frame),
            swapped: origin == PageOrigin::Swap,
        };
        log::debug!("{}: page {} loaded into frame {}", self.owner, vpn, frame);
        Ok(origin)
    }

    /// Copy the parts of the code and data segments that fall into page
    /// `vpn`; the rest of the frame stays zero.
    fn fill_from_image(&self, vpn: u32, frame: u32, mmu: &mut Mmu) -> Result<()> {
        let start = vpn * self.page_size;
        let end = start + self.page_size;

        for segment in [&self.header.code, &self.header.init_data] {
            let Some((lo, hi)) = segment.overlap(start, end) else {
                continue;
            };
            let dest = &mut mmu.frame_mut(frame)[(lo - start) as usize..(hi - start) as usize];
            let position = segment.file_offset(lo).ok_or(Error::InvalidExecutable)? as usize;
            if self.executable.read_at(dest, position) != dest.len() {
                log::error!("{}: executable truncated at {:#x}", self.owner, position);
                return Err(Error::Io);
            }
        }
        Ok(())
    }

    /// Give up the frame of resident page `vpn`.
    ///
    /// A dirty page is written to swap first. The caller releases the frame
    /// and must have flushed any cached copy of the entry beforehand.
    pub fn evict_page(&mut self, vpn: u32, mmu: &Mmu) -> Result<Eviction> {
        let page = self.pages.get_mut(vpn as usize).ok_or(Error::InvalidState)?;
        let PageEntry::Resident { entry, swapped } = *page else {
            log::error!("{}: evicting non-resident page {}", self.owner, vpn);
            return Err(Error::InvalidState);
        };
        let frame = entry.physical_page;
        let swap_offset = vpn * self.page_size;

        if entry.dirty() {
            let swap = self.swap.as_mut().ok_or(Error::InvalidState)?;
            let source = mmu.frame(frame);
            if swap.file.write_at(source, swap_offset as usize) != source.len() {
                return Err(Error::Io);
            }
            log::trace!("{}: page {} written to {}", self.owner, vpn, swap.name);
            *page = PageEntry::SwappedOut { swap_offset };
        } else if swapped {
            *page = PageEntry::SwappedOut { swap_offset };
        } else {
            *page = PageEntry::Backed;
        }

        log::debug!(
            "{}: page {} evicted from frame {} (dirty: {})",
            self.owner,
            vpn,
            frame,
            entry.dirty()
        );
        Ok(Eviction {
            frame,
            swapped_out: entry.dirty(),
        })
    }

    /// Copy the status bits of a cached entry back into the page table
    pub fn write_back(&mut self, cached: &TranslationEntry) -> Result<()> {
        match self.pages.get_mut(cached.virtual_page as usize) {
            Some(PageEntry::Resident { entry, .. })
                if entry.physical_page == cached.physical_page =>
            {
                entry.set_used(cached.used());
                entry.set_dirty(cached.dirty());
                Ok(())
            }
            _ => {
                log::error!(
                    "{}: cached vpn {} frame {} disagrees with page table",
                    self.owner,
                    cached.virtual_page,
                    cached.physical_page
                );
                Err(Error::InvalidState)
            }
        }
    }

    /// Set the initial register values for running this image.
    ///
    /// Fails if the space is too small to hold the stack margin.
    pub fn init_registers(&self, registers: &mut Registers) -> Result<()> {
        let sp = self.size().checked_sub(STACK_TOP_MARGIN).ok_or_else(|| {
            log::error!(
                "{}: address space of {} bytes has no room for a stack",
                self.owner,
                self.size()
            );
            Error::InvalidState
        })?;
        registers.clear();

        let entry_point = self.header.code.virtual_addr;
        registers.write(PC_REG, entry_point);
        registers.write(NEXT_PC_REG, entry_point.wrapping_add(4));

        registers.write(STACK_REG, sp);
        log::debug!("{}: initializing stack register to {:#x}", self.owner, sp);
        Ok(())
    }

    /// Return every resident frame to the pool, zeroed
    pub fn release_frames(&mut self, mmu: &mut Mmu, pool: &mut FramePool) -> Result<usize> {
        let mut released = 0;
        for page in self.pages.iter_mut() {
            let Some(frame) = page.frame() else {
                continue;
            };
            pool.release(frame)?;
            mmu.zero_frame(frame);
            *page = PageEntry::Backed;
            released += 1;
        }
        log::debug!("{}: released {} frames", self.owner, released);
        Ok(released)
    }
}

impl PageTable for AddressSpace {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn entry_mut(&mut self, vpn: u32) -> Option<&mut TranslationEntry> {
        match self.pages.get_mut(vpn as usize)? {
            PageEntry::Resident { entry, .. } => Some(entry),
            _ => None,
        }
    }
}
