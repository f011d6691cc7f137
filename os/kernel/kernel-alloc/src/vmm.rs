//! # Virtual Memory Manager
//!
//! [`Vmm`] owns the frame allocator and knows the kernel page map; everything
//! else is passed in by [`PageMap`]. Operations are grouped by concern:
//!
//! - here: [`map`](Vmm::map), [`unmap`](Vmm::unmap), [`translate`](Vmm::translate)
//! - [`region`]: free-range search, [`alloc`](Vmm::alloc) / [`free`](Vmm::free), `mmap` / `munmap`
//! - [`page_map`]: [`create`](Vmm::create) / [`destroy`](Vmm::destroy)
//! - [`share`]: cross-space [`share`](Vmm::share) and [`write_bytes`](Vmm::write_bytes)
//!
//! There is no locking: the manager is a single-writer object and callers
//! hold it by `&mut`.
//!
//! # Example
//! ```ignore
//! use kernel_alloc::{phys_mapper::HhdmPhysMapper, vmm::Vmm};
//! use kernel_info::boot::BootContract;
//! use kernel_vmem::X86Mmu;
//!
//! let mapper = HhdmPhysMapper;
//! let mmu = unsafe { X86Mmu::new() };
//! let mut vmm = unsafe { Vmm::from_boot(BootContract::DEFAULT, &mapper, &mmu) }?;
//! let user = vmm.create()?;
//! let stack = vmm.alloc(user, None, 4)?;
//! ```

pub mod page_map;
pub mod region;
pub mod share;

use crate::frame_alloc::FrameAllocError;
pub use crate::vmm::region::Privilege;
use kernel_info::memory::VirtualLayout;
use kernel_memory_addresses::{PageSize, PhysicalAddress, VirtualAddress};
use kernel_vmem::{AddressSpace, FrameAlloc, MapError, Mmu, PageMap, PageTableEntry, PhysMapper};
use thiserror::Error;

/// Kernel virtual memory manager.
pub struct Vmm<'m, M: PhysMapper, U: Mmu, A: FrameAlloc> {
    mapper: &'m M,
    mmu: &'m U,
    frames: A,
    kernel: PageMap,
    layout: VirtualLayout,
}

impl<'m, M: PhysMapper, U: Mmu, A: FrameAlloc> Vmm<'m, M, U, A> {
    /// Take over `frames` and the already-built kernel page map `kernel`.
    pub const fn new(
        mapper: &'m M,
        mmu: &'m U,
        frames: A,
        kernel: PageMap,
        layout: VirtualLayout,
    ) -> Self {
        Self {
            mapper,
            mmu,
            frames,
            kernel,
            layout,
        }
    }

    /// The page map the CPU is translating through right now.
    #[must_use]
    pub fn current(&self) -> PageMap {
        PageMap::from_root(self.mmu.active_root())
    }

    #[must_use]
    pub const fn kernel_page_map(&self) -> PageMap {
        self.kernel
    }

    #[must_use]
    pub const fn layout(&self) -> &VirtualLayout {
        &self.layout
    }

    #[must_use]
    pub const fn frames(&self) -> &A {
        &self.frames
    }

    /// A walker over `page_map`.
    #[must_use]
    pub const fn space(&self, page_map: PageMap) -> AddressSpace<'m, M> {
        AddressSpace::new(self.mapper, page_map)
    }

    /// Map `count` pages `va.. → pa..` into `page_map`, present, writable and
    /// kernel-only.
    ///
    /// # Errors
    /// Misaligned addresses, [`VmmError::DoubleMap`], [`VmmError::OutOfFrames`].
    pub fn map(
        &mut self,
        page_map: PageMap,
        pa: PhysicalAddress,
        va: VirtualAddress,
        count: u64,
    ) -> Result<(), VmmError> {
        self.space(page_map)
            .map(&mut self.frames, self.mmu, pa, va, count, PageTableEntry::KERNEL_RW)?;
        Ok(())
    }

    /// Map one huge page of size `S`, e.g. while building the direct map.
    ///
    /// # Errors
    /// Misaligned addresses, [`VmmError::DoubleMap`], [`VmmError::OutOfFrames`].
    pub fn map_huge<S: PageSize>(
        &mut self,
        page_map: PageMap,
        pa: PhysicalAddress,
        va: VirtualAddress,
    ) -> Result<(), VmmError> {
        self.space(page_map).map_huge::<S, _, _>(
            &mut self.frames,
            self.mmu,
            pa,
            va,
            PageTableEntry::KERNEL_RW.with_global(true),
        )?;
        Ok(())
    }

    /// Remove up to `pages` leaves from `page_map` starting at `va`, pruning
    /// empty tables. Stops at the first unmapped address; returns the number of
    /// leaves removed. Leaf frames are not released.
    ///
    /// # Errors
    /// Misaligned or empty ranges.
    pub fn unmap(
        &mut self,
        page_map: PageMap,
        va: VirtualAddress,
        pages: u64,
    ) -> Result<u64, VmmError> {
        Ok(self
            .space(page_map)
            .unmap(&mut self.frames, self.mmu, va, pages)?)
    }

    /// Resolve `va` in `page_map`, or `None` if unmapped.
    #[must_use]
    pub fn translate(&self, page_map: PageMap, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.space(page_map).translate(va)
    }
}

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum VmmError {
    #[error("out of physical memory")]
    OutOfFrames,
    #[error("no free virtual range of {0} pages")]
    OutOfVirtualSpace(u64),
    #[error("{0} is already mapped")]
    DoubleMap(VirtualAddress),
    #[error("{0} is already free")]
    AlreadyFree(VirtualAddress),
    #[error("{0} is covered by a huge page")]
    HugeLeaf(VirtualAddress),
    #[error("virtual address {0} is not page-aligned")]
    MisalignedVirtual(VirtualAddress),
    #[error("physical address {0} is not page-aligned")]
    MisalignedPhysical(PhysicalAddress),
    #[error("empty range")]
    EmptyRange,
    #[error("range at {0} wraps the address space")]
    InvalidRange(VirtualAddress),
    #[error("range at {0} leaves the canonical half it starts in")]
    NonCanonical(VirtualAddress),
    #[error("range at {0} lies outside the caller's namespace")]
    OutsideNamespace(VirtualAddress),
    #[error("physical range at {0} wraps the address space")]
    InvalidPhysicalRange(PhysicalAddress),
    #[error("source page {0} is not mapped")]
    SourceUnmapped(VirtualAddress),
    #[error("{0} is not mapped")]
    Unmapped(VirtualAddress),
    #[error("the kernel page map cannot be destroyed")]
    KernelPageMap,
    #[error("the active page map cannot be destroyed")]
    ActivePageMap,
    #[error("frame bitmap: {0}")]
    FrameBitmap(FrameAllocError),
}

impl From<MapError> for VmmError {
    fn from(value: MapError) -> Self {
        match value {
            MapError::OutOfFrames => Self::OutOfFrames,
            MapError::MisalignedVirtual(va) => Self::MisalignedVirtual(va),
            MapError::MisalignedPhysical(pa) => Self::MisalignedPhysical(pa),
            MapError::DoubleMap(va) => Self::DoubleMap(va),
            MapError::HugeLeaf(va) => Self::HugeLeaf(va),
            MapError::EmptyRange => Self::EmptyRange,
            MapError::Overflow(va) => Self::InvalidRange(va),
            MapError::NonCanonical(va) => Self::NonCanonical(va),
            MapError::PhysicalOverflow(pa) => Self::InvalidPhysicalRange(pa),
        }
    }
}

impl From<FrameAllocError> for VmmError {
    fn from(value: FrameAllocError) -> Self {
        match value {
            FrameAllocError::OutOfFrames(_) => Self::OutOfFrames,
            other => Self::FrameBitmap(other),
        }
    }
}

/// Byte length of a `pages`-page run at `va`, checking alignment, emptiness,
/// wrap-around and that the run stays inside one canonical half.
pub(crate) fn run_length(va: VirtualAddress, pages: u64) -> Result<u64, VmmError> {
    use kernel_memory_addresses::Size4K;

    if !va.is_aligned::<Size4K>() {
        return Err(VmmError::MisalignedVirtual(va));
    }
    if pages == 0 {
        return Err(VmmError::EmptyRange);
    }
    let len = pages
        .checked_mul(Size4K::SIZE)
        .filter(|&len| va.checked_add(len).is_some())
        .ok_or(VmmError::InvalidRange(va))?;
    let last = va + (len - 1);
    if !va.is_canonical() || !last.is_canonical() || va.as_u64() >> 47 != last.as_u64() >> 47 {
        return Err(VmmError::NonCanonical(va));
    }
    Ok(len)
}
