//! # Region Allocator
//!
//! Finds unused virtual ranges and backs them with fresh frames.
//!
//! The kernel page map draws from [`VirtualLayout::kernel`]; every other page
//! map from [`VirtualLayout::user`]. The search is first-fit, but skips whole
//! unmapped (or fully mapped) blocks at once instead of probing page by page.
//!
//! [`VirtualLayout::kernel`]: kernel_info::memory::VirtualLayout::kernel
//! [`VirtualLayout::user`]: kernel_info::memory::VirtualLayout::user

use crate::vmm::{Vmm, VmmError, run_length};
use kernel_info::memory::{KERNEL_BASE, VirtualRange};
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress};
use kernel_vmem::{FrameAlloc, Level, Mmu, PageMap, PageTableEntry, PhysMapper, Probe};
use log::{debug, trace};

/// Who asked for memory, which decides the page map `mmap` / `munmap` act on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Privilege {
    /// Kernel code: always the kernel page map.
    Kernel,
    /// User code: the currently active page map.
    User,
}

impl Privilege {
    /// Classify a syscall by its return address.
    ///
    /// [`KERNEL_BASE`] itself is the first kernel address and counts as kernel.
    #[must_use]
    pub const fn from_return_address(ra: VirtualAddress) -> Self {
        if ra.as_u64() >= KERNEL_BASE {
            Self::Kernel
        } else {
            Self::User
        }
    }
}

impl<M: PhysMapper, U: Mmu, A: FrameAlloc> Vmm<'_, M, U, A> {
    /// The namespace searched for `page_map`.
    #[must_use]
    pub fn namespace(&self, page_map: PageMap) -> VirtualRange {
        if page_map == self.kernel {
            self.layout.kernel
        } else {
            self.layout.user
        }
    }

    /// Whether any page of `[va, va + pages * 4096)` is mapped, huge pages included.
    #[must_use]
    pub fn is_range_used(&self, page_map: PageMap, va: VirtualAddress, pages: u64) -> bool {
        let space = self.space(page_map);
        (0..pages).any(|i| space.is_mapped(va + i * Size4K::SIZE))
    }

    /// First-fit search for `pages` unmapped pages in the namespace of `page_map`.
    ///
    /// # Errors
    /// [`VmmError::EmptyRange`], or [`VmmError::OutOfVirtualSpace`] when no
    /// such run exists.
    pub fn find_free_range(&self, page_map: PageMap, pages: u64) -> Result<VirtualAddress, VmmError> {
        let range = self.namespace(page_map);
        let len = run_length(range.start, pages).map_err(|e| match e {
            VmmError::InvalidRange(_) | VmmError::NonCanonical(_) => {
                VmmError::OutOfVirtualSpace(pages)
            }
            other => other,
        })?;
        let space = self.space(page_map);

        let mut start = range.start;
        let mut cursor = start;
        loop {
            match start.checked_add(len) {
                Some(end) if end <= range.end => {
                    if cursor >= end {
                        trace!("free range {start} x{pages} in {page_map}");
                        return Ok(start);
                    }
                }
                _ => return Err(VmmError::OutOfVirtualSpace(pages)),
            }

            // Either way the whole block the walk stopped in shares one fate.
            let probe = space.probe(cursor);
            let Some(next) = block_end(probe.level(), cursor) else {
                return Err(VmmError::OutOfVirtualSpace(pages));
            };
            if probe.is_mapped() {
                start = next;
            }
            cursor = next;
        }
    }

    /// Reserve `pages` pages in `page_map` and back each with a fresh frame.
    ///
    /// With `va = None` a free range is searched; otherwise the caller's
    /// address is used as given, provided no page of the run is mapped yet.
    /// Returns the base of the range.
    ///
    /// # Errors
    /// [`VmmError::OutOfVirtualSpace`], [`VmmError::OutOfFrames`],
    /// [`VmmError::DoubleMap`] (nothing is changed), misaligned, empty or
    /// non-canonical ranges.
    pub fn alloc(
        &mut self,
        page_map: PageMap,
        va: Option<VirtualAddress>,
        pages: u64,
    ) -> Result<VirtualAddress, VmmError> {
        let base = match va {
            Some(va) => {
                run_length(va, pages)?;
                va
            }
            None => self.find_free_range(page_map, pages)?,
        };

        let space = self.space(page_map);
        if let Some(used) = (0..pages)
            .map(|i| base + i * Size4K::SIZE)
            .find(|&va| space.is_mapped(va))
        {
            return Err(VmmError::DoubleMap(used));
        }

        for i in 0..pages {
            let va = base + i * Size4K::SIZE;
            let frame = self.frames.alloc_4k().ok_or(VmmError::OutOfFrames)?;
            if let Err(e) = space.map(
                &mut self.frames,
                self.mmu,
                frame.base(),
                va,
                1,
                PageTableEntry::KERNEL_RW,
            ) {
                self.frames.free_4k(frame);
                return Err(e.into());
            }
        }
        debug!("allocated {base} x{pages} in {page_map}");
        Ok(base)
    }

    /// Unmap `pages` pages of `page_map` at `va` and release their frames.
    ///
    /// The whole range is checked first: every page must be mapped by a
    /// 4 KiB leaf. On error nothing has been changed.
    ///
    /// # Errors
    /// [`VmmError::AlreadyFree`], [`VmmError::HugeLeaf`], misaligned or empty ranges.
    pub fn free(&mut self, page_map: PageMap, va: VirtualAddress, pages: u64) -> Result<(), VmmError> {
        run_length(va, pages)?;
        let space = self.space(page_map);

        for i in 0..pages {
            let page = va + i * Size4K::SIZE;
            match space.probe(page) {
                Probe::Mapped {
                    level: Level::Pt, ..
                } => {}
                Probe::Mapped { .. } => return Err(VmmError::HugeLeaf(page)),
                Probe::Unmapped { .. } => return Err(VmmError::AlreadyFree(page)),
            }
        }

        for i in 0..pages {
            let page = va + i * Size4K::SIZE;
            if let Probe::Mapped { entry, .. } = space.probe(page) {
                space.unmap(&mut self.frames, self.mmu, page, 1)?;
                self.frames.free_4k(entry.frame_number().page());
            }
        }
        debug!("freed {va} x{pages} in {page_map}");
        Ok(())
    }

    /// The page map a `caller` allocates in.
    #[must_use]
    pub fn page_map_for(&self, caller: Privilege) -> PageMap {
        match caller {
            Privilege::Kernel => self.kernel,
            Privilege::User => self.current(),
        }
    }

    /// `mmap` syscall: [`alloc`](Self::alloc) in the caller's page map.
    ///
    /// User callers may only name addresses inside the user namespace.
    ///
    /// # Errors
    /// [`VmmError::OutsideNamespace`], or as [`alloc`](Self::alloc).
    pub fn mmap(
        &mut self,
        caller: Privilege,
        va: Option<VirtualAddress>,
        pages: u64,
    ) -> Result<VirtualAddress, VmmError> {
        if let Some(va) = va {
            self.check_caller_range(caller, va, pages)?;
        }
        let page_map = self.page_map_for(caller);
        self.alloc(page_map, va, pages)
    }

    /// `munmap` syscall: [`free`](Self::free) in the caller's page map.
    ///
    /// User callers may only name addresses inside the user namespace.
    ///
    /// # Errors
    /// [`VmmError::OutsideNamespace`], or as [`free`](Self::free).
    pub fn munmap(&mut self, caller: Privilege, va: VirtualAddress, pages: u64) -> Result<(), VmmError> {
        self.check_caller_range(caller, va, pages)?;
        let page_map = self.page_map_for(caller);
        self.free(page_map, va, pages)
    }

    /// User code never reaches the shared kernel slot, whatever page map is active.
    fn check_caller_range(&self, caller: Privilege, va: VirtualAddress, pages: u64) -> Result<(), VmmError> {
        match caller {
            Privilege::User if !self.layout.user.contains_run(va, pages) => {
                Err(VmmError::OutsideNamespace(va))
            }
            _ => Ok(()),
        }
    }
}

/// The first address past the `level`-sized block containing `va`.
fn block_end(level: Level, va: VirtualAddress) -> Option<VirtualAddress> {
    level.block_start(va).checked_add(level.entry_span())
}
