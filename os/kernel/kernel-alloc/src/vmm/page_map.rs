//! # Address-Space Manager
//!
//! Every page map shares the kernel's PML4 slot 511 entry bit for bit, so the
//! kernel namespace and the direct map look the same from every process.
//! Everything below the other 511 slots is private to one page map.

use crate::vmm::{Vmm, VmmError};
use kernel_info::memory::KERNEL_PML4_SLOT;
use kernel_vmem::{AddressSpace, FrameAlloc, Mmu, PageMap, PhysMapper};
use log::debug;

impl<M: PhysMapper, U: Mmu, A: FrameAlloc> Vmm<'_, M, U, A> {
    /// A fresh page map: zeroed PML4 plus the kernel's shared top-level entry.
    ///
    /// # Errors
    /// [`VmmError::OutOfFrames`].
    pub fn create(&mut self) -> Result<PageMap, VmmError> {
        let space = AddressSpace::allocate(self.mapper, &mut self.frames)?;
        let shared = self.space(self.kernel).top_level_entry(KERNEL_PML4_SLOT);
        space.set_top_level_entry(KERNEL_PML4_SLOT, shared);
        debug!("created {}", space.page_map());
        Ok(space.page_map())
    }

    /// Free every frame `page_map` owns (tables, 4 KiB leaf frames, the root),
    /// never descending into the shared kernel entry.
    ///
    /// Frames shared into this page map are released too; other page maps
    /// still mapping them are not told.
    ///
    /// # Errors
    /// [`VmmError::KernelPageMap`] or [`VmmError::ActivePageMap`].
    pub fn destroy(&mut self, page_map: PageMap) -> Result<(), VmmError> {
        if page_map == self.kernel {
            return Err(VmmError::KernelPageMap);
        }
        if page_map == self.current() {
            return Err(VmmError::ActivePageMap);
        }
        self.space(page_map).release(&mut self.frames);
        Ok(())
    }
}
