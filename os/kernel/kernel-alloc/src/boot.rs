//! # Boot Hand-off
//!
//! Bring the memory manager up on the state the boot loader left behind:
//! the [`BootInfo`] record, the frame bitmap (with the boot region already
//! marked used) and the active page map, which becomes the kernel page map.

use crate::frame_alloc::BitmapFrameAlloc;
use crate::vmm::{Vmm, VmmError};
use kernel_info::boot::{BootContract, BootInfo};
use kernel_info::memory::VirtualLayout;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{Mmu, PageMap, PhysMapper};
use log::info;

impl<'m, M: PhysMapper, U: Mmu> Vmm<'m, M, U, BitmapFrameAlloc<'m>> {
    /// Adopt the boot loader's frame bitmap and the active page map.
    ///
    /// Page 0 is unmapped from the kernel page map so null dereferences fault.
    ///
    /// # Safety
    /// `contract` must describe a valid [`BootInfo`] and a bitmap of
    /// [`BootInfo::bitmap_len`] bytes, both reachable through `mapper` and not
    /// aliased for `'m`.
    ///
    /// # Errors
    /// [`VmmError::FrameBitmap`] if the bitmap cannot cover the reported memory.
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn from_boot(
        contract: BootContract,
        mapper: &'m M,
        mmu: &'m U,
    ) -> Result<Self, VmmError> {
        // SAFETY: the caller vouches for the boot record.
        let boot_info: BootInfo = unsafe { *mapper.phys_to_mut::<BootInfo>(contract.boot_info) };
        let len = boot_info.bitmap_len() as usize;

        // SAFETY: the bitmap is `len` contiguous bytes, exclusively ours for `'m`.
        let bitmap = unsafe {
            let first: &'m mut u8 = mapper.phys_to_mut(contract.frame_bitmap);
            core::slice::from_raw_parts_mut(core::ptr::from_mut(first), len)
        };
        let frames = BitmapFrameAlloc::new(bitmap, boot_info.total_frames())?;
        let kernel = PageMap::from_root(mmu.active_root());

        info!(
            "vmm: {} frames ({} used), kernel page map {kernel}",
            frames.total_frames(),
            frames.used_frames()
        );

        let mut vmm = Self::new(mapper, mmu, frames, kernel, VirtualLayout::default());
        vmm.unmap(kernel, VirtualAddress::zero(), 1)?;
        Ok(vmm)
    }
}
