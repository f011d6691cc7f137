//! # Cross-Space Sharing
//!
//! Maps frames that are already mapped in one page map into a fresh range of
//! another. No frames are allocated for leaves; both sides alias the same
//! physical memory.

use crate::vmm::{Vmm, VmmError, run_length};
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress};
use kernel_vmem::{FrameAlloc, Mmu, PageMap, PageTableEntry, PhysMapper};
use log::debug;

impl<M: PhysMapper, U: Mmu, A: FrameAlloc> Vmm<'_, M, U, A> {
    /// Alias `pages` pages of `src` at `src_va` into a free range of `dst`.
    /// Returns the base of the new range in `dst`.
    ///
    /// # Errors
    /// [`VmmError::SourceUnmapped`] if any source page is not mapped (nothing
    /// is changed), [`VmmError::OutOfVirtualSpace`], [`VmmError::OutOfFrames`].
    pub fn share(
        &mut self,
        dst: PageMap,
        src: PageMap,
        src_va: VirtualAddress,
        pages: u64,
    ) -> Result<VirtualAddress, VmmError> {
        run_length(src_va, pages)?;
        let source = self.space(src);
        if let Some(unmapped) = (0..pages)
            .map(|i| src_va + i * Size4K::SIZE)
            .find(|&va| source.translate(va).is_none())
        {
            return Err(VmmError::SourceUnmapped(unmapped));
        }

        let dst_va = self.find_free_range(dst, pages)?;
        let target = self.space(dst);
        for i in 0..pages {
            let offset = i * Size4K::SIZE;
            let pa = source
                .translate(src_va + offset)
                .ok_or(VmmError::SourceUnmapped(src_va + offset))?;
            target.map(
                &mut self.frames,
                self.mmu,
                pa,
                dst_va + offset,
                1,
                PageTableEntry::KERNEL_RW,
            )?;
        }
        debug!("shared {src_va} x{pages} of {src} at {dst_va} in {dst}");
        Ok(dst_va)
    }

    /// Copy `bytes` to `va` in `page_map`, which need not be active, through
    /// the physical mapper.
    ///
    /// # Errors
    /// [`VmmError::Unmapped`] for the first page of the destination that is
    /// not mapped (nothing is written), [`VmmError::InvalidRange`] on wrap-around.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_bytes(
        &self,
        page_map: PageMap,
        va: VirtualAddress,
        bytes: &[u8],
    ) -> Result<(), VmmError> {
        let space = self.space(page_map);
        let end = va
            .checked_add(bytes.len() as u64)
            .ok_or(VmmError::InvalidRange(va))?;

        let mut page = va.align_down::<Size4K>();
        while page < end {
            if !space.is_mapped(page) {
                return Err(VmmError::Unmapped(page.max(va)));
            }
            match page.checked_add(Size4K::SIZE) {
                Some(next) => page = next,
                None => break,
            }
        }

        let mut written = 0;
        while written < bytes.len() {
            let cursor = va + written as u64;
            let pa = space
                .translate(cursor)
                .ok_or(VmmError::Unmapped(cursor))?;
            let in_page = cursor.offset::<Size4K>() as usize;
            let chunk = (Size4K::SIZE as usize - in_page).min(bytes.len() - written);

            // SAFETY: `pa` is a mapped frame of `page_map`, reachable through the mapper.
            let frame: &mut [u8; 4096] =
                unsafe { self.mapper.phys_to_mut(pa.page::<Size4K>().base()) };
            frame[in_page..in_page + chunk].copy_from_slice(&bytes[written..written + chunk]);
            written += chunk;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::vmm::testing::{boot, machine};
    use crate::vmm::{Vmm, VmmError};
    use kernel_info::memory::VirtualLayout;
    use kernel_memory_addresses::VirtualAddress;

    #[test]
    fn shared_pages_alias_the_source_frames() {
        let (ram, mut bitmap) = machine();
        let (frames, kernel, mmu) = boot(&ram, &mut bitmap);
        let mut vmm = Vmm::new(&ram, &mmu, frames, kernel, VirtualLayout::default());
        let user = vmm.create().unwrap();

        let src = vmm.alloc(kernel, None, 2).unwrap();
        let used = vmm.frames().used_frames();
        let dst = vmm.share(user, kernel, src, 2).unwrap();

        for page in 0..2 {
            let off = page * 0x1000 + 0x18;
            assert_eq!(vmm.translate(user, dst + off), vmm.translate(kernel, src + off));
        }
        // Only the user PDPT/PD/PT were needed.
        assert_eq!(vmm.frames().used_frames(), used + 3);
    }

    #[test]
    fn unmapped_source_is_rejected_up_front() {
        let (ram, mut bitmap) = machine();
        let (frames, kernel, mmu) = boot(&ram, &mut bitmap);
        let mut vmm = Vmm::new(&ram, &mmu, frames, kernel, VirtualLayout::default());
        let user = vmm.create().unwrap();
        let src = vmm.alloc(kernel, None, 1).unwrap();
        let used = vmm.frames().used_frames();

        assert_eq!(
            vmm.share(user, kernel, src, 2),
            Err(VmmError::SourceUnmapped(src + 0x1000))
        );
        assert_eq!(vmm.frames().used_frames(), used);
    }

    #[test]
    fn write_bytes_crosses_page_boundaries() {
        let (ram, mut bitmap) = machine();
        let (frames, kernel, mmu) = boot(&ram, &mut bitmap);
        let mut vmm = Vmm::new(&ram, &mmu, frames, kernel, VirtualLayout::default());
        let user = vmm.create().unwrap();
        let va = vmm.alloc(user, None, 2).unwrap();

        let data: Vec<u8> = (0..=255).cycle().take(300).collect();
        let at = va + (0x1000 - 100);
        vmm.write_bytes(user, at, &data).unwrap();

        let mut head = [0u8; 100];
        let mut tail = [0u8; 200];
        ram.read(vmm.translate(user, at).unwrap(), &mut head);
        ram.read(vmm.translate(user, va + 0x1000).unwrap(), &mut tail);
        assert_eq!(&head[..], &data[..100]);
        assert_eq!(&tail[..], &data[100..]);
    }

    #[test]
    fn write_bytes_refuses_partially_unmapped_targets() {
        let (ram, mut bitmap) = machine();
        let (frames, kernel, mmu) = boot(&ram, &mut bitmap);
        let mut vmm = Vmm::new(&ram, &mmu, frames, kernel, VirtualLayout::default());
        let user = vmm.create().unwrap();
        let va = vmm.alloc(user, None, 1).unwrap();

        assert_eq!(
            vmm.write_bytes(user, va + 0xFF0, &[1; 32]),
            Err(VmmError::Unmapped(va + 0x1000))
        );
        let mut check = [0u8; 16];
        ram.read(vmm.translate(user, va + 0xFF0).unwrap(), &mut check);
        assert_eq!(check, [0; 16]);
        assert_eq!(
            vmm.write_bytes(user, VirtualAddress::new(u64::MAX), &[1, 2]),
            Err(VmmError::InvalidRange(VirtualAddress::new(u64::MAX)))
        );
    }
}
