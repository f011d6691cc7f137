//! A simulated machine in the state the boot loader leaves it in.

#![allow(dead_code)]

use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_alloc::vmm::Vmm;
use kernel_info::boot::{BootContract, BootInfo};
use kernel_info::memory::KERNEL_PML4_SLOT;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::sim::{SimMmu, SimRam};
use kernel_vmem::{AddressSpace, FrameAlloc, PageTableEntry};

/// 2 MiB of RAM.
pub const FRAMES: u64 = 512;

/// Frames the loader itself uses: the reserved run `[0, 257)`, the kernel
/// PML4 and PDPT, and the PDPT/PD/PT of the low identity map.
pub const LOADER_FRAMES: u64 = 257 + 2 + 3;

pub type SimVmm<'m> = Vmm<'m, SimRam, SimMmu, BitmapFrameAlloc<'m>>;

/// Boot record, frame bitmap, a kernel PML4 with slot 511 linked, and the
/// low 1 MiB identity mapped, all written into simulated RAM.
#[allow(clippy::cast_possible_truncation)]
pub fn loader() -> (SimRam, SimMmu) {
    let ram = SimRam::new(FRAMES as usize);
    let contract = BootContract::DEFAULT;
    let info = BootInfo {
        total_memory: FRAMES * 4096,
    };
    ram.write_u64(contract.boot_info, info.total_memory);

    let mut bitmap = vec![0u8; info.bitmap_len() as usize];
    let mmu = {
        let mut frames = BitmapFrameAlloc::new(&mut bitmap, info.total_frames()).unwrap();
        frames.reserve_boot_region(&contract, &info).unwrap();

        let kernel = AddressSpace::allocate(&ram, &mut frames).unwrap();
        let pdpt = frames.alloc_4k().unwrap();
        kernel.set_top_level_entry(KERNEL_PML4_SLOT, PageTableEntry::KERNEL_RW.pointing_to(pdpt));

        let mmu = SimMmu::new(kernel.page_map().root());
        kernel
            .map(
                &mut frames,
                &mmu,
                PhysicalAddress::zero(),
                VirtualAddress::zero(),
                256,
                PageTableEntry::KERNEL_RW,
            )
            .unwrap();
        mmu.clear_invalidations();
        mmu
    };
    ram.write(contract.frame_bitmap, &bitmap);
    (ram, mmu)
}

/// Bring the memory manager up on a [`loader`] machine.
pub fn vmm<'m>(ram: &'m SimRam, mmu: &'m SimMmu) -> SimVmm<'m> {
    // SAFETY: `loader` wrote both boot structures, and nothing else touches them.
    unsafe { Vmm::from_boot(BootContract::DEFAULT, ram, mmu) }.unwrap()
}
