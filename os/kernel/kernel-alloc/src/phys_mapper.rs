//! # HHDM-based `PhysMapper` for Kernel Virtual Memory
//!
//! With a higher-half direct map every physical address `pa` is reachable at
//! `HHDM_BASE + pa`, so the kernel can touch page tables, the frame bitmap and
//! the frames behind other address spaces without mapping them first.

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// # Safety
/// The direct map must be present in the active page map and cover the
/// referenced physical range.
#[derive(Copy, Clone, Debug, Default)]
pub struct HhdmPhysMapper;

impl HhdmPhysMapper {
    /// Virtual address of `pa` inside the direct map.
    #[inline]
    #[must_use]
    pub const fn virt(pa: PhysicalAddress) -> u64 {
        HHDM_BASE + pa.as_u64()
    }
}

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = Self::virt(pa) as *mut T;
        // SAFETY: Caller must ensure the physical address is valid and mapped via HHDM.
        unsafe { &mut *va }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_map_offset() {
        assert_eq!(
            HhdmPhysMapper::virt(PhysicalAddress::new(0x10_0000)),
            0xFFFF_FFC0_0010_0000
        );
    }
}
