//! # Memory Layout

use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress};

/// Start of the kernel namespace, the base of PML4 slot 511.
pub const KERNEL_BASE: u64 = 0xFFFF_FF80_0000_0000;

/// Higher Half Direct Map (HHDM) base.
/// Physical address `pa` is reachable at [`HHDM_BASE`] + `pa`.
pub const HHDM_BASE: u64 = 0xFFFF_FFC0_0000_0000;

/// The top-level (PML4) slot shared by every address space.
pub const KERNEL_PML4_SLOT: usize = 511;

/// First address handed out to user mappings; page 0 stays unmapped.
pub const USER_BASE: u64 = 0x1000;

/// End (exclusive) of the canonical lower half.
pub const USER_END: u64 = 0x0000_8000_0000_0000;

const _: () = {
    assert!(KERNEL_BASE.is_multiple_of(Size4K::SIZE));
    assert!(HHDM_BASE > KERNEL_BASE);
    assert!(USER_END <= KERNEL_BASE);
    assert!((KERNEL_BASE >> 39) & 0x1FF == KERNEL_PML4_SLOT as u64);
    assert!((HHDM_BASE >> 39) & 0x1FF == KERNEL_PML4_SLOT as u64);
};

/// A half-open, page-aligned range of virtual addresses `[start, end)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VirtualRange {
    pub start: VirtualAddress,
    pub end: VirtualAddress,
}

impl VirtualRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self {
            start: VirtualAddress::new(start),
            end: VirtualAddress::new(end),
        }
    }

    /// Number of 4 KiB pages covered by the range.
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.end.as_u64().saturating_sub(self.start.as_u64()) / Size4K::SIZE
    }

    /// Whether `[va, va + pages * 4096)` lies entirely inside this range.
    #[must_use]
    pub const fn contains_run(&self, va: VirtualAddress, pages: u64) -> bool {
        let Some(len) = pages.checked_mul(Size4K::SIZE) else {
            return false;
        };
        let Some(end) = va.as_u64().checked_add(len) else {
            return false;
        };
        va.as_u64() >= self.start.as_u64() && end <= self.end.as_u64()
    }
}

/// Where the region allocator looks for free virtual ranges.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VirtualLayout {
    /// Searched when allocating in the kernel page map.
    pub kernel: VirtualRange,
    /// Searched when allocating in any other page map.
    pub user: VirtualRange,
}

impl VirtualLayout {
    /// The production layout: kernel heap below the direct map, users in the lower half.
    pub const DEFAULT: Self = Self {
        kernel: VirtualRange::new(KERNEL_BASE, HHDM_BASE),
        user: VirtualRange::new(USER_BASE, USER_END),
    };
}

impl Default for VirtualLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_disjoint() {
        let l = VirtualLayout::default();
        assert!(l.user.end <= l.kernel.start);
        assert_eq!(l.kernel.pages(), (HHDM_BASE - KERNEL_BASE) / 4096);
    }

    #[test]
    fn contains_run_respects_bounds() {
        let r = VirtualRange::new(0x1000, 0x5000);
        assert!(r.contains_run(VirtualAddress::new(0x1000), 4));
        assert!(!r.contains_run(VirtualAddress::new(0x1000), 5));
        assert!(!r.contains_run(VirtualAddress::new(0), 1));
        assert!(!r.contains_run(VirtualAddress::new(0x2000), u64::MAX));
    }
}
