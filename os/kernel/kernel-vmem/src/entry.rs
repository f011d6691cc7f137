//! # Page-Table Entries
//!
//! One 64-bit layout serves all four levels. Whether an entry is a leaf or a
//! link to the next table depends on the level and on [`huge`](PageTableEntry::huge),
//! see [`Level::is_leaf`](crate::Level::is_leaf).

use bitfield_struct::bitfield;
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, PhysicalPage, Size4K};

/// x86-64 page-table entry (PML4E, PDPTE, PDE or PTE).
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageTableEntry {
    /// Bit 0: the entry is valid; clear means "absent" and all other bits are ignored.
    pub present: bool,

    /// Bit 1: writes allowed through this entry.
    pub writable: bool,

    /// Bit 2: accessible from CPL 3.
    pub user_access: bool,

    /// Bit 3: write-through caching.
    pub write_through: bool,

    /// Bit 4: caching disabled.
    pub cache_disabled: bool,

    /// Bit 5: set by the CPU on access.
    pub accessed: bool,

    /// Bit 6: set by the CPU on write (leaves only).
    pub dirty: bool,

    /// Bit 7: PS. At PDPT/PD level the entry maps a 1 GiB / 2 MiB page.
    pub huge: bool,

    /// Bit 8: survives CR3 reloads when CR4.PGE is set (leaves only).
    pub global: bool,

    /// Bits 9–11: ignored by hardware.
    #[bits(3)]
    pub os_available_low: u8,

    /// Bits 12–51: physical frame number of the child table or mapped page.
    #[bits(40)]
    pub frame: u64,

    /// Bits 52–62: ignored by hardware.
    #[bits(11)]
    pub os_available_high: u16,

    /// Bit 63: instruction fetches fault (requires EFER.NXE).
    pub no_execute: bool,
}

impl PageTableEntry {
    /// The all-zero, not-present entry.
    pub const ABSENT: Self = Self::new();

    /// Present, writable, supervisor-only. Used for interior links and
    /// for the memory manager's own leaves.
    pub const KERNEL_RW: Self = Self::new().with_present(true).with_writable(true);

    /// This entry's flags, now naming `page`.
    #[inline]
    #[must_use]
    pub const fn pointing_to(self, page: PhysicalPage<Size4K>) -> Self {
        self.with_frame(page.frame().as_u64())
    }

    #[inline]
    #[must_use]
    pub const fn frame_number(self) -> FrameNumber {
        FrameNumber::new(self.frame())
    }

    /// Physical address stored in the entry.
    #[inline]
    #[must_use]
    pub const fn address(self) -> PhysicalAddress {
        self.frame_number().base()
    }

    /// The child table this (interior) entry links to.
    #[inline]
    #[must_use]
    pub const fn table_page(self) -> PhysicalPage<Size4K> {
        self.frame_number().page()
    }
}
