//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the raw addresses the memory manager passes
//! around, so a virtual address can never be handed to something expecting a
//! physical one (and vice versa).
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address on the machine bus. |
//! | [`VirtualAddress`] | A byte address as seen through a page map. |
//! | [`PhysicalPage<S>`] | The aligned base of a physical page of size `S`. |
//! | [`FrameNumber`] | The index of a 4 KiB physical frame (`address / 4096`). |
//!
//! ## Page Sizes
//!
//! The three x86-64 page sizes are marker types implementing [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages, the allocation granularity
//! - [`Size2M`]: 2 MiB huge pages (page-directory leaves)
//! - [`Size1G`]: 1 GiB huge pages (page-directory-pointer leaves)
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0020_3042);
//! let page = pa.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x0020_3000);
//! assert_eq!(page.join(pa.offset::<Size4K>()), pa);
//! assert_eq!(page.frame(), FrameNumber::new(0x203));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod frame_number;
mod physical_address;
mod physical_page;
mod virtual_address;

pub use crate::frame_number::FrameNumber;
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::virtual_address::VirtualAddress;

use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported page sizes.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;

    /// Mask selecting the in-page offset bits.
    const OFFSET_MASK: u64 = Self::SIZE - 1;

    fn as_str() -> &'static str;
}

/// 4 KiB page (4096 bytes).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl PageSize for Size4K {
    const SIZE: u64 = 4096;
    const SHIFT: u32 = 12;

    fn as_str() -> &'static str {
        "4K"
    }
}

/// 2 MiB page (`2_097_152` bytes).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size2M;
impl sealed::Sealed for Size2M {}
impl PageSize for Size2M {
    const SIZE: u64 = 2 * 1024 * 1024;
    const SHIFT: u32 = 21;

    fn as_str() -> &'static str {
        "2M"
    }
}

/// 1 GiB page (`1_073_741_824` bytes).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size1G;
impl sealed::Sealed for Size1G {}
impl PageSize for Size1G {
    const SIZE: u64 = 1024 * 1024 * 1024;
    const SHIFT: u32 = 30;

    fn as_str() -> &'static str {
        "1G"
    }
}

/// Number of bytes in `pages` 4 KiB pages, or `None` on overflow.
#[inline]
#[must_use]
pub const fn pages_to_bytes(pages: u64) -> Option<u64> {
    pages.checked_mul(Size4K::SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_and_shifts_agree() {
        assert_eq!(1u64 << Size4K::SHIFT, Size4K::SIZE);
        assert_eq!(1u64 << Size2M::SHIFT, Size2M::SIZE);
        assert_eq!(1u64 << Size1G::SHIFT, Size1G::SIZE);
        assert_eq!(Size2M::OFFSET_MASK, 0x1F_FFFF);
    }

    #[test]
    fn pages_to_bytes_checks_overflow() {
        assert_eq!(pages_to_bytes(3), Some(3 * 4096));
        assert_eq!(pages_to_bytes(u64::MAX), None);
    }

    #[test]
    fn virtual_split_and_join() {
        let va = VirtualAddress::new(0xFFFF_FF80_0040_1234);
        assert_eq!(va.offset::<Size4K>(), 0x234);
        assert_eq!(va.offset::<Size2M>(), 0x1234);
        assert_eq!(va.align_down::<Size4K>().as_u64(), 0xFFFF_FF80_0040_1000);
        assert!(!va.is_aligned::<Size4K>());
        assert!(va.align_down::<Size2M>().is_aligned::<Size2M>());
    }

    #[test]
    fn frame_numbers_round_trip() {
        let pa = PhysicalAddress::new(0x0010_0000);
        assert_eq!(pa.frame(), FrameNumber::new(0x100));
        assert_eq!(pa.frame().base(), pa);
        assert_eq!(FrameNumber::new(7).page().base().as_u64(), 0x7000);
        assert_eq!(FrameNumber::new(7) + 2, FrameNumber::new(9));
    }

    #[test]
    fn huge_page_join_keeps_offset() {
        let pa = PhysicalAddress::new(0x4000_0000 + 0x12_3456);
        let page = pa.page::<Size1G>();
        assert_eq!(page.base().as_u64(), 0x4000_0000);
        assert_eq!(page.join(0x12_3456), pa);
    }
}
