//! # Virtual Memory Support
//!
//! The x86-64 four-level page-table walker and mapper.
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! Each 48-bit virtual address is divided into five fields:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! The CPU uses these fields as **indices** into four levels of 512-entry
//! tables ([`Level`]). Every table has the same shape ([`PageTable`]) and every
//! entry the same layout ([`PageTableEntry`]).
//!
//! ```text
//!  PML4  →  PDPT  →  PD  →  PT  →  Physical Page
//!   │        │        │        │
//!   │        │        │        └───► PTE:   maps a 4 KiB page
//!   │        │        └────────────► PDE:   PS=1 → 2 MiB page
//!   │        └─────────────────────► PDPTE: PS=1 → 1 GiB page
//!   └──────────────────────────────► PML4E: always links to a PDPT
//! ```
//!
//! ## What you get
//!
//! - [`AddressSpace`], a view of one page map through a [`PhysMapper`] that
//!   walks, creates and prunes tables level by level.
//! - The hardware seams the walker is generic over: [`PhysMapper`] (reach a
//!   physical frame), [`FrameAlloc`] (frames for interior tables) and
//!   [`Mmu`] (active root, TLB invalidation).
//! - With the `sim` feature, an in-memory machine ([`sim`]) for hosted tests.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

mod address_space;
mod entry;
mod error;
mod mmu;
mod table;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use crate::address_space::{AddressSpace, PageMap, Probe};
pub use crate::entry::PageTableEntry;
pub use crate::error::MapError;
#[cfg(target_arch = "x86_64")]
pub use crate::mmu::X86Mmu;
pub use crate::mmu::Mmu;
pub use crate::table::{ENTRIES, Level, PageTable};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Source of **physical** 4 KiB frames for page tables.
///
/// The implementation decides where frames come from (bitmap, boot pool, ...).
pub trait FrameAlloc {
    /// Allocate one frame, or `None` when physical memory is exhausted.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, page: PhysicalPage<Size4K>);
}

/// Converts physical addresses to *temporarily* usable references in the
/// current virtual address space (e.g., via identity map or a higher-half
/// direct map, HHDM).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must be mapped writable in the current page tables for `'a`.
    /// - The bytes at `pa` must be a valid `T`, and no other live reference
    ///   may alias them while the returned one is in use.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}
