//! # Address Space (x86-64, PML4-rooted)
//!
//! [`AddressSpace`] views one page map through a [`PhysMapper`] and performs
//! every walk the memory manager needs with the same level-by-level shape:
//! look at the entry for the current [`Level`], stop at an absent entry or a
//! leaf, otherwise descend into the child table.
//!
//! - [`probe`](AddressSpace::probe) / [`translate`](AddressSpace::translate): read-only walk.
//! - [`map`](AddressSpace::map) / [`map_huge`](AddressSpace::map_huge): create
//!   missing interior tables on the way down, then install leaves.
//! - [`unmap`](AddressSpace::unmap): remove leaves and prune tables that became
//!   empty on the way back up.
//! - [`release`](AddressSpace::release): free the whole tree.
//!
//! Interior tables are always created present, writable and supervisor-only.
//! The shared kernel slot of the PML4 ([`KERNEL_PML4_SLOT`]) is never pruned
//! or released, since every address space links the same PDPT there.
//!
//! Every leaf installed or removed is invalidated through the [`Mmu`].

use crate::{FrameAlloc, Level, MapError, Mmu, PageTable, PageTableEntry, PhysMapper};
use core::fmt;
use kernel_info::memory::KERNEL_PML4_SLOT;
use kernel_memory_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size1G, Size2M, Size4K, VirtualAddress,
};
use log::{debug, trace};

/// Identifies an address space by the physical page of its PML4.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PageMap(PhysicalPage<Size4K>);

impl PageMap {
    #[inline]
    #[must_use]
    pub const fn from_root(root: PhysicalPage<Size4K>) -> Self {
        Self(root)
    }

    #[inline]
    #[must_use]
    pub const fn root(self) -> PhysicalPage<Size4K> {
        self.0
    }
}

impl fmt::Display for PageMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page map @ {}", self.0)
    }
}

/// Outcome of a read-only walk for one virtual address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Probe {
    /// A present leaf at `level` covers the address.
    Mapped { level: Level, entry: PageTableEntry },
    /// The walk hit an absent entry at `level`: the whole
    /// [`entry_span`](Level::entry_span)-sized block around the address is unmapped.
    Unmapped { level: Level },
}

impl Probe {
    #[inline]
    #[must_use]
    pub const fn is_mapped(self) -> bool {
        matches!(self, Self::Mapped { .. })
    }

    /// The level the walk stopped at.
    #[inline]
    #[must_use]
    pub const fn level(self) -> Level {
        match self {
            Self::Mapped { level, .. } | Self::Unmapped { level } => level,
        }
    }
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    #[inline]
    pub const fn new(mapper: &'m M, page_map: PageMap) -> Self {
        Self {
            root: page_map.root(),
            mapper,
        }
    }

    /// Allocate a fresh, all-absent PML4.
    ///
    /// # Errors
    /// [`MapError::OutOfFrames`] if no frame is available for the root.
    pub fn allocate<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, MapError> {
        let root = alloc.alloc_4k().ok_or(MapError::OutOfFrames)?;
        let space = Self { root, mapper };
        space.table(root).zero();
        debug!("allocated {}", space.page_map());
        Ok(space)
    }

    #[inline]
    pub const fn page_map(&self) -> PageMap {
        PageMap(self.root)
    }

    /// Borrow the table stored in `page`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn table(&self, page: PhysicalPage<Size4K>) -> &'m mut PageTable {
        // SAFETY: table frames reachable from `root` hold page tables and are
        // reachable through `mapper`. Callers never hold two borrows of the same frame.
        unsafe { self.mapper.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Read one PML4 entry.
    #[must_use]
    pub fn top_level_entry(&self, index: usize) -> PageTableEntry {
        self.table(self.root).get(index)
    }

    /// Overwrite one PML4 entry.
    pub fn set_top_level_entry(&self, index: usize, entry: PageTableEntry) {
        self.table(self.root).set(index, entry);
    }

    /// Walk towards `va` without modifying anything.
    #[must_use]
    pub fn probe(&self, va: VirtualAddress) -> Probe {
        let mut page = self.root;
        let mut level = Level::Pml4;
        loop {
            let entry = self.table(page).get(level.index_of(va));
            if !entry.present() {
                return Probe::Unmapped { level };
            }
            let Some(next) = level.next().filter(|_| !level.is_leaf(entry)) else {
                return Probe::Mapped { level, entry };
            };
            page = entry.table_page();
            level = next;
        }
    }

    /// Whether any present leaf (4 KiB or huge) covers `va`.
    #[inline]
    #[must_use]
    pub fn is_mapped(&self, va: VirtualAddress) -> bool {
        self.probe(va).is_mapped()
    }

    /// Translate `va` to a physical address, including the offset into huge pages.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        match self.probe(va) {
            Probe::Mapped { level, entry } => {
                let mask = level.entry_span() - 1;
                let base = entry.address().as_u64() & !mask;
                Some(PhysicalAddress::new(base | (va.as_u64() & mask)))
            }
            Probe::Unmapped { .. } => None,
        }
    }

    /// Map `count` consecutive 4 KiB pages `va.. → pa..`.
    ///
    /// `flags` supplies the leaf permissions; `present` is forced on. If any
    /// target page is already mapped, nothing is changed.
    ///
    /// # Errors
    /// - [`MapError::MisalignedVirtual`] / [`MapError::MisalignedPhysical`]
    /// - [`MapError::EmptyRange`] / [`MapError::Overflow`] / [`MapError::NonCanonical`]
    /// - [`MapError::PhysicalOverflow`] if `pa + count * 4096` wraps
    /// - [`MapError::DoubleMap`] for the first page already mapped
    /// - [`MapError::OutOfFrames`] while creating interior tables
    pub fn map<A: FrameAlloc, U: Mmu>(
        &self,
        alloc: &mut A,
        mmu: &U,
        pa: PhysicalAddress,
        va: VirtualAddress,
        count: u64,
        flags: PageTableEntry,
    ) -> Result<(), MapError> {
        let len = run_length(va, count)?;
        if !pa.is_aligned::<Size4K>() {
            return Err(MapError::MisalignedPhysical(pa));
        }
        if pa.checked_add(len).is_none() {
            return Err(MapError::PhysicalOverflow(pa));
        }

        if let Some(va) = pages(va, count).find(|&va| self.is_mapped(va)) {
            return Err(MapError::DoubleMap(va));
        }

        for (i, va) in pages(va, count).enumerate() {
            let pa = pa + i as u64 * Size4K::SIZE;
            self.install(alloc, mmu, Level::Pt, pa, va, flags)?;
        }
        trace!("mapped {va} -> {pa} x{count} in {}", self.page_map());
        Ok(())
    }

    /// Map one huge page of size `S` (2 MiB or 1 GiB) with a single
    /// PD / PDPT leaf. `S = Size4K` installs an ordinary leaf.
    ///
    /// # Errors
    /// Alignment to `S` on both sides, [`MapError::NonCanonical`],
    /// [`MapError::DoubleMap`] if anything is
    /// mapped in the target block, [`MapError::OutOfFrames`].
    pub fn map_huge<S: PageSize, A: FrameAlloc, U: Mmu>(
        &self,
        alloc: &mut A,
        mmu: &U,
        pa: PhysicalAddress,
        va: VirtualAddress,
        flags: PageTableEntry,
    ) -> Result<(), MapError> {
        if !va.is_aligned::<S>() {
            return Err(MapError::MisalignedVirtual(va));
        }
        if !va.is_canonical() {
            return Err(MapError::NonCanonical(va));
        }
        if !pa.is_aligned::<S>() {
            return Err(MapError::MisalignedPhysical(pa));
        }
        let level = if S::SIZE == Size1G::SIZE {
            Level::Pdpt
        } else if S::SIZE == Size2M::SIZE {
            Level::Pd
        } else {
            Level::Pt
        };
        self.install(alloc, mmu, level, pa, va, flags)
    }

    /// Install one leaf at `level`, creating interior tables above it.
    fn install<A: FrameAlloc, U: Mmu>(
        &self,
        alloc: &mut A,
        mmu: &U,
        level: Level,
        pa: PhysicalAddress,
        va: VirtualAddress,
        flags: PageTableEntry,
    ) -> Result<(), MapError> {
        let table = self.table(self.ensure_table(alloc, va, level)?);
        let index = level.index_of(va);
        if table.get(index).present() {
            return Err(MapError::DoubleMap(va));
        }

        let leaf = flags
            .with_present(true)
            .with_huge(level != Level::Pt)
            .with_frame(pa.frame().as_u64());
        table.set(index, leaf);
        mmu.invalidate_page(va);
        Ok(())
    }

    /// Walk from the root down to the table holding `target`-level entries
    /// for `va`, creating absent interior tables.
    fn ensure_table<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        target: Level,
    ) -> Result<PhysicalPage<Size4K>, MapError> {
        let mut page = self.root;
        let mut level = Level::Pml4;
        while level < target {
            let Some(next) = level.next() else { break };
            let table = self.table(page);
            let index = level.index_of(va);
            let entry = table.get(index);

            page = if entry.present() {
                if level.is_leaf(entry) {
                    return Err(MapError::HugeLeaf(va));
                }
                entry.table_page()
            } else {
                let child = alloc.alloc_4k().ok_or(MapError::OutOfFrames)?;
                self.table(child).zero();
                table.set(index, PageTableEntry::KERNEL_RW.pointing_to(child));
                debug!("new {next:?} table {child} for {va}");
                child
            };
            level = next;
        }
        Ok(page)
    }

    /// Remove leaves covering `[va, va + pages * 4096)`, one 4 KiB page or
    /// one huge page at a time, pruning tables that become empty.
    ///
    /// Stops early, without error, at the first address that is not mapped.
    /// Returns the number of leaves removed.
    ///
    /// # Errors
    /// [`MapError::MisalignedVirtual`], [`MapError::EmptyRange`], [`MapError::Overflow`],
    /// [`MapError::NonCanonical`].
    pub fn unmap<A: FrameAlloc, U: Mmu>(
        &self,
        alloc: &mut A,
        mmu: &U,
        va: VirtualAddress,
        pages: u64,
    ) -> Result<u64, MapError> {
        let end = va.as_u64() + run_length(va, pages)?;
        let mut cursor = va;
        let mut removed = 0;
        while cursor.as_u64() < end {
            let Some(level) = self.remove(alloc, mmu, self.root, Level::Pml4, cursor) else {
                trace!("unmap stops at unmapped {cursor}");
                break;
            };
            removed += 1;
            match level.block_start(cursor).checked_add(level.entry_span()) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        Ok(removed)
    }

    /// Clear the leaf for `va` below `page` (a `level` table), then prune the
    /// child table on the way back up if it became empty.
    fn remove<A: FrameAlloc, U: Mmu>(
        &self,
        alloc: &mut A,
        mmu: &U,
        page: PhysicalPage<Size4K>,
        level: Level,
        va: VirtualAddress,
    ) -> Option<Level> {
        let index = level.index_of(va);
        let entry = self.table(page).get(index);
        if !entry.present() {
            return None;
        }

        let Some(next) = level.next().filter(|_| !level.is_leaf(entry)) else {
            self.table(page).set(index, PageTableEntry::ABSENT);
            mmu.invalidate_page(va);
            trace!("unmapped {va} ({level:?} leaf)");
            return Some(level);
        };

        let child = entry.table_page();
        let removed = self.remove(alloc, mmu, child, next, va)?;
        if self.table(child).is_empty() && !is_shared_slot(level, index) {
            self.table(page).set(index, PageTableEntry::ABSENT);
            alloc.free_4k(child);
            debug!("pruned empty {next:?} table {child}");
        }
        Some(removed)
    }

    /// Free every frame this page map owns: interior tables, 4 KiB leaf
    /// frames, and finally the root. Huge leaves and the shared kernel slot
    /// are left alone.
    pub fn release<A: FrameAlloc>(self, alloc: &mut A) {
        self.release_table(alloc, self.root, Level::Pml4);
        alloc.free_4k(self.root);
        debug!("released {}", self.page_map());
    }

    fn release_table<A: FrameAlloc>(&self, alloc: &mut A, page: PhysicalPage<Size4K>, level: Level) {
        for (index, entry) in self.table(page).present_entries() {
            if is_shared_slot(level, index) {
                continue;
            }
            match level.next() {
                None => alloc.free_4k(entry.table_page()),
                Some(_) if level.is_leaf(entry) => {}
                Some(next) => {
                    let child = entry.table_page();
                    self.release_table(alloc, child, next);
                    alloc.free_4k(child);
                }
            }
        }
    }
}

const fn is_shared_slot(level: Level, index: usize) -> bool {
    matches!(level, Level::Pml4) && index == KERNEL_PML4_SLOT
}

/// Byte length of `pages` pages at `va`, validating alignment, emptiness,
/// wrap-around and that the run stays inside one canonical half.
fn run_length(va: VirtualAddress, pages: u64) -> Result<u64, MapError> {
    if !va.is_aligned::<Size4K>() {
        return Err(MapError::MisalignedVirtual(va));
    }
    if pages == 0 {
        return Err(MapError::EmptyRange);
    }
    let len = pages
        .checked_mul(Size4K::SIZE)
        .filter(|&len| va.checked_add(len).is_some())
        .ok_or(MapError::Overflow(va))?;
    let last = va + (len - 1);
    if !va.is_canonical() || !last.is_canonical() || va.as_u64() >> 47 != last.as_u64() >> 47 {
        return Err(MapError::NonCanonical(va));
    }
    Ok(len)
}

fn pages(va: VirtualAddress, count: u64) -> impl Iterator<Item = VirtualAddress> {
    (0..count).map(move |i| va + i * Size4K::SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimFrameAlloc, SimMmu, SimRam};
    use kernel_memory_addresses::FrameNumber;
    use proptest::prelude::*;

    const KERNEL_VA: u64 = 0xFFFF_FF80_0000_0000;

    struct Machine {
        ram: SimRam,
        frames: SimFrameAlloc,
    }

    impl Machine {
        fn new(frames: u64) -> Self {
            #[allow(clippy::cast_possible_truncation)]
            let ram = SimRam::new(frames as usize);
            Self {
                ram,
                frames: SimFrameAlloc::new(FrameNumber::new(1), FrameNumber::new(frames)),
            }
        }
    }

    fn va(v: u64) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    fn pa(v: u64) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    #[test]
    fn map_creates_tables_and_translates() {
        let mut m = Machine::new(64);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());

        space
            .map(&mut m.frames, &mmu, pa(0x0030_0000), va(0x40_0000), 1, PageTableEntry::KERNEL_RW)
            .unwrap();

        // Root plus PDPT, PD and PT.
        assert_eq!(m.frames.outstanding(), 4);
        assert_eq!(space.translate(va(0x40_0123)), Some(pa(0x0030_0123)));
        assert_eq!(space.translate(va(0x40_1000)), None);
        assert_eq!(mmu.invalidations(), vec![va(0x40_0000)]);

        let Probe::Mapped { level, entry } = space.probe(va(0x40_0000)) else {
            panic!("expected a leaf");
        };
        assert_eq!(level, Level::Pt);
        assert!(entry.present() && entry.writable() && !entry.user_access());
    }

    #[test]
    fn interior_tables_are_kernel_rw() {
        let mut m = Machine::new(64);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());
        let flags = PageTableEntry::KERNEL_RW.with_user_access(true);
        space.map(&mut m.frames, &mmu, pa(0x5000), va(0x1000), 1, flags).unwrap();

        let e4 = space.top_level_entry(0);
        assert!(e4.present() && e4.writable());
        assert!(!e4.user_access());
        assert!(!e4.huge());
    }

    #[test]
    fn double_map_is_rejected_without_changes() {
        let mut m = Machine::new(64);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());

        space
            .map(&mut m.frames, &mmu, pa(0x10_0000), va(0x2000), 1, PageTableEntry::KERNEL_RW)
            .unwrap();
        let err = space
            .map(&mut m.frames, &mmu, pa(0x20_0000), va(0x1000), 3, PageTableEntry::KERNEL_RW)
            .unwrap_err();

        assert_eq!(err, MapError::DoubleMap(va(0x2000)));
        assert_eq!(space.translate(va(0x1000)), None);
        assert_eq!(space.translate(va(0x2000)), Some(pa(0x10_0000)));
    }

    #[test]
    fn misaligned_and_empty_requests_fail() {
        let mut m = Machine::new(16);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());
        let f = PageTableEntry::KERNEL_RW;

        assert_eq!(
            space.map(&mut m.frames, &mmu, pa(0x1000), va(0x1001), 1, f),
            Err(MapError::MisalignedVirtual(va(0x1001)))
        );
        assert_eq!(
            space.map(&mut m.frames, &mmu, pa(0x1800), va(0x1000), 1, f),
            Err(MapError::MisalignedPhysical(pa(0x1800)))
        );
        assert_eq!(
            space.map(&mut m.frames, &mmu, pa(0x1000), va(0x1000), 0, f),
            Err(MapError::EmptyRange)
        );
        assert_eq!(
            space.unmap(&mut m.frames, &mmu, va(0x1000), u64::MAX),
            Err(MapError::Overflow(va(0x1000)))
        );
        assert_eq!(m.frames.outstanding(), 1);
    }

    #[test]
    fn physical_wrap_around_is_not_misalignment() {
        let mut m = Machine::new(16);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());
        let top = pa(0xFFFF_FFFF_FFFF_E000);

        assert_eq!(
            space.map(&mut m.frames, &mmu, top, va(0x1000), 3, PageTableEntry::KERNEL_RW),
            Err(MapError::PhysicalOverflow(top))
        );
        assert_eq!(m.frames.outstanding(), 1);
    }

    #[test]
    fn non_canonical_ranges_are_rejected() {
        let mut m = Machine::new(16);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());
        let f = PageTableEntry::KERNEL_RW;

        // Same PML4 slot as the kernel half, but not sign-extended.
        let alias = va(0x0000_FF80_0000_0000);
        assert_eq!(
            space.map(&mut m.frames, &mmu, pa(0x1000), alias, 1, f),
            Err(MapError::NonCanonical(alias))
        );
        assert_eq!(
            space.map_huge::<Size2M, _, _>(&mut m.frames, &mmu, pa(0x20_0000), alias, f),
            Err(MapError::NonCanonical(alias))
        );
        assert_eq!(
            space.unmap(&mut m.frames, &mmu, alias, 1),
            Err(MapError::NonCanonical(alias))
        );

        // Starts canonical, runs off the end of the lower half.
        let edge = va(0x0000_7FFF_FFFF_F000);
        assert_eq!(
            space.map(&mut m.frames, &mmu, pa(0x1000), edge, 2, f),
            Err(MapError::NonCanonical(edge))
        );
        assert!(!space.top_level_entry(KERNEL_PML4_SLOT).present());
        assert_eq!(m.frames.outstanding(), 1);
    }

    #[test]
    fn out_of_frames_is_reported() {
        // Only the root fits.
        let mut m = Machine::new(2);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());
        assert_eq!(
            space.map(&mut m.frames, &mmu, pa(0), va(0x1000), 1, PageTableEntry::KERNEL_RW),
            Err(MapError::OutOfFrames)
        );
    }

    #[test]
    fn unmap_prunes_empty_tables() {
        let mut m = Machine::new(64);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());

        space
            .map(&mut m.frames, &mmu, pa(0x8000), va(0x7000_0000), 2, PageTableEntry::KERNEL_RW)
            .unwrap();
        assert_eq!(m.frames.outstanding(), 4);

        assert_eq!(space.unmap(&mut m.frames, &mmu, va(0x7000_0000), 1), Ok(1));
        assert_eq!(m.frames.outstanding(), 4, "PT still holds the second page");

        assert_eq!(space.unmap(&mut m.frames, &mmu, va(0x7000_1000), 1), Ok(1));
        assert_eq!(m.frames.outstanding(), 1);
        assert!(!space.top_level_entry(0).present());
    }

    #[test]
    fn unmap_stops_at_first_hole() {
        let mut m = Machine::new(64);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());
        let f = PageTableEntry::KERNEL_RW;
        space.map(&mut m.frames, &mmu, pa(0x1000), va(0x10_0000), 1, f).unwrap();
        space.map(&mut m.frames, &mmu, pa(0x3000), va(0x10_2000), 1, f).unwrap();

        assert_eq!(space.unmap(&mut m.frames, &mmu, va(0x10_0000), 3), Ok(1));
        assert_eq!(space.translate(va(0x10_2000)), Some(pa(0x3000)));
        assert_eq!(space.unmap(&mut m.frames, &mmu, va(0x50_0000), 1), Ok(0));
    }

    #[test]
    fn kernel_slot_is_never_pruned() {
        let mut m = Machine::new(64);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());

        space
            .map(&mut m.frames, &mmu, pa(0x9000), va(KERNEL_VA), 1, PageTableEntry::KERNEL_RW)
            .unwrap();
        space.unmap(&mut m.frames, &mmu, va(KERNEL_VA), 1).unwrap();

        assert!(space.top_level_entry(KERNEL_PML4_SLOT).present());
        // Root and the shared PDPT remain.
        assert_eq!(m.frames.outstanding(), 2);
    }

    #[test]
    fn huge_leaves_translate_with_offset() {
        let mut m = Machine::new(64);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());
        let f = PageTableEntry::KERNEL_RW;

        space
            .map_huge::<Size2M, _, _>(&mut m.frames, &mmu, pa(0x4000_0000), va(0x20_0000), f)
            .unwrap();
        space
            .map_huge::<Size1G, _, _>(&mut m.frames, &mmu, pa(0x8000_0000), va(0x8000_0000), f)
            .unwrap();

        assert_eq!(space.translate(va(0x21_2345)), Some(pa(0x4001_2345)));
        assert_eq!(space.translate(va(0x8123_4567)), Some(pa(0x8123_4567)));
        assert_eq!(space.probe(va(0x20_0000)).level(), Level::Pd);
        assert_eq!(space.probe(va(0x8000_0000)).level(), Level::Pdpt);

        assert_eq!(
            space.map(&mut m.frames, &mmu, pa(0), va(0x20_1000), 1, f),
            Err(MapError::DoubleMap(va(0x20_1000)))
        );
        assert_eq!(
            space.map_huge::<Size2M, _, _>(&mut m.frames, &mmu, pa(0x4000_0000), va(0x30_0000), f),
            Err(MapError::MisalignedVirtual(va(0x30_0000)))
        );

        // One huge unit covers 512 pages, and is invalidated once.
        mmu.clear_invalidations();
        assert_eq!(space.unmap(&mut m.frames, &mmu, va(0x20_0000), 512), Ok(1));
        assert_eq!(space.translate(va(0x21_2345)), None);
        assert_eq!(mmu.invalidations(), vec![va(0x20_0000)]);

        assert_eq!(space.unmap(&mut m.frames, &mmu, va(0x8000_0000), 512 * 512), Ok(1));
        assert_eq!(space.translate(va(0x8000_0000)), None);
        assert_eq!(mmu.invalidations(), vec![va(0x20_0000), va(0x8000_0000)]);
    }

    #[test]
    fn walking_through_huge_leaf_is_refused() {
        let mut m = Machine::new(64);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());
        let f = PageTableEntry::KERNEL_RW;
        space
            .map_huge::<Size2M, _, _>(&mut m.frames, &mmu, pa(0x20_0000), va(0x20_0000), f)
            .unwrap();

        // Bypasses the precheck by installing at a deeper level directly.
        assert_eq!(
            space.install(&mut m.frames, &mmu, Level::Pt, pa(0), va(0x20_3000), f),
            Err(MapError::HugeLeaf(va(0x20_3000)))
        );
    }

    #[test]
    fn release_returns_every_owned_frame() {
        let mut m = Machine::new(128);
        let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
        let mmu = SimMmu::new(space.page_map().root());
        let f = PageTableEntry::KERNEL_RW;

        for v in [0x1000, 0x40_0000, 0x80_0000_0000, KERNEL_VA] {
            let leaf = m.frames.alloc_4k().unwrap();
            space.map(&mut m.frames, &mmu, leaf.base(), va(v), 1, f).unwrap();
        }
        let kernel_pdpt = space.top_level_entry(KERNEL_PML4_SLOT).table_page();

        space.release(&mut m.frames);

        // The kernel slot's PDPT, PD, PT and leaf survive.
        assert_eq!(m.frames.outstanding(), 4);
        assert!(m.frames.alloc_4k() != Some(kernel_pdpt));
    }

    proptest! {
        #[test]
        fn map_translate_unmap_round_trip(page in 1u64..(1 << 35), frame in 0u64..(1 << 40), offset in 0u64..4096) {
            let mut m = Machine::new(16);
            let space = AddressSpace::allocate(&m.ram, &mut m.frames).unwrap();
            let mmu = SimMmu::new(space.page_map().root());
            let v = va(page << 12);
            let p = pa(frame << 12);

            space.map(&mut m.frames, &mmu, p, v, 1, PageTableEntry::KERNEL_RW).unwrap();
            prop_assert_eq!(space.translate(v + offset), Some(p + offset));

            prop_assert_eq!(space.unmap(&mut m.frames, &mmu, v, 1), Ok(1));
            prop_assert_eq!(space.translate(v), None);
            prop_assert_eq!(m.frames.outstanding(), 1);
        }
    }
}
