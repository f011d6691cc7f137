use crate::PageTableEntry;
use kernel_memory_addresses::VirtualAddress;

/// Number of entries in every page table.
pub const ENTRIES: usize = 512;

/// A 4 KiB page table. The same shape is used at every level.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES],
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn get(&self, index: usize) -> PageTableEntry {
        self.entries[index]
    }

    #[inline]
    pub const fn set(&mut self, index: usize, entry: PageTableEntry) {
        self.entries[index] = entry;
    }

    /// Clear all entries.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::ABSENT);
    }

    /// Whether no entry is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| !e.present())
    }

    /// Present entries with their indices.
    pub fn present_entries(&self) -> impl Iterator<Item = (usize, PageTableEntry)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, e)| e.present())
    }
}

/// One level of the four-level radix tree, top first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    /// Level 4, indexed by VA bits 47–39.
    Pml4,
    /// Level 3, indexed by VA bits 38–30. Huge entries map 1 GiB.
    Pdpt,
    /// Level 2, indexed by VA bits 29–21. Huge entries map 2 MiB.
    Pd,
    /// Level 1, indexed by VA bits 20–12. Always a leaf.
    Pt,
}

impl Level {
    #[inline]
    const fn shift(self) -> u32 {
        match self {
            Self::Pml4 => 39,
            Self::Pdpt => 30,
            Self::Pd => 21,
            Self::Pt => 12,
        }
    }

    /// Index into a table at this level for `va`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index_of(self, va: VirtualAddress) -> usize {
        ((va.as_u64() >> self.shift()) & 0x1FF) as usize
    }

    /// The level below, or `None` for [`Level::Pt`].
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pml4 => Some(Self::Pdpt),
            Self::Pdpt => Some(Self::Pd),
            Self::Pd => Some(Self::Pt),
            Self::Pt => None,
        }
    }

    /// Bytes of virtual memory covered by one entry at this level.
    #[inline]
    #[must_use]
    pub const fn entry_span(self) -> u64 {
        1 << self.shift()
    }

    /// Whether `entry` at this level terminates the walk.
    #[inline]
    #[must_use]
    pub const fn is_leaf(self, entry: PageTableEntry) -> bool {
        match self {
            Self::Pml4 => false,
            Self::Pdpt | Self::Pd => entry.huge(),
            Self::Pt => true,
        }
    }

    /// The lowest address of the entry-sized block containing `va`.
    #[inline]
    #[must_use]
    pub const fn block_start(self, va: VirtualAddress) -> VirtualAddress {
        VirtualAddress::new(va.as_u64() & !(self.entry_span() - 1))
    }
}
