use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use thiserror::Error;

/// Failures of the page-table walker and mapper.
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum MapError {
    #[error("out of physical frames for a page table")]
    OutOfFrames,
    #[error("virtual address {0} is not aligned to the page size")]
    MisalignedVirtual(VirtualAddress),
    #[error("physical address {0} is not aligned to the page size")]
    MisalignedPhysical(PhysicalAddress),
    #[error("{0} is already mapped")]
    DoubleMap(VirtualAddress),
    #[error("{0} is covered by a huge page")]
    HugeLeaf(VirtualAddress),
    #[error("empty range")]
    EmptyRange,
    #[error("range starting at {0} wraps the address space")]
    Overflow(VirtualAddress),
    #[error("range starting at {0} leaves the canonical half it starts in")]
    NonCanonical(VirtualAddress),
    #[error("physical range starting at {0} wraps the address space")]
    PhysicalOverflow(PhysicalAddress),
}
