use crate::{PageSize, PhysicalAddress, PhysicalPage, Size4K};
use core::fmt;
use core::ops::Add;

/// Index of a 4 KiB physical frame (`physical address / 4096`).
///
/// This is the unit the frame bitmap tracks, and the 40-bit value stored in
/// page-table entries.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameNumber(u64);

impl FrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Physical address of the first byte of this frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << Size4K::SHIFT)
    }

    #[inline]
    #[must_use]
    pub const fn page(self) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(self.base())
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#X})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Add<u64> for FrameNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl From<PhysicalPage<Size4K>> for FrameNumber {
    #[inline]
    fn from(page: PhysicalPage<Size4K>) -> Self {
        page.frame()
    }
}
