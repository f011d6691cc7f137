use crate::{FrameNumber, PageSize, PhysicalAddress, Size4K};
use core::fmt;
use core::marker::PhantomData;

/// Physical memory page base for size `S`.
///
/// A `PhysicalPage<S>` is the **page-aligned base** of a physical page of
/// `S::SIZE` bytes. The low `S::SHIFT` bits of the base are always zero.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0000_0008_1234_5678);
/// let pp = pa.page::<Size2M>();
/// assert_eq!(pp.base().as_u64() & (Size2M::SIZE - 1), 0);
/// assert_eq!(pp.join(pa.offset::<Size2M>()), pa);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// The page containing `pa` (offset bits dropped).
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.as_u64() & !S::OFFSET_MASK,
            _size: PhantomData,
        }
    }

    /// The page starting exactly at `pa`, or `None` if `pa` is not aligned to `S`.
    #[inline]
    #[must_use]
    pub const fn from_aligned(pa: PhysicalAddress) -> Option<Self> {
        if pa.is_aligned::<S>() {
            Some(Self::containing(pa))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// Combine this base with an in-page offset.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> PhysicalAddress {
        debug_assert!(offset < S::SIZE, "offset must be < page size");
        PhysicalAddress::new(self.base | (offset & S::OFFSET_MASK))
    }
}

impl PhysicalPage<Size4K> {
    /// The frame number of this 4 KiB page.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> FrameNumber {
        FrameNumber::new(self.base >> Size4K::SHIFT)
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({:#018X})", S::as_str(), self.base)
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.base(), f)
    }
}

impl From<FrameNumber> for PhysicalPage<Size4K> {
    #[inline]
    fn from(frame: FrameNumber) -> Self {
        frame.page()
    }
}
