//! # Simulated Machine
//!
//! Just enough hardware to run the walker on a hosted target: RAM that can be
//! reached through [`PhysMapper`], an [`Mmu`] that records invalidations, and a
//! frame pool that counts what is outstanding.
//!
//! ```rust
//! # use kernel_vmem::sim::{SimFrameAlloc, SimMmu, SimRam};
//! # use kernel_vmem::{AddressSpace, PageTableEntry};
//! # use kernel_memory_addresses::{FrameNumber, PhysicalAddress, VirtualAddress};
//! let ram = SimRam::new(32);
//! let mut frames = SimFrameAlloc::new(FrameNumber::new(1), FrameNumber::new(32));
//! let space = AddressSpace::allocate(&ram, &mut frames).unwrap();
//! let mmu = SimMmu::new(space.page_map().root());
//!
//! let va = VirtualAddress::new(0x40_0000);
//! let pa = PhysicalAddress::new(0x1F000);
//! space.map(&mut frames, &mmu, pa, va, 1, PageTableEntry::KERNEL_RW).unwrap();
//! assert_eq!(space.translate(va + 8), Some(pa + 8));
//! ```

use crate::{FrameAlloc, Mmu, PhysMapper};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell, UnsafeCell};
use kernel_memory_addresses::{FrameNumber, PageSize, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

#[allow(clippy::cast_possible_truncation)]
const FRAME_SIZE: usize = Size4K::SIZE as usize;

#[repr(C, align(4096))]
struct Frame([u8; FRAME_SIZE]);

/// Zeroed physical memory starting at physical address 0.
///
/// Physical addresses map 1:1 onto byte offsets of one contiguous buffer, so
/// structures spanning several frames (like the frame bitmap) stay contiguous.
pub struct SimRam {
    frames: Box<[UnsafeCell<Frame>]>,
}

impl SimRam {
    #[must_use]
    pub fn new(frames: usize) -> Self {
        Self {
            frames: (0..frames)
                .map(|_| UnsafeCell::new(Frame([0; FRAME_SIZE])))
                .collect(),
        }
    }

    /// Size of the simulated memory in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.frames.len() as u64 * Size4K::SIZE
    }

    #[allow(clippy::cast_possible_truncation)]
    fn ptr(&self, pa: PhysicalAddress, len: usize) -> *mut u8 {
        let end = pa.as_u64().checked_add(len as u64);
        assert!(
            end.is_some_and(|end| end <= self.size()),
            "{pa:?} (+{len}) is outside simulated RAM"
        );
        let base = UnsafeCell::raw_get(self.frames.as_ptr()).cast::<u8>();
        // SAFETY: bounds checked above; the buffer is one allocation.
        unsafe { base.add(pa.as_u64() as usize) }
    }

    /// Copy bytes out of simulated memory.
    pub fn read(&self, pa: PhysicalAddress, buf: &mut [u8]) {
        let src = self.ptr(pa, buf.len());
        // SAFETY: in bounds, and `buf` cannot overlap the frames.
        unsafe { core::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len()) }
    }

    /// Copy bytes into simulated memory.
    pub fn write(&self, pa: PhysicalAddress, bytes: &[u8]) {
        let dst = self.ptr(pa, bytes.len());
        // SAFETY: in bounds, and `bytes` cannot overlap the frames.
        unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) }
    }

    pub fn write_u64(&self, pa: PhysicalAddress, value: u64) {
        self.write(pa, &value.to_le_bytes());
    }
}

impl PhysMapper for SimRam {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = self.ptr(pa, size_of::<T>()).cast::<T>();
        debug_assert!(ptr.is_aligned(), "{pa:?} is misaligned for the requested type");
        // SAFETY: in bounds; the caller upholds the trait's aliasing contract.
        unsafe { &mut *ptr }
    }
}

/// An [`Mmu`] with a settable root that logs every invalidation.
pub struct SimMmu {
    root: Cell<PhysicalPage<Size4K>>,
    invalidated: RefCell<Vec<VirtualAddress>>,
}

impl SimMmu {
    #[must_use]
    pub const fn new(root: PhysicalPage<Size4K>) -> Self {
        Self {
            root: Cell::new(root),
            invalidated: RefCell::new(Vec::new()),
        }
    }

    /// Switch the active page map, like a CR3 write.
    pub fn set_root(&self, root: PhysicalPage<Size4K>) {
        self.root.set(root);
    }

    /// Every address invalidated so far, in order.
    #[must_use]
    pub fn invalidations(&self) -> Vec<VirtualAddress> {
        self.invalidated.borrow().clone()
    }

    pub fn clear_invalidations(&self) {
        self.invalidated.borrow_mut().clear();
    }
}

impl Mmu for SimMmu {
    fn active_root(&self) -> PhysicalPage<Size4K> {
        self.root.get()
    }

    fn invalidate_page(&self, va: VirtualAddress) {
        self.invalidated.borrow_mut().push(va);
    }
}

/// A frame pool over `[first, end)` that reuses freed frames and panics on
/// a double free.
pub struct SimFrameAlloc {
    next: FrameNumber,
    end: FrameNumber,
    freed: Vec<PhysicalPage<Size4K>>,
    outstanding: usize,
}

impl SimFrameAlloc {
    #[must_use]
    pub const fn new(first: FrameNumber, end: FrameNumber) -> Self {
        Self {
            next: first,
            end,
            freed: Vec::new(),
            outstanding: 0,
        }
    }

    /// Frames handed out and not yet returned.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl FrameAlloc for SimFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        let page = match self.freed.pop() {
            Some(page) => page,
            None if self.next < self.end => {
                let page = self.next.page();
                self.next = self.next + 1;
                page
            }
            None => return None,
        };
        self.outstanding += 1;
        Some(page)
    }

    fn free_4k(&mut self, page: PhysicalPage<Size4K>) {
        assert!(!self.freed.contains(&page), "double free of {page:?}");
        self.freed.push(page);
        self.outstanding -= 1;
    }
}
