//! # Bitmap Physical Frame Allocator
//!
//! One bit per 4 KiB frame over all of physical memory, **most significant
//! bit first**: frame `8k + i` is bit `7 - i` of byte `k`. A set bit means the
//! frame is not available. The boot loader hands the bitmap over with low
//! memory, its own structures and the bitmap itself already marked.
//!
//! Runs are found first-fit, scanning upwards from frame 0.
//!
//! ```rust
//! use kernel_alloc::frame_alloc::BitmapFrameAlloc;
//! use kernel_memory_addresses::FrameNumber;
//!
//! let mut bitmap = [0u8; 2];
//! let mut frames = BitmapFrameAlloc::new(&mut bitmap, 16).unwrap();
//! let pa = frames.alloc(3).unwrap();
//! assert_eq!(pa.as_u64(), 0);
//! assert!(frames.check(FrameNumber::new(0), 3));
//! drop(frames);
//! assert_eq!(bitmap[0], 0b1110_0000);
//! ```

use kernel_info::boot::{BootContract, BootInfo};
use kernel_memory_addresses::{FrameNumber, PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::FrameAlloc;
use log::{error, trace};
use thiserror::Error;

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum FrameAllocError {
    #[error("no run of {0} free frames")]
    OutOfFrames(u64),
    #[error("frames {frame}..+{length} run past the end of physical memory")]
    OutOfRange { frame: FrameNumber, length: u64 },
    #[error("empty frame run")]
    EmptyRun,
    #[error("bitmap of {got} bytes cannot track {frames} frames")]
    BitmapTooSmall { got: usize, frames: u64 },
}

/// Bit-per-frame physical memory allocator over a borrowed bitmap.
pub struct BitmapFrameAlloc<'a> {
    bitmap: &'a mut [u8],
    total_frames: u64,
}

impl<'a> BitmapFrameAlloc<'a> {
    /// Track `total_frames` frames in `bitmap`. Existing bits are kept.
    ///
    /// # Errors
    /// [`FrameAllocError::BitmapTooSmall`] if `bitmap` has fewer than
    /// `ceil(total_frames / 8)` bytes.
    pub fn new(bitmap: &'a mut [u8], total_frames: u64) -> Result<Self, FrameAllocError> {
        if (bitmap.len() as u64) < total_frames.div_ceil(8) {
            return Err(FrameAllocError::BitmapTooSmall {
                got: bitmap.len(),
                frames: total_frames,
            });
        }
        Ok(Self {
            bitmap,
            total_frames,
        })
    }

    #[must_use]
    pub const fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// `true` if any frame in `[frame, frame + length)` is used, or if the run
    /// does not fit inside physical memory.
    #[must_use]
    pub fn check(&self, frame: FrameNumber, length: u64) -> bool {
        let first = frame.as_u64();
        match first.checked_add(length) {
            Some(end) if end <= self.total_frames => (first..end).any(|f| self.is_used(f)),
            _ => true,
        }
    }

    /// Mark `[frame, frame + length)` used.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfRange`] if the run does not fit.
    pub fn set(&mut self, frame: FrameNumber, length: u64) -> Result<(), FrameAllocError> {
        self.fill(frame, length, true)
    }

    /// Mark `[frame, frame + length)` free.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfRange`] if the run does not fit.
    pub fn clear(&mut self, frame: FrameNumber, length: u64) -> Result<(), FrameAllocError> {
        self.fill(frame, length, false)
    }

    /// Reserve the first free run of `length` frames and return its base address.
    ///
    /// # Errors
    /// [`FrameAllocError::EmptyRun`], or [`FrameAllocError::OutOfFrames`]
    /// when no run of that length is free.
    pub fn alloc(&mut self, length: u64) -> Result<PhysicalAddress, FrameAllocError> {
        if length == 0 {
            return Err(FrameAllocError::EmptyRun);
        }

        let mut start = 0;
        while start + length <= self.total_frames {
            // Restart just past the highest used frame inside the window.
            if let Some(used) = (start..start + length).rev().find(|&f| self.is_used(f)) {
                start = used + 1;
                continue;
            }
            let frame = FrameNumber::new(start);
            self.fill(frame, length, true)?;
            trace!("allocated frames {frame}..+{length}");
            return Ok(frame.base());
        }
        Err(FrameAllocError::OutOfFrames(length))
    }

    /// Release `[frame, frame + length)`.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfRange`] if the run does not fit.
    pub fn free(&mut self, frame: FrameNumber, length: u64) -> Result<(), FrameAllocError> {
        self.clear(frame, length)?;
        trace!("freed frames {frame}..+{length}");
        Ok(())
    }

    /// Mark the run the boot loader occupies (see [`BootContract::reserved_frames`]) used.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfRange`] if physical memory is smaller than the reserved run.
    pub fn reserve_boot_region(
        &mut self,
        contract: &BootContract,
        info: &BootInfo,
    ) -> Result<(), FrameAllocError> {
        self.set(FrameNumber::new(0), contract.reserved_frames(info))
    }

    /// Number of frames currently marked used.
    #[must_use]
    pub fn used_frames(&self) -> u64 {
        (0..self.total_frames).filter(|&f| self.is_used(f)).count() as u64
    }

    #[must_use]
    pub fn free_frames(&self) -> u64 {
        self.total_frames - self.used_frames()
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn is_used(&self, frame: u64) -> bool {
        self.bitmap[(frame / 8) as usize] & bit(frame) != 0
    }

    #[allow(clippy::cast_possible_truncation)]
    fn fill(&mut self, frame: FrameNumber, length: u64, used: bool) -> Result<(), FrameAllocError> {
        let mut f = frame.as_u64();
        if f.checked_add(length).is_none_or(|end| end > self.total_frames) {
            return Err(FrameAllocError::OutOfRange { frame, length });
        }

        let mut left = length;
        while left > 0 {
            let byte = &mut self.bitmap[(f / 8) as usize];
            if f.is_multiple_of(8) && left >= 8 {
                *byte = if used { 0xFF } else { 0x00 };
                f += 8;
                left -= 8;
            } else {
                if used {
                    *byte |= bit(f);
                } else {
                    *byte &= !bit(f);
                }
                f += 1;
                left -= 1;
            }
        }
        Ok(())
    }
}

/// Mask for `frame` within its bitmap byte, MSB first.
#[inline]
const fn bit(frame: u64) -> u8 {
    0x80 >> (frame % 8)
}

impl FrameAlloc for BitmapFrameAlloc<'_> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.alloc(1).ok().map(|pa| pa.page::<Size4K>())
    }

    /// Freeing a frame this allocator never managed is a caller bug.
    fn free_4k(&mut self, page: PhysicalPage<Size4K>) {
        let result = self.free(page.frame(), 1);
        if let Err(e) = result {
            error!("free of {page} failed: {e}");
        }
        debug_assert!(result.is_ok(), "freed {page} outside physical memory");
    }
}
