//! # Kernel Boot Information

use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};

/// The record the boot loader leaves behind for the kernel.
///
/// # ABI
/// Written by the boot loader at [`BootContract::boot_info`]; keep this
/// `#[repr(C)]` with fixed-size fields.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BootInfo {
    /// Detected physical memory in bytes.
    pub total_memory: u64,
}

impl BootInfo {
    /// Number of 4 KiB frames needed to cover all of physical memory (rounded up).
    #[must_use]
    pub const fn total_frames(&self) -> u64 {
        self.total_memory.div_ceil(Size4K::SIZE)
    }

    /// Size of the frame bitmap in bytes, one bit per frame.
    #[must_use]
    pub const fn bitmap_len(&self) -> u64 {
        self.total_frames().div_ceil(8)
    }
}

/// Fixed physical locations agreed on between the boot loader and the kernel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootContract {
    /// Where the [`BootInfo`] record lives.
    pub boot_info: PhysicalAddress,
    /// Where the frame bitmap starts.
    pub frame_bitmap: PhysicalAddress,
}

impl BootContract {
    /// The addresses used by the boot loader.
    pub const DEFAULT: Self = Self {
        boot_info: PhysicalAddress::new(0x7000),
        frame_bitmap: PhysicalAddress::new(0x10_0000),
    };

    #[must_use]
    pub const fn new(boot_info: PhysicalAddress, frame_bitmap: PhysicalAddress) -> Self {
        Self {
            boot_info,
            frame_bitmap,
        }
    }

    /// The frames `[0, n)` the boot loader marks used before handing over:
    /// low memory, boot structures, and the bitmap itself.
    ///
    /// Returns the length `n` of that run.
    #[must_use]
    pub const fn reserved_frames(&self, info: &BootInfo) -> u64 {
        (self.frame_bitmap.as_u64() + info.bitmap_len()).div_ceil(Size4K::SIZE)
    }
}

impl Default for BootContract {
    fn default() -> Self {
        Self::DEFAULT
    }
}
