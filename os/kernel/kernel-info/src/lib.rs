//! # Kernel Configuration and Boot Interface
//!
//! Layout constants and boot hand-off contracts shared between the boot
//! loader, the kernel memory manager, and its tests.
//!
//! ## Boot Information ([`boot`])
//!
//! The boot loader leaves two structures at fixed physical addresses before
//! jumping into the kernel:
//!
//! * a [`BootInfo`](boot::BootInfo) record at `0x7000` holding the detected
//!   amount of RAM, and
//! * the physical frame bitmap at `0x10_0000`, one bit per 4 KiB frame,
//!   most-significant bit first.
//!
//! Rather than hard-coding those addresses at every use site, they are
//! bundled in a [`BootContract`](boot::BootContract) value created once and
//! handed to the initialization code.
//!
//! ## Memory Layout ([`memory`])
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │  null page (never mapped)       │
//! USER_BASE             ├─────────────────────────────────┤ 0x0000_0000_0000_1000
//!                       │  User namespace                 │
//!                       │  (private per address space)    │
//! USER_END              ├─────────────────────────────────┤ 0x0000_8000_0000_0000
//!                       │  non-canonical hole / unused    │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xFFFF_FF80_0000_0000
//!                       │  Kernel namespace               │
//!                       │  (PML4 slot 511, shared)        │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xFFFF_FFC0_0000_0000
//!                       │  Direct map of physical memory  │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! Both the kernel namespace and the direct map live under the single
//! top-level entry [`KERNEL_PML4_SLOT`](memory::KERNEL_PML4_SLOT), which is
//! copied verbatim into every address space.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
