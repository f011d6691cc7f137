//! # Kernel Memory Allocation and Virtual Memory Management
//!
//! Physical frame allocation, page-table management and per-process address
//! spaces for an x86-64 kernel with 4-level paging.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │             Virtual Memory Manager (vmm)            │
//! │    • map / unmap / translate                        │
//! │    • region search, alloc / free, mmap / munmap     │
//! │    • address-space create / destroy, sharing        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │            Physical Mapper (phys_mapper)            │
//! │    • physical address → pointer via the HHDM        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Physical Frame Allocator (frame_alloc)       │
//! │    • one bit per 4 KiB frame, MSB first             │
//! │    • first-fit runs, no heap                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The page-table walker itself lives in `kernel-vmem`; this crate adds the
//! allocator and the policy on top. [`boot`] wires everything to the state the
//! boot loader hands over, and [`fatal`] turns unrecoverable errors into a halt.
//!
//! ## Features
//!
//! * `qemu`: send the halt banner to the QEMU debug console.
//!
//! ## Testing
//!
//! Everything above the MMU is generic over `PhysMapper`, `Mmu` and
//! `FrameAlloc`, so the test suites run against `kernel_vmem::sim` on the host.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod boot;
pub mod fatal;
pub mod frame_alloc;
pub mod phys_mapper;
pub mod vmm;
