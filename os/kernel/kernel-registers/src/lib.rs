//! # Typed `x86_64` Registers
//!
//! Only what the memory manager touches: [`cr3::Cr3`] for the active page-map
//! root, and [`tlb::invlpg`] for single-entry TLB shootdown.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
pub mod tlb;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}
