use kernel_memory_addresses::VirtualAddress;

/// Drop the TLB entry caching the translation of `va`.
///
/// # Safety
/// Privileged instruction; must run in Ring 0.
#[inline]
pub unsafe fn invlpg(va: VirtualAddress) {
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u64(), options(nostack, preserves_flags));
    }
}
