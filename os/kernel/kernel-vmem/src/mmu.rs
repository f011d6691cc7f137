use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// The two things the memory manager needs from the paging hardware.
pub trait Mmu {
    /// The page map the CPU is currently translating through.
    fn active_root(&self) -> PhysicalPage<Size4K>;

    /// Drop any cached translation for `va`.
    fn invalidate_page(&self, va: VirtualAddress);
}

/// [`Mmu`] backed by CR3 and `invlpg`.
#[cfg(target_arch = "x86_64")]
pub struct X86Mmu {
    _private: (),
}

#[cfg(target_arch = "x86_64")]
impl X86Mmu {
    /// # Safety
    /// Every method executes privileged instructions; the value must only be
    /// used at CPL 0 with paging enabled.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "x86_64")]
impl Mmu for X86Mmu {
    fn active_root(&self) -> PhysicalPage<Size4K> {
        use kernel_registers::LoadRegisterUnsafe;
        use kernel_registers::cr3::Cr3;

        // SAFETY: constructing `X86Mmu` asserts CPL 0.
        unsafe { Cr3::load_unsafe() }.pml4()
    }

    fn invalidate_page(&self, va: VirtualAddress) {
        // SAFETY: constructing `X86Mmu` asserts CPL 0.
        unsafe { kernel_registers::tlb::invlpg(va) }
    }
}
