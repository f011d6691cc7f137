#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use crate::LoadRegisterUnsafe;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// CR3: Page-Map Level-4 Base Register (IA-32e, PCID disabled).
///
/// Names the physical frame of the active PML4, i.e. the active page map.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Cr3 {
    // Bits 0–2: reserved.
    #[bits(3)]
    __: u8,

    /// Bit 3: PWT, page-level write-through for PML4 accesses.
    pub pwt: bool,

    /// Bit 4: PCD, page-level cache disable for PML4 accesses.
    pub pcd: bool,

    // Bits 5–11: reserved.
    #[bits(7)]
    __: u8,

    /// Bits 12–51: PML4 frame number.
    #[bits(40)]
    pml4_frame: u64,

    // Bits 52–63: reserved.
    #[bits(12)]
    __: u16,
}

impl Cr3 {
    /// The page holding the PML4.
    #[must_use]
    pub const fn pml4(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(PhysicalAddress::new(self.pml4_frame() << 12))
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pml4_from_raw_value() {
        let page = PhysicalAddress::new(0x0012_3000).page::<Size4K>();
        let cr3 = Cr3::from_bits(0x0012_3000);
        assert!(!cr3.pwt());
        assert!(!cr3.pcd());
        assert_eq!(cr3.pml4(), page);
    }

    #[test]
    fn flags_do_not_leak_into_base() {
        let cr3 = Cr3::from_bits(0x0000_0000_0045_6018);
        assert!(cr3.pwt());
        assert!(cr3.pcd());
        assert_eq!(cr3.pml4().base().as_u64(), 0x45_6000);
    }
}
