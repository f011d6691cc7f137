//! # Fatal Errors
//!
//! Memory manager operations return [`Result`]s. Call sites that cannot
//! recover (early boot, or a syscall path with no error channel) turn an error
//! into a halt through a [`FatalHandler`]:
//!
//! ```ignore
//! let user = vmm.create().or_fatal(&HaltMachine);
//! ```

use core::fmt::Display;
use kernel_qemu::qemu_trace;
use log::error;

/// What happens when the kernel cannot continue.
pub trait FatalHandler {
    fn fatal(&self, error: &dyn Display) -> !;
}

/// Logs the error, prints the panic banner to the debug console and stops the CPU.
#[derive(Copy, Clone, Debug, Default)]
pub struct HaltMachine;

impl FatalHandler for HaltMachine {
    fn fatal(&self, error: &dyn Display) -> ! {
        error!("{error}");
        qemu_trace!("KERNEL PANIC: {error}\nSystem halted.\n");
        halt()
    }
}

/// Panics with the error message. For hosted tests.
#[derive(Copy, Clone, Debug, Default)]
pub struct PanicOnFatal;

impl FatalHandler for PanicOnFatal {
    fn fatal(&self, error: &dyn Display) -> ! {
        panic!("KERNEL PANIC: {error}")
    }
}

/// Unwrap a result or hand the error to a [`FatalHandler`].
pub trait OrFatal<T> {
    fn or_fatal<H: FatalHandler + ?Sized>(self, handler: &H) -> T;
}

impl<T, E: Display> OrFatal<T> for Result<T, E> {
    #[inline]
    fn or_fatal<H: FatalHandler + ?Sized>(self, handler: &H) -> T {
        match self {
            Ok(value) => value,
            Err(e) => handler.fatal(&e),
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn halt() -> ! {
    loop {
        // SAFETY: masking interrupts and halting has no memory effects.
        unsafe {
            core::arch::asm!("cli", "hlt", options(nomem, nostack));
        }
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vmm::VmmError;

    #[test]
    fn ok_passes_through() {
        let r: Result<u32, VmmError> = Ok(7);
        assert_eq!(r.or_fatal(&PanicOnFatal), 7);
    }

    #[test]
    #[should_panic(expected = "KERNEL PANIC: out of physical memory")]
    fn errors_reach_the_handler() {
        let r: Result<u32, VmmError> = Err(VmmError::OutOfFrames);
        r.or_fatal(&PanicOnFatal);
    }

    #[test]
    #[should_panic(expected = "KERNEL PANIC: no free virtual range of 3 pages")]
    fn dyn_handlers_work() {
        let handler: &dyn FatalHandler = &PanicOnFatal;
        let r: Result<(), VmmError> = Err(VmmError::OutOfVirtualSpace(3));
        r.or_fatal(handler);
    }
}
