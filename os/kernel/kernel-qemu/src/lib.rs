//! # QEMU Debug Console Output
//!
//! Early, allocation-free diagnostics for kernels running under QEMU. Bytes
//! written to I/O port `0x402` show up on the host when QEMU is started with
//! `-debugcon stdio` (or `-debugcon file:debug.log`).
//!
//! * [`QemuLogger`] routes the `log` facade to the debug port.
//! * [`qemu_trace!`] writes `format_args!`-style text directly, bypassing `log`.
//!   The memory manager's halt handler uses it for the final panic banner.
//!
//! ## Features
//!
//! With the `enabled` feature (default) every write goes to the port. Without
//! it, all writes compile to no-ops, so hosted test builds never touch I/O ports.
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);
//!
//! LOGGER.init().expect("logger initialization");
//! info!("memory manager online");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

#[cfg(all(feature = "enabled", target_arch = "x86_64"))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// The port number for QEMU's debug port.
    const QEMU_DEBUG_PORT: u16 = 0x402;

    /// Write a single byte to QEMU's debug port.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") QEMU_DEBUG_PORT,
                in("al") c,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            s.bytes().for_each(dbg_putc);
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort output.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[cfg(not(all(feature = "enabled", target_arch = "x86_64")))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[doc(hidden)]
    #[inline]
    pub const fn qemu_write(_: fmt::Arguments) {}
}

/// Write formatted text to the QEMU debug console.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
