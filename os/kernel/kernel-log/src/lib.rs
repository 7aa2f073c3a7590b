//! # Kernel Logging
//!
//! A `log::Log` implementation for environments without an allocator or a
//! console driver. Records are formatted straight into a [`LogSink`], one line
//! per record:
//!
//! ```text
//! [INFO] kernel::boot: loaded: init
//! ```
//!
//! Records with the target [`BANNER_TARGET`] are written verbatim, without the
//! level/target prefix; the kernel uses this for its startup banner.
//!
//! ## Sinks
//!
//! * [`QemuDebugPort`] (feature `qemu`, x86-64): QEMU's `-debugcon` port `0x402`.
//! * [`BufferSink`]: a fixed-capacity in-memory buffer, handy for early boot
//!   capture and host tests.
//!
//! ## Setup
//!
//! The logger lives in a `static`, so installing it needs no allocation:
//!
//! ```rust
//! use kernel_log::{BufferSink, KernelLogger};
//! use log::LevelFilter;
//!
//! static LOGGER: KernelLogger<BufferSink<1024>> =
//!     KernelLogger::new(BufferSink::new(), LevelFilter::Info);
//!
//! LOGGER.install().expect("logger already installed");
//! log::info!(target: "banner", "hello");
//! assert_eq!(LOGGER.with_sink(|s| s.as_str().to_owned()), "hello\n");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod buffer;
mod logger;
#[cfg(all(feature = "qemu", target_arch = "x86_64"))]
mod qemu;

pub use buffer::BufferSink;
pub use logger::KernelLogger;
#[cfg(all(feature = "qemu", target_arch = "x86_64"))]
pub use qemu::QemuDebugPort;

/// Log target whose records are emitted without decoration.
pub const BANNER_TARGET: &str = "banner";

/// Byte-oriented output device behind a [`KernelLogger`].
///
/// Output is best effort: a sink may drop what it cannot store.
pub trait LogSink: core::fmt::Write + Send {}

impl<T: core::fmt::Write + Send> LogSink for T {}
