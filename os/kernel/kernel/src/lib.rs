//! # Kernel Bootstrap Core
//!
//! Brings a core from "memory described, nothing allocated" to "scheduler
//! running":
//!
//! 1. [`Kernel::new`] builds the region allocator over the physical memory in
//!    [`CoreInfo`](kernel_info::CoreInfo) and reserves the low 4 MiB, the
//!    kernel image, the boot image, the heap and the inter-core channel.
//! 2. [`Kernel::install_heap`] turns the heap range into the default
//!    allocator.
//! 3. [`Kernel::run`] logs the banner, creates a process for every program in
//!    the boot image and hands over to the scheduler.
//!
//! Interrupts enter through [`Kernel::execute_int_vector`], which masks the
//! vector, runs the hooks registered with [`Kernel::hook_int_vector`] and
//! forwards the IRQ to the process manager.
//!
//! The scheduler, page tables, interrupt controller and system call table
//! are supplied by the port through [`Platform`].
//!
//! ## Logging
//!
//! Everything goes through the `log` facade. Unrecoverable conditions are
//! logged at error level with target `fatal` before being returned as
//! [`FatalError`] or [`ProcessError`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

/// Log an unrecoverable condition.
macro_rules! fatal {
    ($($arg:tt)+) => {
        ::log::error!(target: "fatal", $($arg)+)
    };
}

mod boot;
mod error;
pub mod interrupts;
mod kernel;
pub mod platform;

pub use boot::LoadedProgram;
pub use error::{FatalError, KernelError, ProcessError, ProgramName, Severity};
pub use interrupts::{CpuState, InterruptHandler, InterruptHook, InterruptVectorTable};
pub use kernel::{BANNER, Kernel, KernelParts};
pub use platform::{IntController, MemoryContext, Platform, Process, ProcessManager};
