//! # Platform collaborators
//!
//! The bootstrap core drives, but does not implement, the scheduler, the page
//! table code, the interrupt controller driver and the system call table.
//! [`Platform`] bundles the concrete types a port provides for each of them.

use kernel_alloc::PhysMemory;
use kernel_info::{MappedRange, MemoryAccess, MemoryMap};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};

/// The set of collaborator types a [`Kernel`](crate::Kernel) is built from.
pub trait Platform {
    type ProcessManager: ProcessManager;
    type IntController: IntController;
    type Timer;
    /// System call dispatch table.
    type Api;
    type PhysMemory: PhysMemory;
}

/// Process type of a platform.
pub type ProcessOf<P> = <<P as Platform>::ProcessManager as ProcessManager>::Process;

/// Address space type of a platform's processes.
pub type MemoryContextOf<P> = <ProcessOf<P> as Process>::MemoryContext;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("virtual address {0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    #[error("virtual address {0} cannot be mapped")]
    InvalidAddress(VirtualAddress),
    #[error("out of page table memory")]
    OutOfMemory,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum NotifyError {
    #[error("IRQ {0} is not known to the process manager")]
    UnknownIrq(u32),
    #[error("interrupt notification table is corrupt")]
    Corrupt,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum IpiError {
    #[error("core {0} does not exist")]
    InvalidCore(u32),
    #[error("interrupt controller rejected the request")]
    Rejected,
}

/// Owner of all processes and the scheduler.
pub trait ProcessManager {
    type Process: Process;

    /// Create a process starting at `entry` with the address space layout of
    /// `map`. `boot` marks programs from the boot image.
    fn create(
        &mut self,
        entry: VirtualAddress,
        map: &MemoryMap,
        boot: bool,
        privileged: bool,
    ) -> Option<&mut Self::Process>;

    /// The currently scheduled process.
    fn current(&mut self) -> Option<&mut Self::Process>;

    /// Wake processes waiting on `irq`.
    ///
    /// # Errors
    /// Any [`NotifyError`]; the kernel treats it as fatal.
    fn interrupt_notify(&mut self, irq: u32) -> Result<(), NotifyError>;

    /// Start scheduling. Returns only if the scheduler could not start.
    fn schedule(&mut self);
}

pub trait Process {
    type MemoryContext: MemoryContext;

    fn memory_context(&mut self) -> &mut Self::MemoryContext;
}

/// A process address space.
pub trait MemoryContext {
    /// Map the page at `va` to the frame at `pa`.
    ///
    /// # Errors
    /// Any [`MapError`].
    fn map(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        access: MemoryAccess,
    ) -> Result<(), MapError>;

    /// Map a whole range page by page.
    ///
    /// # Errors
    /// The first [`MapError`]; pages before it stay mapped.
    fn map_range(&mut self, range: &MappedRange) -> Result<(), MapError> {
        let mut offset = 0;
        while offset < range.size {
            self.map(range.virt + offset, range.phys + offset, range.access)?;
            offset += PAGE_SIZE;
        }
        Ok(())
    }
}

/// Interrupt controller driver (PIC, APIC, GIC, ...).
pub trait IntController {
    fn enable(&mut self, irq: u32);

    fn disable(&mut self, irq: u32);

    /// Send an inter-processor interrupt.
    ///
    /// # Errors
    /// Any [`IpiError`].
    fn send(&mut self, core: u32, irq: u32) -> Result<(), IpiError>;

    /// First vector used for hardware IRQs after remapping.
    fn base(&self) -> u32;
}
