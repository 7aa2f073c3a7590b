//! # Kernel Orchestrator
//!
//! [`Kernel`] owns the region allocator, the interrupt vector table and the
//! platform collaborators. It is constructed once per core and then driven
//! through [`Kernel::run`], which loads the boot image and enters the
//! scheduler.

use crate::error::{FatalError, KernelError, Severity};
use crate::interrupts::{CpuState, InterruptHandler, InterruptVectorTable};
use crate::platform::{IntController, MemoryContextOf, Platform, Process, ProcessManager};
use kernel_alloc::{HeapArena, RegionAllocator};
use kernel_info::memory::LOW_MEMORY_RESERVED;
use kernel_info::{CoreInfo, MemoryMap, MemoryRegion};
use kernel_memory_addresses::{PhysicalRange, VirtualAddress};
use log::{debug, error, info};

/// Startup banner, logged with target `banner`.
pub const BANNER: &str = concat!("microkernel ", env!("CARGO_PKG_VERSION"));

/// Collaborators handed to [`Kernel::new`].
pub struct KernelParts<P: Platform> {
    pub process_manager: P::ProcessManager,
    pub api: P::Api,
    pub phys_memory: P::PhysMemory,
    pub memory_map: MemoryMap,
}

pub struct Kernel<P: Platform> {
    pub(crate) allocator: RegionAllocator,
    pub(crate) procs: P::ProcessManager,
    api: P::Api,
    pub(crate) phys: P::PhysMemory,
    pub(crate) memory_map: MemoryMap,
    pub(crate) core_info: CoreInfo,
    int_controller: Option<P::IntController>,
    timer: Option<P::Timer>,
    interrupts: InterruptVectorTable,
}

impl<P: Platform> Kernel<P> {
    /// Set up the region allocator over `core_info.memory` and reserve the
    /// low memory, the kernel image, the boot image, the heap and the core
    /// channel.
    ///
    /// `bitmap` must hold at least
    /// [`RegionAllocator::bitmap_words`]`(core_info.memory.size)` words.
    ///
    /// # Errors
    /// A [`FatalError`] if the allocator cannot be built or a reservation
    /// fails; the caller must halt the core.
    pub fn new(
        core_info: CoreInfo,
        parts: KernelParts<P>,
        bitmap: &'static mut [u64],
    ) -> Result<Self, FatalError> {
        let window = parts.memory_map.range(MemoryRegion::KernelData);
        let mut allocator = RegionAllocator::new(core_info.memory, window, bitmap).map_err(|e| {
            fatal!("failed to set up region allocator: {e}");
            FatalError::RegionSetup(e)
        })?;

        let low = PhysicalRange::new(
            core_info.memory.base,
            LOW_MEMORY_RESERVED.min(core_info.memory.size),
        );
        let reservations = [("low memory", low)]
            .into_iter()
            .chain(core_info.reserved_regions());
        for (region, range) in reservations {
            allocator.reserve(range).map_err(|source| {
                fatal!("failed to reserve {region} {range:?}: {source}");
                FatalError::Reservation { region, source }
            })?;
            debug!("reserved {region}: {range:?}");
        }

        info!(
            "memory: {} KiB total, {} KiB available",
            allocator.size() / 1024,
            allocator.available() / 1024
        );

        Ok(Self {
            allocator,
            procs: parts.process_manager,
            api: parts.api,
            phys: parts.phys_memory,
            memory_map: parts.memory_map,
            core_info,
            int_controller: None,
            timer: None,
            interrupts: InterruptVectorTable::new(),
        })
    }

    /// Build the kernel heap over `core_info.heap` and install it as the
    /// default allocator.
    ///
    /// # Safety
    /// The heap range must be mapped writable in the kernel data window and
    /// must not be accessed by anything else afterwards.
    ///
    /// # Errors
    /// [`FatalError::HeapUnmapped`] or [`FatalError::Heap`].
    pub unsafe fn install_heap(&self) -> Result<(), FatalError> {
        let heap = self.core_info.heap;
        let base = self.kernel_view(heap);
        let size = usize::try_from(heap.size).ok();
        let (Some(base), Some(size)) = (base, size) else {
            fatal!("heap {heap:?} is outside the kernel data window");
            return Err(FatalError::HeapUnmapped(heap));
        };

        // SAFETY: upheld by the caller.
        let arena = unsafe { HeapArena::from_raw(base, size) };
        kernel_alloc::install_heap(arena).map_err(|e| {
            fatal!("failed to install heap: {e}");
            FatalError::Heap(e)
        })
    }

    /// Kernel virtual address of `range.base`, if the whole range is visible.
    fn kernel_view(&self, range: PhysicalRange) -> Option<VirtualAddress> {
        let last = range.base.checked_add(range.size.checked_sub(1)?)?;
        self.allocator.to_virtual(last)?;
        self.allocator.to_virtual(range.base)
    }

    #[must_use]
    pub const fn allocator(&self) -> &RegionAllocator {
        &self.allocator
    }

    pub const fn allocator_mut(&mut self) -> &mut RegionAllocator {
        &mut self.allocator
    }

    pub const fn process_manager(&mut self) -> &mut P::ProcessManager {
        &mut self.procs
    }

    /// System call dispatch table.
    pub const fn api(&mut self) -> &mut P::Api {
        &mut self.api
    }

    /// Address space of the currently scheduled process.
    pub fn memory_context(&mut self) -> Option<&mut MemoryContextOf<P>> {
        self.procs.current().map(Process::memory_context)
    }

    #[must_use]
    pub const fn core_info(&self) -> &CoreInfo {
        &self.core_info
    }

    #[must_use]
    pub const fn memory_map(&self) -> &MemoryMap {
        &self.memory_map
    }

    pub const fn phys_memory(&mut self) -> &mut P::PhysMemory {
        &mut self.phys
    }

    #[must_use]
    pub const fn timer(&self) -> Option<&P::Timer> {
        self.timer.as_ref()
    }

    #[must_use]
    pub const fn interrupts(&self) -> &InterruptVectorTable {
        &self.interrupts
    }

    pub fn set_int_controller(&mut self, controller: P::IntController) {
        self.int_controller = Some(controller);
    }

    pub fn set_timer(&mut self, timer: P::Timer) {
        self.timer = Some(timer);
    }

    /// Enable or disable `irq` at the interrupt controller, if one is attached.
    pub fn enable_irq(&mut self, irq: u32, enabled: bool) {
        if let Some(controller) = self.int_controller.as_mut() {
            if enabled {
                controller.enable(irq);
            } else {
                controller.disable(irq);
            }
        }
    }

    /// Send `irq` to another core.
    ///
    /// Succeeds without doing anything if no interrupt controller is attached.
    ///
    /// # Errors
    /// [`KernelError::IoError`] if the controller rejects the request.
    pub fn send_irq(&mut self, core: u32, irq: u32) -> Result<(), KernelError> {
        let Some(controller) = self.int_controller.as_mut() else {
            return Ok(());
        };
        controller.send(core, irq).map_err(|source| {
            error!("failed to send IRQ {irq} to core {core}: {source}");
            KernelError::IoError { core, source }
        })
    }

    /// Register `handler` with `param` on `vector`.
    ///
    /// Registering the same pair twice is a no-op.
    ///
    /// # Errors
    /// [`FatalError::InterruptHook`] if the vector does not exist or the hook
    /// table is full.
    pub fn hook_int_vector(
        &mut self,
        vector: u32,
        handler: InterruptHandler,
        param: usize,
    ) -> Result<(), KernelError> {
        match self.interrupts.hook(vector, handler, param) {
            Ok(true) => {
                debug!("hooked interrupt vector {vector}");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                fatal!("failed to hook interrupt vector {vector}: {e}");
                Err(FatalError::InterruptHook(e).into())
            }
        }
    }

    /// Interrupt entry point.
    ///
    /// Masks `vector` at the controller, runs its hooks in registration order,
    /// and notifies the process manager of IRQ `vector - base`. The vector
    /// stays masked until someone re-enables it. Vectors below the controller
    /// base are exceptions and are not forwarded.
    ///
    /// # Errors
    /// [`FatalError::InterruptNotify`] if the process manager fails.
    pub fn execute_int_vector(
        &mut self,
        vector: u32,
        state: &mut CpuState,
    ) -> Result<(), KernelError> {
        self.enable_irq(vector, false);
        self.interrupts.dispatch(vector, state);

        let base = self.int_controller.as_ref().map_or(0, IntController::base);
        let Some(irq) = vector.checked_sub(base) else {
            return Ok(());
        };

        self.procs.interrupt_notify(irq).map_err(|source| {
            fatal!("notifying interrupt of vector {vector} failed: {source}");
            KernelError::Fatal(FatalError::InterruptNotify { vector, source })
        })
    }

    /// Log the banner, load the boot image and start the scheduler.
    ///
    /// Only returns if loading a program failed fatally or the scheduler
    /// returned.
    pub fn run(&mut self) -> KernelError {
        info!(target: "banner", "{BANNER}");

        match self.load_boot_image() {
            Ok(loaded) => info!("bootimage: {loaded} program(s) loaded"),
            Err(e) if e.severity() == Severity::Fatal => return e,
            Err(e) => error!("bootimage: {e}"),
        }

        self.procs.schedule();

        fatal!("scheduler returned");
        FatalError::SchedulerReturned.into()
    }
}
