//! In-memory platform for the kernel integration tests.
//!
//! Physical memory is a leaked host buffer; the kernel data window of the
//! memory map points straight at it, so `to_virtual` yields host addresses.

#![allow(dead_code)]

use std::cell::RefCell;

use kernel::platform::{IpiError, MapError, NotifyError};
use kernel::{
    IntController, Kernel, KernelParts, MemoryContext, Platform, Process, ProcessManager,
};
use kernel_alloc::{DirectMap, PhysMemory, RegionAllocator};
use kernel_info::{CoreInfo, MemoryAccess, MemoryMap};
use kernel_memory_addresses::{
    PAGE_SIZE, PhysicalAddress, PhysicalRange, VirtualAddress, VirtualRange,
};

pub const MIB: u64 = 1024 * 1024;
pub const MEMORY_SIZE: u64 = 16 * MIB;
pub const KERNEL_BASE: u64 = MIB;
pub const BOOT_IMAGE_BASE: u64 = 4 * MIB;
pub const HEAP_BASE: u64 = 6 * MIB;
pub const HEAP_SIZE: u64 = MIB;
pub const CHANNEL_BASE: u64 = 7 * MIB;

/// Something observable that happened during a test, in order.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Event {
    Enable(u32),
    Disable(u32),
    Hook { vector: u32, param: usize },
    Notify(u32),
}

thread_local! {
    static EVENTS: RefCell<Vec<Event>> = const { RefCell::new(Vec::new()) };
}

pub fn record(event: Event) {
    EVENTS.with_borrow_mut(|events| events.push(event));
}

pub fn take_events() -> Vec<Event> {
    EVENTS.with_borrow_mut(std::mem::take)
}

#[derive(Debug, Default)]
pub struct RecordingContext {
    pub mappings: Vec<(VirtualAddress, PhysicalAddress, MemoryAccess)>,
    pub fail_at: Option<VirtualAddress>,
}

impl RecordingContext {
    pub fn mapping(&self, va: u64) -> Option<(PhysicalAddress, MemoryAccess)> {
        self.mappings
            .iter()
            .find(|(v, _, _)| v.as_u64() == va)
            .map(|&(_, pa, access)| (pa, access))
    }
}

impl MemoryContext for RecordingContext {
    fn map(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        access: MemoryAccess,
    ) -> Result<(), MapError> {
        if self.fail_at == Some(va) {
            return Err(MapError::AlreadyMapped(va));
        }
        self.mappings.push((va, pa, access));
        Ok(())
    }
}

#[derive(Debug)]
pub struct TestProcess {
    pub entry: VirtualAddress,
    pub boot: bool,
    pub privileged: bool,
    pub memory: RecordingContext,
}

impl Process for TestProcess {
    type MemoryContext = RecordingContext;

    fn memory_context(&mut self) -> &mut RecordingContext {
        &mut self.memory
    }
}

#[derive(Debug, Default)]
pub struct RecordingProcessManager {
    pub processes: Vec<TestProcess>,
    pub fail_create: bool,
    /// Installed into every created process.
    pub fail_map_at: Option<VirtualAddress>,
    pub notify_error: Option<NotifyError>,
    pub schedule_calls: usize,
}

impl ProcessManager for RecordingProcessManager {
    type Process = TestProcess;

    fn create(
        &mut self,
        entry: VirtualAddress,
        _map: &MemoryMap,
        boot: bool,
        privileged: bool,
    ) -> Option<&mut TestProcess> {
        if self.fail_create {
            return None;
        }
        self.processes.push(TestProcess {
            entry,
            boot,
            privileged,
            memory: RecordingContext {
                fail_at: self.fail_map_at,
                ..RecordingContext::default()
            },
        });
        self.processes.last_mut()
    }

    fn current(&mut self) -> Option<&mut TestProcess> {
        self.processes.last_mut()
    }

    fn interrupt_notify(&mut self, irq: u32) -> Result<(), NotifyError> {
        record(Event::Notify(irq));
        self.notify_error.map_or(Ok(()), Err)
    }

    fn schedule(&mut self) {
        self.schedule_calls += 1;
    }
}

#[derive(Debug, Default)]
pub struct RecordingController {
    pub base: u32,
    pub send_error: Option<IpiError>,
    pub sent: Vec<(u32, u32)>,
}

impl IntController for RecordingController {
    fn enable(&mut self, irq: u32) {
        record(Event::Enable(irq));
    }

    fn disable(&mut self, irq: u32) {
        record(Event::Disable(irq));
    }

    fn send(&mut self, core: u32, irq: u32) -> Result<(), IpiError> {
        self.sent.push((core, irq));
        self.send_error.map_or(Ok(()), Err)
    }

    fn base(&self) -> u32 {
        self.base
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct TestTimer {
    pub hz: u32,
}

/// Stand-in system call table; counts the calls routed through it.
#[derive(Debug, Default)]
pub struct TestApi {
    pub calls: usize,
}

pub struct TestPlatform;

impl Platform for TestPlatform {
    type ProcessManager = RecordingProcessManager;
    type IntController = RecordingController;
    type Timer = TestTimer;
    type Api = TestApi;
    type PhysMemory = DirectMap;
}

pub type TestKernel = Kernel<TestPlatform>;

/// Fresh zeroed physical memory with `image` placed at [`BOOT_IMAGE_BASE`].
pub fn machine(image: &[u8]) -> (DirectMap, MemoryMap) {
    let size = usize::try_from(MEMORY_SIZE).unwrap();
    let buffer: &'static mut [u8] = Box::leak(vec![0u8; size].into_boxed_slice());
    let window = VirtualAddress::new(buffer.as_mut_ptr() as u64);

    // SAFETY: the leaked buffer backs the whole range for the rest of the test.
    let mut phys = unsafe {
        DirectMap::new(
            PhysicalRange::new(PhysicalAddress::new(0), MEMORY_SIZE),
            window,
        )
    };
    phys.bytes_mut(PhysicalAddress::new(BOOT_IMAGE_BASE), image.len())
        .unwrap()
        .copy_from_slice(image);

    let memory_map = MemoryMap::with_kernel_data(VirtualRange::new(window, MEMORY_SIZE));
    (phys, memory_map)
}

pub fn core_info(image_len: usize) -> CoreInfo {
    let image_size = (image_len as u64).div_ceil(PAGE_SIZE).max(1) * PAGE_SIZE;
    CoreInfo {
        core_id: 0,
        memory: PhysicalRange::new(PhysicalAddress::new(0), MEMORY_SIZE),
        kernel: PhysicalRange::new(PhysicalAddress::new(KERNEL_BASE), MIB),
        boot_image: PhysicalRange::new(PhysicalAddress::new(BOOT_IMAGE_BASE), image_size),
        heap: PhysicalRange::new(PhysicalAddress::new(HEAP_BASE), HEAP_SIZE),
        core_channel: PhysicalRange::new(PhysicalAddress::new(CHANNEL_BASE), 2 * PAGE_SIZE),
    }
}

pub fn bitmap() -> &'static mut [u64] {
    let words = RegionAllocator::bitmap_words(MEMORY_SIZE);
    Box::leak(vec![0u64; words].into_boxed_slice())
}

pub fn try_test_kernel(
    info: CoreInfo,
    image: &[u8],
    process_manager: RecordingProcessManager,
) -> Result<TestKernel, kernel::FatalError> {
    let (phys_memory, memory_map) = machine(image);
    let parts = KernelParts {
        process_manager,
        api: TestApi::default(),
        phys_memory,
        memory_map,
    };
    Kernel::new(info, parts, bitmap())
}

pub fn test_kernel_with(image: &[u8], process_manager: RecordingProcessManager) -> TestKernel {
    try_test_kernel(core_info(image.len()), image, process_manager)
        .expect("kernel construction failed")
}

pub fn test_kernel(image: &[u8]) -> TestKernel {
    test_kernel_with(image, RecordingProcessManager::default())
}
