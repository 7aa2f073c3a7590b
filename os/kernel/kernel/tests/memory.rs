mod common;

use common::{
    BOOT_IMAGE_BASE, CHANNEL_BASE, HEAP_BASE, KERNEL_BASE, MEMORY_SIZE, MIB,
    RecordingProcessManager, core_info, test_kernel, try_test_kernel,
};
use kernel::FatalError;
use kernel_alloc::{RegionAllocator, RegionError};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalRange};

#[test]
fn bootstrap_regions_are_reserved() {
    let kernel = test_kernel(&[0; 100]);
    let allocator = kernel.allocator();

    let used = |pa| allocator.is_used(PhysicalAddress::new(pa)).unwrap();

    let reserved = [
        0,
        4 * MIB - PAGE_SIZE,
        KERNEL_BASE,
        BOOT_IMAGE_BASE,
        HEAP_BASE,
        CHANNEL_BASE,
    ];
    for pa in reserved {
        assert!(used(pa), "{pa:#x} should be reserved");
    }
    assert!(!used(BOOT_IMAGE_BASE + PAGE_SIZE));
    assert!(!used(MEMORY_SIZE - PAGE_SIZE));
}

#[test]
fn available_memory_excludes_reservations() {
    let kernel = test_kernel(&[0; 100]);
    // 4 MiB low memory (kernel included), 1 image page, 1 MiB heap, 2 channel pages.
    let reserved = 4 * MIB + PAGE_SIZE + MIB + 2 * PAGE_SIZE;
    assert_eq!(kernel.allocator().size(), MEMORY_SIZE);
    assert_eq!(kernel.allocator().available(), MEMORY_SIZE - reserved);
}

#[test]
fn reserved_pages_cannot_be_allocated_again() {
    let mut kernel = test_kernel(&[]);
    let allocator = kernel.allocator_mut();

    let heap_page = PhysicalAddress::new(HEAP_BASE + PAGE_SIZE);
    assert_eq!(
        allocator.allocate_at(heap_page),
        Err(RegionError::AlreadyUsed(heap_page))
    );

    let free = allocator.allocate(PAGE_SIZE, PAGE_SIZE).unwrap();
    let low = PhysicalRange::new(PhysicalAddress::new(0), 4 * MIB);
    assert!(!free.overlaps(&low));
    assert_eq!(
        allocator.allocate_at(free.base),
        Err(RegionError::AlreadyUsed(free.base))
    );
}

#[test]
fn overlapping_regions_are_tolerated() {
    let mut info = core_info(0);
    info.core_channel = PhysicalRange::new(PhysicalAddress::new(HEAP_BASE), 2 * PAGE_SIZE);
    let kernel = try_test_kernel(info, &[], RecordingProcessManager::default());
    assert!(kernel.is_ok());
}

#[test]
fn region_outside_memory_is_fatal() {
    let mut info = core_info(0);
    info.heap = PhysicalRange::new(PhysicalAddress::new(MEMORY_SIZE), MIB);

    let err = try_test_kernel(info, &[], RecordingProcessManager::default())
        .err()
        .unwrap();
    assert_eq!(
        err,
        FatalError::Reservation {
            region: "heap",
            source: RegionError::OutOfRange(PhysicalAddress::new(MEMORY_SIZE))
        }
    );
}

#[test]
fn unaligned_memory_is_fatal() {
    let mut info = core_info(0);
    info.memory = PhysicalRange::new(PhysicalAddress::new(0x10), MEMORY_SIZE);

    let err = try_test_kernel(info, &[], RecordingProcessManager::default())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        FatalError::RegionSetup(RegionError::Unaligned(_))
    ));
}

#[test]
fn translation_through_kernel_window() {
    let kernel = test_kernel(&[]);
    let allocator = kernel.allocator();

    let pa = PhysicalAddress::new(BOOT_IMAGE_BASE);
    let va = allocator.to_virtual(pa).unwrap();
    assert_eq!(va - allocator.kernel_window().base, BOOT_IMAGE_BASE);
    assert_eq!(allocator.to_physical(va), Some(pa));
    let end = PhysicalAddress::new(MEMORY_SIZE);
    assert_eq!(allocator.to_virtual(end), None);
    assert_eq!(
        RegionAllocator::bitmap_words(MEMORY_SIZE),
        usize::try_from(MEMORY_SIZE / PAGE_SIZE / 64).unwrap()
    );
}
