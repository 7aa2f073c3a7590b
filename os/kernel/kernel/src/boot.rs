//! # Boot Image Loader
//!
//! Walks the boot image reserved in [`CoreInfo::boot_image`] and turns each
//! program symbol into a process: its segments are mapped straight from the
//! image, and a fresh arguments page carrying the program name is mapped at
//! the user arguments region.
//!
//! [`CoreInfo::boot_image`]: kernel_info::CoreInfo::boot_image

use crate::error::{KernelError, ProcessError, ProgramName};
use crate::kernel::Kernel;
use crate::platform::{MemoryContext, Platform, Process, ProcessManager};
use bootimage_abi::{BOOTIMAGE_NAMELEN, BootImage, BootImageError};
use kernel_alloc::PhysMemory;
use kernel_info::{MappedRange, MemoryAccess, MemoryRegion};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalRange, VirtualAddress};
use log::info;

/// A boot program that was turned into a process.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoadedProgram {
    pub name: ProgramName,
    pub entry: VirtualAddress,
    pub privileged: bool,
    /// Physical memory backing the arguments page.
    pub args: PhysicalRange,
}

fn parse_image<M: PhysMemory>(
    phys: &M,
    range: PhysicalRange,
) -> Result<BootImage<'_>, BootImageError> {
    let len = usize::try_from(range.size).map_err(|_| BootImageError::OutOfBounds)?;
    let blob = phys
        .bytes(range.base, len)
        .ok_or(BootImageError::OutOfBounds)?;
    BootImage::parse(blob)
}

impl<P: Platform> Kernel<P> {
    /// Load every program of the boot image.
    ///
    /// Returns the number of processes created. Non-program symbols are
    /// skipped.
    ///
    /// # Errors
    /// [`KernelError::InvalidBootImage`] if the image is malformed, or the
    /// fatal errors of [`Kernel::load_boot_process`].
    pub fn load_boot_image(&mut self) -> Result<usize, KernelError> {
        let range = self.core_info.boot_image;
        info!("bootimage: {} ({} bytes)", range.base, range.size);

        let count = parse_image(&self.phys, range)?.symbol_count();
        let mut loaded = 0;
        for index in 0..count {
            if self.load_boot_process(range.base, index)?.is_some() {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Create a process for symbol `index` of the image at `image_base`.
    ///
    /// Returns `Ok(None)` if the symbol is not a program.
    ///
    /// # Errors
    /// [`KernelError::InvalidBootImage`] for symbols or segments outside the
    /// image; [`KernelError::ProcessError`] if the process cannot be created,
    /// mapped or given its arguments page.
    pub fn load_boot_process(
        &mut self,
        image_base: PhysicalAddress,
        index: usize,
    ) -> Result<Option<LoadedProgram>, KernelError> {
        let image_range = PhysicalRange::new(image_base, self.core_info.boot_image.size);
        let image = parse_image(&self.phys, image_range)?;
        let symbol = image.symbol(index)?;
        if !symbol.kind.is_program() {
            return Ok(None);
        }

        let name = ProgramName(symbol.name);
        let size = image_range.size;
        let within_image = |offset: u32, len: u32| u64::from(offset) + u64::from(len) <= size;
        let mut segments = image.segments(&symbol)?;
        if !segments.all(|s| within_image(s.offset, s.size)) {
            return Err(BootImageError::OutOfBounds.into());
        }

        let entry = VirtualAddress::new(u64::from(symbol.entry));
        let privileged = symbol.kind.is_privileged();
        let process = self.procs.create(entry, &self.memory_map, true, privileged);
        let Some(process) = process else {
            fatal!("failed to create boot program {name}");
            return Err(ProcessError::Create { name }.into());
        };
        let memory = process.memory_context();

        for segment in image.segments(&symbol)? {
            let mapping = MappedRange {
                virt: VirtualAddress::new(u64::from(segment.virtual_address)),
                phys: image_base + u64::from(segment.offset),
                size: u64::from(segment.size),
                access: MemoryAccess::USER_RWX,
            };
            memory.map_range(&mapping).map_err(|source| {
                fatal!(
                    "failed to map segment of {name} at {}: {source}",
                    mapping.virt
                );
                ProcessError::MapSegment { name, source }
            })?;
        }

        let region = self.memory_map.range(MemoryRegion::UserArgs);
        let args = self.allocator.allocate(region.size, PAGE_SIZE).map_err(|e| {
            fatal!("failed to allocate arguments of {name}: {e}");
            ProcessError::AllocateArgs(e)
        })?;
        memory
            .map_range(&MappedRange {
                virt: region.base,
                phys: args.base,
                size: region.size,
                access: MemoryAccess::USER_RW,
            })
            .map_err(|e| {
                fatal!("failed to map arguments of {name}: {e}");
                ProcessError::MapArgs(e)
            })?;

        let page = usize::try_from(args.size)
            .ok()
            .and_then(|len| self.phys.bytes_mut(args.base, len));
        let Some(page) = page else {
            fatal!("arguments of {name} at {} are not accessible", args.base);
            return Err(ProcessError::ArgsInaccessible.into());
        };
        page.fill(0);
        let len = BOOTIMAGE_NAMELEN.min(page.len());
        page[..len].copy_from_slice(&symbol.name[..len]);

        info!("loaded: {name}");
        Ok(Some(LoadedProgram {
            name,
            entry,
            privileged,
            args,
        }))
    }
}
