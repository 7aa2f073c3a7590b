//! Result codes of the bootstrap core.

use crate::interrupts::HookError;
use crate::platform::{IpiError, MapError, NotifyError};
use bootimage_abi::{BOOTIMAGE_NAMELEN, BootImageError};
use core::fmt;
use kernel_alloc::{HeapError, RegionError};
use kernel_memory_addresses::PhysicalRange;

/// Conditions after which the kernel cannot make progress.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FatalError {
    #[error("failed to reserve {region} memory: {source}")]
    Reservation {
        region: &'static str,
        source: RegionError,
    },
    #[error("failed to set up the region allocator: {0}")]
    RegionSetup(RegionError),
    #[error("heap {0:?} is not reachable through the kernel data window")]
    HeapUnmapped(PhysicalRange),
    #[error("failed to install the kernel heap: {0}")]
    Heap(#[from] HeapError),
    #[error("interrupt notification for vector {vector} failed: {source}")]
    InterruptNotify { vector: u32, source: NotifyError },
    #[error("failed to hook interrupt vector: {0}")]
    InterruptHook(#[from] HookError),
    #[error("scheduler returned")]
    SchedulerReturned,
}

/// Fixed-length program name from the boot image.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct ProgramName(pub [u8; BOOTIMAGE_NAMELEN]);

impl ProgramName {
    /// The name up to the first NUL byte.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        &self.0[..len]
    }
}

impl fmt::Display for ProgramName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.as_bytes().utf8_chunks() {
            f.write_str(chunk.valid())?;
            if !chunk.invalid().is_empty() {
                f.write_str("\u{FFFD}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProgramName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgramName({self})")
    }
}

/// A boot program could not be set up.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to create process for {name}")]
    Create { name: ProgramName },
    #[error("failed to map segment of {name}: {source}")]
    MapSegment { name: ProgramName, source: MapError },
    #[error("failed to allocate arguments page: {0}")]
    AllocateArgs(RegionError),
    #[error("failed to map arguments page: {0}")]
    MapArgs(MapError),
    #[error("arguments page is not reachable through physical memory")]
    ArgsInaccessible,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Severity {
    /// Progress on this path must stop.
    Fatal,
    /// Reported to the caller, which decides whether to continue.
    Recoverable,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("invalid boot image: {0}")]
    InvalidBootImage(#[from] BootImageError),
    #[error("failed to send IPI to core {core}: {source}")]
    IoError { core: u32, source: IpiError },
    #[error(transparent)]
    ProcessError(#[from] ProcessError),
    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),
}

impl KernelError {
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::InvalidBootImage(_) | Self::IoError { .. } => Severity::Recoverable,
            Self::ProcessError(_) | Self::Fatal(_) => Severity::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ProgramName {
        let mut raw = [0u8; BOOTIMAGE_NAMELEN];
        raw[..s.len()].copy_from_slice(s.as_bytes());
        ProgramName(raw)
    }

    #[test]
    fn program_name_stops_at_nul() {
        assert_eq!(name("init").as_bytes(), b"init");
        assert_eq!(name("init").to_string(), "init");
        assert_eq!(ProgramName([b'x'; BOOTIMAGE_NAMELEN]).as_bytes().len(), 32);
    }

    #[test]
    fn program_name_replaces_invalid_utf8() {
        let mut raw = [0u8; BOOTIMAGE_NAMELEN];
        raw[..3].copy_from_slice(&[b'a', 0xff, b'b']);
        assert_eq!(ProgramName(raw).to_string(), "a\u{FFFD}b");
    }

    #[test]
    fn severity_tiers() {
        assert_eq!(
            KernelError::from(BootImageError::TooShort).severity(),
            Severity::Recoverable
        );
        assert_eq!(
            KernelError::IoError {
                core: 1,
                source: IpiError::Rejected
            }
            .severity(),
            Severity::Recoverable
        );
        assert_eq!(
            KernelError::from(ProcessError::ArgsInaccessible).severity(),
            Severity::Fatal
        );
        assert_eq!(
            KernelError::from(FatalError::SchedulerReturned).severity(),
            Severity::Fatal
        );
    }

    #[test]
    fn messages_name_the_program() {
        let err = KernelError::from(ProcessError::Create { name: name("init") });
        assert_eq!(err.to_string(), "failed to create process for init");
    }
}
