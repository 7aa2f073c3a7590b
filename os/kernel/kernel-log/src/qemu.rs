use core::fmt;

/// QEMU's `-debugcon` I/O port.
const QEMU_DEBUG_PORT: u16 = 0x402;

/// Sink writing every byte to QEMU's debug console.
///
/// Run QEMU with `-debugcon stdio` (or `file:debug.log`) to see the output.
/// On real hardware the port is typically unused and writes vanish.
#[derive(Debug, Default, Clone, Copy)]
pub struct QemuDebugPort;

impl QemuDebugPort {
    #[allow(clippy::inline_always)]
    #[inline(always)]
    fn putc(c: u8) {
        // SAFETY: port 0x402 has no side effects besides QEMU's debug console.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") QEMU_DEBUG_PORT,
                in("al") c,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

impl fmt::Write for QemuDebugPort {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.bytes().for_each(Self::putc);
        Ok(())
    }
}
