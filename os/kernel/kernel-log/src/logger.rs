use crate::{BANNER_TARGET, LogSink};
use kernel_sync::SpinLock;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct KernelLogger<S> {
    max_level: LevelFilter,
    sink: SpinLock<S>,
}

impl<S: LogSink> KernelLogger<S> {
    #[must_use]
    pub const fn new(sink: S, max_level: LevelFilter) -> Self {
        Self {
            max_level,
            sink: SpinLock::new(sink),
        }
    }

    /// Register this logger with the `log` facade. Call once during early init.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn install(&'static self) -> Result<(), SetLoggerError>
    where
        S: 'static,
    {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    /// Run `f` against the sink, e.g. to drain a [`BufferSink`](crate::BufferSink).
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        self.sink.with_lock(f)
    }
}

impl<S: LogSink> Log for KernelLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut sink = self.sink.lock();
        // Best effort; a full or absent device drops the line.
        let _ = if record.target() == BANNER_TARGET {
            writeln!(sink, "{}", record.args())
        } else {
            writeln!(
                sink,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        };
    }

    fn flush(&self) {}
}
