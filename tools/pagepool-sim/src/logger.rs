use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::time::Instant;

/// Writes `[+secs LEVEL] target: message` lines to stderr.
pub struct StderrLogger {
    max_level: LevelFilter,
    started: Instant,
}

impl StderrLogger {
    #[must_use]
    pub fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            started: Instant::now(),
        }
    }

    /// Call this once, before the first record.
    ///
    /// # Errors
    /// Another logger is already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let secs = self.started.elapsed().as_secs_f64();
        // Best effort; a closed stderr is not worth dying over.
        let _ = writeln!(
            std::io::stderr().lock(),
            "[+{secs:8.3} {:<5}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
