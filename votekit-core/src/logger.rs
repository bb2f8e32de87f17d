//! Forwards the crate's `log` records to a host application.
//!
//! Native hosts (the CLI, tests) install any `log` implementation directly. Hosts embedding the
//! library through bindings implement [`Logger`] and call [`set_logger`] once at startup.

use std::sync::{Arc, OnceLock};

/// Receiver of log messages emitted by `VoteKit`.
///
/// # Examples
///
/// ```rust
/// use votekit_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Swift
///
/// ```swift
/// class VoteKitLoggerBridge: VoteKit.Logger {
///     func log(level: VoteKit.LogLevel, message: String) {
///         Log.log(level.toCoreLevel(), message)
///     }
/// }
///
/// VoteKit.setLogger(logger: VoteKitLoggerBridge()) // once, at app start
/// ```
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait Logger: Sync + Send {
    /// Records `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Stage entry and other debugging information.
    Debug,
    /// State transitions of submissions.
    Info,
    /// Rejections, timeouts and other situations the user will notice.
    Warn,
    /// Failures.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// Whether a record is forwarded to the host.
///
/// Debug and trace records of dependencies (HTTP client, retry loop) are dropped; everything
/// emitted by `votekit` crates is kept.
fn should_forward(target: &str, level: log::Level) -> bool {
    let verbose = matches!(level, log::Level::Debug | log::Level::Trace);
    !verbose || target.starts_with("votekit")
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.target(), record.level()) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Installs `logger` as the receiver of every `VoteKit` log record.
///
/// Only the first call has an effect. If another `log` implementation is already installed in
/// the process, records keep going there and a message is printed to stderr.
#[cfg_attr(feature = "ffi", uniffi::export)]
pub fn set_logger(logger: Arc<dyn Logger>) {
    static LOGGER: ForeignLogger = ForeignLogger;

    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("votekit logger already set");
        return;
    }
    match log::set_logger(&LOGGER) {
        Ok(()) => log::set_max_level(log::LevelFilter::Trace),
        Err(e) => eprintln!("failed to install votekit logger: {e}"),
    }
}
