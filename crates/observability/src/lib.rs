//! Tracing/logging setup shared by brainflow binaries.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Initialize with an explicit output format (the worker's `--log-format`).
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}

pub use self::tracing::LogFormat;

/// Tracing configuration (filters, layers).
pub mod tracing;
