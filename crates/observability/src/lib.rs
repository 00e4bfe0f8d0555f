//! Tracing and logging (shared setup).

/// Tracing configuration (filters, layers, request spans).
pub mod tracing;

pub use crate::tracing::{LogFormat, ParseLogFormatError, request_span};

/// Initialize process-wide observability with JSON logs.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Same as [`init`], with an explicit output format.
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}
