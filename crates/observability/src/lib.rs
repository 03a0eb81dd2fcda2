//! Tracing/logging setup shared by every binary embedding the stock ledger.

/// Initialize process-wide logging using `STOCKLEDGER_LOG_FORMAT` (JSON by default).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize process-wide logging with an explicit output format.
pub fn init_with(format: LogFormat) {
    tracing::init_with(format);
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use self::tracing::{LogFormat, ParseLogFormatError};
