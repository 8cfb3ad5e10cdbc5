//! Structured logging for Conductor.
//!
//! Console + rolling NDJSON file output, secret redaction, and per-session
//! agent event tracing.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogger, SessionEvent, SessionEventEntry};
pub use logger::{init_logger, ConsoleTarget, LoggerOptions};
pub use redact::redact_sensitive_data;
