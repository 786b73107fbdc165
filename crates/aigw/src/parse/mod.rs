//! Incremental framing of streamed response bodies.

pub mod aws_sse;
pub mod sse;

/// Upper bound on a single buffered event, so a backend that never terminates a line or frame
/// cannot grow the buffer without limit.
pub const DEFAULT_MAX_EVENT_BYTES: usize = 4 * 1024 * 1024;
