//! Per-pass tracing spans.

use tracing::Span;
use uuid::Uuid;

/// Create the span wrapping one reconciliation pass.
pub fn pass_span(kind: &'static str, pass_id: Uuid) -> Span {
    tracing::info_span!("pass", kind = kind, pass_id = %pass_id)
}
