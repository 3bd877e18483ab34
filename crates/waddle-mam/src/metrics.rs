//! Archive metrics.
//!
//! Uses the global OpenTelemetry meter provider, which must be initialized
//! by the host application.

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

static METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    METER.get_or_init(|| opentelemetry::global::meter("waddle-mam"))
}

/// Counter for archived message copies.
pub fn messages_archived() -> Counter<u64> {
    meter()
        .u64_counter("mam.messages.archived")
        .with_description("Total message copies persisted into archives")
        .with_unit("message")
        .build()
}

/// Counter for messages evicted by the capacity limit.
pub fn messages_evicted() -> Counter<u64> {
    meter()
        .u64_counter("mam.messages.evicted")
        .with_description("Total archived messages purged by the queue size limit")
        .with_unit("message")
        .build()
}

/// Counter for archive queries.
pub fn queries() -> Counter<u64> {
    meter()
        .u64_counter("mam.queries")
        .with_description("Total archive queries processed")
        .with_unit("query")
        .build()
}

/// Counter for erased archives.
pub fn archives_erased() -> Counter<u64> {
    meter()
        .u64_counter("mam.archives.erased")
        .with_description("Total archives erased on account deletion")
        .with_unit("archive")
        .build()
}

/// Histogram for archive query latency.
pub fn query_latency() -> Histogram<f64> {
    meter()
        .f64_histogram("mam.query.latency")
        .with_description("Archive query processing latency")
        .with_unit("ms")
        .build()
}

/// Record a persisted copy and the evictions it caused.
pub fn record_archived(direction: &str, evicted: u64) {
    messages_archived().add(1, &[KeyValue::new("direction", direction.to_string())]);
    if evicted > 0 {
        messages_evicted().add(evicted, &[]);
    }
}

/// Record a completed archive query.
pub fn record_query(outcome: &str, latency_ms: f64) {
    queries().add(1, &[KeyValue::new("outcome", outcome.to_string())]);
    query_latency().record(latency_ms, &[KeyValue::new("outcome", outcome.to_string())]);
}

/// Record an archive erasure.
pub fn record_erased(success: bool) {
    archives_erased().add(1, &[KeyValue::new("success", success)]);
}
