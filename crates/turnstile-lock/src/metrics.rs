// Metrics module for lock observability
// Provides counters and a wait-time histogram through the `metrics` facade

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const ACQUISITIONS_TOTAL: &str = "turnstile_lock_acquisitions_total";
pub const RELEASES_TOTAL: &str = "turnstile_lock_releases_total";
pub const CONTENTIONS_TOTAL: &str = "turnstile_lock_contentions_total";
pub const CANCELLATIONS_TOTAL: &str = "turnstile_lock_cancellations_total";
pub const STORE_ERRORS_TOTAL: &str = "turnstile_lock_store_errors_total";
pub const WAIT_SECONDS: &str = "turnstile_lock_wait_seconds";

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_counter!(ACQUISITIONS_TOTAL, "Total number of successful lock acquisitions");
    describe_counter!(RELEASES_TOTAL, "Total number of successful lock releases");
    describe_counter!(
        CONTENTIONS_TOTAL,
        "Total number of acquisitions that found the resource already claimed"
    );
    describe_counter!(
        CANCELLATIONS_TOTAL,
        "Total number of acquisitions abandoned by cancellation or deadline"
    );
    describe_counter!(
        STORE_ERRORS_TOTAL,
        "Total number of coordination store failures surfaced to callers"
    );
    describe_histogram!(
        WAIT_SECONDS,
        "Time from acquire start until the claim succeeded, in seconds"
    );

    tracing::info!("Lock metrics initialized");
}

pub(crate) fn record_acquisition(waited: Duration) {
    counter!(ACQUISITIONS_TOTAL).increment(1);
    histogram!(WAIT_SECONDS).record(waited.as_secs_f64());
}

pub(crate) fn record_release() {
    counter!(RELEASES_TOTAL).increment(1);
}

pub(crate) fn record_contention() {
    counter!(CONTENTIONS_TOTAL).increment(1);
}

pub(crate) fn record_cancellation() {
    counter!(CANCELLATIONS_TOTAL).increment(1);
}

pub(crate) fn record_store_error(operation: &'static str) {
    counter!(STORE_ERRORS_TOTAL, "operation" => operation).increment(1);
}
