//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation` — `"chat"` or `"chat_stream"`
//! - `tier` — cache tier: `"distributed"` or `"local"`
//! - `status` — outcome: `"ok"`, `"cached"` or an error kind code

/// Total chat requests handled by the orchestrator.
///
/// Labels: `operation`, `status`.
pub const REQUESTS_TOTAL: &str = "mimir_requests_total";

/// End-to-end request duration in seconds (buffered chat only).
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "mimir_request_duration_seconds";

/// Requests rejected by the admission controller.
pub const ADMISSION_REJECTED_TOTAL: &str = "mimir_admission_rejected_total";

/// Cache hits. Labels: `tier`.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Cache misses across both tiers.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Distributed-tier failures (connectivity, timeout). Labels: `op` (`"get"` | `"set"`).
pub const CACHE_ERRORS_TOTAL: &str = "mimir_cache_errors_total";

/// Retry attempts (not counting the initial request). Labels: `operation`.
pub const RETRIES_TOTAL: &str = "mimir_retries_total";

/// Retrievals that degraded to an empty context after exhausting retries.
pub const RETRIEVAL_FALLBACKS_TOTAL: &str = "mimir_retrieval_fallbacks_total";

/// Streams that ended with a terminal error instead of `Done`.
pub const STREAM_ABORTS_TOTAL: &str = "mimir_stream_aborts_total";
