use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Global runtime metrics for the price fetcher.
///
/// Purpose:
/// - Track live WebSocket connections and reconnects
/// - Track tick throughput and cache writes
/// - Count parse failures, which are deliberately never logged
///   per-occurrence (a malformed feed would flood the log)
///
/// Design:
/// - Lock-free (Atomics)
/// - Cheap to update
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    // High-level
    pub exchanges_active: AtomicUsize,

    // WebSocket level
    pub ws_connections_active: AtomicUsize,
    pub ws_reconnects: AtomicUsize,
    pub subscriptions_sent: AtomicUsize,

    // Throughput
    pub ticks_received: AtomicUsize,
    pub cache_writes: AtomicUsize,
    pub parse_errors: AtomicUsize,
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
