//! Metrics and tracing setup for mirrortab.
//!
//! Provides a global [`HaMetrics`] singleton backed by the `prometheus`
//! crate, plus an optional lightweight HTTP server for Prometheus scraping.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;

// ────────────────────────── Tracing ──────────────────────────

/// Initialize the tracing subscriber with env-filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

// ────────────────────────── Prometheus metrics ──────────────────────────

/// Global metrics instance.
static METRICS: OnceLock<HaMetrics> = OnceLock::new();

/// Retrieve (or lazily create) the global metrics singleton.
pub fn metrics() -> &'static HaMetrics {
    METRICS.get_or_init(HaMetrics::new)
}

/// All Prometheus metrics for the HA facade.
pub struct HaMetrics {
    pub registry: Registry,

    // ── Data-plane operation counters ──
    pub writes: IntCounter,
    pub reads: IntCounter,
    pub lgets: IntCounter,
    pub scans: IntCounter,

    // ── Control-plane counters ──
    pub ddl_ops: IntCounterVec,

    // ── Fan-out outcomes ──
    pub replica_failures: IntCounterVec,
    pub merge_collapsed_cells: IntCounter,

    // ── Operation latency ──
    pub op_latency_secs: HistogramVec,
}

// Manual Debug impl because prometheus types don't derive Debug.
impl std::fmt::Debug for HaMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaMetrics").finish_non_exhaustive()
    }
}

/// Default histogram buckets (seconds) for operation latency.
const LATENCY_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

impl HaMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let writes = IntCounter::with_opts(Opts::new(
            "mirrortab_writes_total",
            "Write fan-outs started (mutations and scalar puts)",
        ))
        .expect("writes counter");
        let reads = IntCounter::with_opts(Opts::new(
            "mirrortab_reads_total",
            "First-success reads started",
        ))
        .expect("reads counter");
        let lgets = IntCounter::with_opts(Opts::new(
            "mirrortab_lgets_total",
            "Latest-get merges started",
        ))
        .expect("lgets counter");
        let scans = IntCounter::with_opts(Opts::new(
            "mirrortab_scans_total",
            "Scan streams opened",
        ))
        .expect("scans counter");

        let ddl_ops = IntCounterVec::new(
            Opts::new("mirrortab_ddl_total", "Control-plane fan-outs, by operation"),
            &["op"],
        )
        .expect("ddl_ops counter vec");

        let replica_failures = IntCounterVec::new(
            Opts::new(
                "mirrortab_replica_failures_total",
                "Per-replica failures observed during fan-outs, by operation",
            ),
            &["op"],
        )
        .expect("replica_failures counter vec");

        let merge_collapsed_cells = IntCounter::with_opts(Opts::new(
            "mirrortab_merge_collapsed_cells_total",
            "Cells dropped by the latest-get duplicate-collapse window",
        ))
        .expect("merge_collapsed_cells counter");

        let op_latency_secs = HistogramVec::new(
            HistogramOpts::new(
                "mirrortab_op_latency_seconds",
                "Facade operation latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["op"],
        )
        .expect("op_latency_secs histogram");

        // Register all metrics
        registry
            .register(Box::new(writes.clone()))
            .expect("register writes");
        registry
            .register(Box::new(reads.clone()))
            .expect("register reads");
        registry
            .register(Box::new(lgets.clone()))
            .expect("register lgets");
        registry
            .register(Box::new(scans.clone()))
            .expect("register scans");
        registry
            .register(Box::new(ddl_ops.clone()))
            .expect("register ddl_ops");
        registry
            .register(Box::new(replica_failures.clone()))
            .expect("register replica_failures");
        registry
            .register(Box::new(merge_collapsed_cells.clone()))
            .expect("register merge_collapsed_cells");
        registry
            .register(Box::new(op_latency_secs.clone()))
            .expect("register op_latency_secs");

        Self {
            registry,
            writes,
            reads,
            lgets,
            scans,
            ddl_ops,
            replica_failures,
            merge_collapsed_cells,
            op_latency_secs,
        }
    }
}

/// Encode all registered metrics in Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let m = metrics();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&m.registry.gather(), &mut buf)
        .expect("prometheus text encoding");
    String::from_utf8(buf).expect("prometheus output is valid UTF-8")
}

/// Helper: start an operation latency timer. Returns a guard that records
/// elapsed time on drop.
pub fn start_op_timer(op: &str) -> prometheus::HistogramTimer {
    metrics()
        .op_latency_secs
        .with_label_values(&[op])
        .start_timer()
}

// ────────────────────────── Metrics HTTP server ──────────────────────────

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

async fn metrics_handler(
    _req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let body = encode_metrics();
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .expect("valid HTTP response"))
}

/// Serve Prometheus metrics on the given address (`GET /metrics`).
///
/// This spawns a lightweight HTTP/1.1 server. Call from a `tokio::spawn`.
pub async fn serve_metrics(
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on http://{}/metrics", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                tracing::debug!("metrics connection error: {}", e);
            }
        });
    }
}

// ────────────────────────── Tests ──────────────────────────
