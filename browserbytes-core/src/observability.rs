/*!
Observability infrastructure for BrowserBytes.

This module provides:
- Structured logging setup (`tracing` with JSON or human output)
- Prometheus metrics for exports, restores and remote calls (`metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{BrowserBytesError, Result};

/// Directive applied on top of `RUST_LOG`
pub const DEFAULT_LOG_DIRECTIVE: &str = "browserbytes=info";

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<BytesMetrics> = OnceLock::new();

/// Metrics collection for BrowserBytes operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct BytesMetrics {
    pub exports_total: Counter,
    pub restores_total: Counter,
    pub cookies_restored_total: Counter,
    pub cookie_failures_total: Counter,

    // Record store and passphrase service
    pub remote_requests_total: Counter,
    pub remote_errors_total: Counter,
    pub remote_latency_seconds: Histogram,

    pub snapshot_size_bytes: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn metric_error(name: &str, e: prometheus::Error) -> BrowserBytesError {
    BrowserBytesError::config(format!("Failed to set up metric {name}: {e}"))
}

#[cfg(feature = "metrics")]
fn register_counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help).map_err(|e| metric_error(name, e))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| metric_error(name, e))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
fn register_histogram(
    registry: &Registry,
    name: &str,
    help: &str,
    buckets: Vec<f64>,
) -> Result<Histogram> {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))
        .map_err(|e| metric_error(name, e))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| metric_error(name, e))?;
    Ok(histogram)
}

#[cfg(feature = "metrics")]
impl BytesMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            exports_total: register_counter(
                &registry,
                "browserbytes_exports_total",
                "Snapshots exported to a file or a cloud record",
            )?,
            restores_total: register_counter(
                &registry,
                "browserbytes_restores_total",
                "Snapshots restored into a tab",
            )?,
            cookies_restored_total: register_counter(
                &registry,
                "browserbytes_cookies_restored_total",
                "Cookies successfully set during restore",
            )?,
            cookie_failures_total: register_counter(
                &registry,
                "browserbytes_cookie_failures_total",
                "Cookies the browser refused to set during restore",
            )?,
            remote_requests_total: register_counter(
                &registry,
                "browserbytes_remote_requests_total",
                "Requests made to the record store or passphrase service",
            )?,
            remote_errors_total: register_counter(
                &registry,
                "browserbytes_remote_errors_total",
                "Failed requests to the record store or passphrase service",
            )?,
            remote_latency_seconds: register_histogram(
                &registry,
                "browserbytes_remote_latency_seconds",
                "Duration of remote requests in seconds",
                prometheus::DEFAULT_BUCKETS.to_vec(),
            )?,
            snapshot_size_bytes: register_histogram(
                &registry,
                "browserbytes_snapshot_size_bytes",
                "Size of serialized snapshots in bytes",
                prometheus::exponential_buckets(256.0, 4.0, 8)
                    .map_err(|e| metric_error("browserbytes_snapshot_size_bytes", e))?,
            )?,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static BytesMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize BrowserBytes metrics"))
    }

    /// Record an export of `size_bytes` serialized bytes
    pub fn record_export(&self, size_bytes: usize) {
        self.exports_total.inc();
        self.snapshot_size_bytes.observe(size_bytes as f64);
    }

    /// Record a finished restore
    pub fn record_restore(&self, cookies_restored: usize, cookies_failed: usize) {
        self.restores_total.inc();
        self.cookies_restored_total.inc_by(cookies_restored as f64);
        self.cookie_failures_total.inc_by(cookies_failed as f64);
    }

    pub fn record_remote_request(&self, _operation: &str) {
        self.remote_requests_total.inc();
    }

    pub fn record_remote_error(&self, _operation: &str) {
        self.remote_errors_total.inc();
    }

    pub fn record_remote_latency(&self, _operation: &str, duration: std::time::Duration) {
        self.remote_latency_seconds.observe(duration.as_secs_f64());
    }

    /// Gather metrics in Prometheus format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| BrowserBytesError::config(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            BrowserBytesError::config(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

/// Metrics timer helper for remote calls
#[cfg(feature = "metrics")]
pub struct MetricsTimer {
    start: Instant,
    operation: &'static str,
}

#[cfg(feature = "metrics")]
impl MetricsTimer {
    /// Count a remote request and start timing it
    pub fn start_remote(operation: &'static str) -> Self {
        BytesMetrics::global().record_remote_request(operation);
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Complete the timer, recording success latency
    pub fn finish(self) {
        BytesMetrics::global().record_remote_latency(self.operation, self.start.elapsed());
    }

    /// Complete the timer with an error, recording both latency and error
    pub fn finish_with_error(self) {
        let metrics = BytesMetrics::global();
        metrics.record_remote_latency(self.operation, self.start.elapsed());
        metrics.record_remote_error(self.operation);
    }
}

/// Prometheus text exposition of the global metrics
#[cfg(feature = "metrics")]
pub fn gather_metrics() -> Result<String> {
    BytesMetrics::global().gather_metrics()
}

/// Initialize the global tracing subscriber
///
/// The filter starts from `RUST_LOG` and always adds
/// [`DEFAULT_LOG_DIRECTIVE`]. Events go to stderr in both modes so that
/// stdout carries only command output.
///
/// # Arguments
/// * `json` - Emit one JSON object per event instead of human-readable lines
///
/// # Errors
/// * `BrowserBytesError::Config` - a global subscriber is already installed
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    BytesMetrics::global();

    let filter = EnvFilter::from_default_env().add_directive(
        DEFAULT_LOG_DIRECTIVE
            .parse()
            .map_err(|e| BrowserBytesError::config(format!("Invalid log directive: {e}")))?,
    );

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false)
            .with_writer(std::io::stderr);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    };

    result.map_err(|e| {
        BrowserBytesError::config(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("BrowserBytes observability initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        assert!(DEFAULT_LOG_DIRECTIVE
            .parse::<tracing_subscriber::filter::Directive>()
            .is_ok());
    }
}
