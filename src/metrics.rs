use crate::collectors::{now_unix, CollectSource};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// The server's own counters, exposed at `/internal/metrics`.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    started_at_unix: i64,
    pub sysdash_samples_total: Counter,
    pub sysdash_collect_errors_total: CounterVec,
    pub sysdash_last_sample_duration_seconds: Gauge,
    pub sysdash_last_sample_timestamp_seconds: Gauge,
    pub sysdash_uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let sysdash_samples_total = Counter::with_opts(opts!(
            "sysdash_samples_total",
            "Snapshots taken for /metrics requests"
        ))?;
        let sysdash_collect_errors_total = CounterVec::new(
            opts!(
                "sysdash_collect_errors_total",
                "Sub-queries that fell back to zero, by source"
            ),
            &["source"],
        )?;
        let sysdash_last_sample_duration_seconds = Gauge::with_opts(opts!(
            "sysdash_last_sample_duration_seconds",
            "Wall time of the most recent snapshot"
        ))?;
        let sysdash_last_sample_timestamp_seconds = Gauge::with_opts(opts!(
            "sysdash_last_sample_timestamp_seconds",
            "Unix timestamp of the most recent snapshot"
        ))?;
        let sysdash_uptime_seconds =
            Gauge::with_opts(opts!("sysdash_uptime_seconds", "Server uptime in seconds"))?;

        register(&registry, &sysdash_samples_total)?;
        register(&registry, &sysdash_collect_errors_total)?;
        register(&registry, &sysdash_last_sample_duration_seconds)?;
        register(&registry, &sysdash_last_sample_timestamp_seconds)?;
        register(&registry, &sysdash_uptime_seconds)?;

        Ok(Arc::new(Self {
            registry,
            started_at_unix: now_unix(),
            sysdash_samples_total,
            sysdash_collect_errors_total,
            sysdash_last_sample_duration_seconds,
            sysdash_last_sample_timestamp_seconds,
            sysdash_uptime_seconds,
        }))
    }

    pub fn record_sample(&self, elapsed: Duration, timestamp: i64, degraded: &[CollectSource]) {
        self.sysdash_samples_total.inc();
        self.sysdash_last_sample_duration_seconds
            .set(elapsed.as_secs_f64());
        self.sysdash_last_sample_timestamp_seconds
            .set(timestamp as f64);
        for source in degraded {
            self.sysdash_collect_errors_total
                .with_label_values(&[source.as_str()])
                .inc();
        }
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let uptime = now_unix().saturating_sub(self.started_at_unix).max(0);
        self.sysdash_uptime_seconds.set(uptime as f64);

        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
