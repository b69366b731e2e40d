use crate::state::ProcessInfo;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub healthd_healthz_requests_total: Counter,
    pub healthd_collect_errors_total: CounterVec,
    pub healthd_uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let healthd_healthz_requests_total = Counter::with_opts(opts!(
            "healthd_healthz_requests_total",
            "Number of health snapshots served"
        ))?;
        let healthd_collect_errors_total = CounterVec::new(
            opts!(
                "healthd_collect_errors_total",
                "Metric collection failures by metric"
            ),
            &["metric"],
        )?;
        let healthd_uptime_seconds = Gauge::with_opts(opts!(
            "healthd_uptime_seconds",
            "Seconds since the serving process started"
        ))?;

        register(&registry, &healthd_healthz_requests_total)?;
        register(&registry, &healthd_collect_errors_total)?;
        register(&registry, &healthd_uptime_seconds)?;

        Ok(Arc::new(Self {
            registry,
            healthd_healthz_requests_total,
            healthd_collect_errors_total,
            healthd_uptime_seconds,
        }))
    }

    pub fn inc_healthz_request(&self) {
        self.healthd_healthz_requests_total.inc();
    }

    pub fn inc_collect_error(&self, metric: &str) {
        self.healthd_collect_errors_total
            .with_label_values(&[metric])
            .inc();
    }

    pub fn update_uptime(&self, process: &ProcessInfo) {
        let uptime = SystemTime::now()
            .duration_since(process.started_at())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.healthd_uptime_seconds.set(uptime);
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
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
