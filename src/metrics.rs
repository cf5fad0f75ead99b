use crate::poller::PollOutcome;
use crate::snapshot::{LinkStatus, Snapshot};
use crate::state::{DashboardState, PollState};
use crate::util::now_unix;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

const LOAD_WINDOWS: [&str; 3] = ["1m", "5m", "15m"];

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub router_memory_total_mb: Gauge,
    pub router_memory_used_mb: Gauge,
    pub router_memory_free_mb: Gauge,
    pub router_memory_buffers_mb: Gauge,
    pub router_memory_cached_mb: Gauge,
    pub router_memory_actual_used_mb: Gauge,
    pub router_memory_usage_percent: Gauge,
    pub router_cpu_usage_percent: Gauge,
    pub router_cpu_cores: Gauge,
    pub router_cpu_load: GaugeVec,
    pub router_storage_total_mb: Gauge,
    pub router_storage_used_mb: Gauge,
    pub router_storage_free_mb: Gauge,
    pub router_interface_up: GaugeVec,
    pub router_interface_rx_bytes: GaugeVec,
    pub router_interface_tx_bytes: GaugeVec,
    pub router_interface_count: Gauge,
    pub poller_up: Gauge,
    pub poller_uptime_seconds: Gauge,
    pub poller_consecutive_failures: Gauge,
    pub poller_last_update_timestamp_seconds: Gauge,
    pub poller_last_success_timestamp_seconds: Gauge,
    pub poller_cycles_total: Counter,
    pub poller_errors_total: CounterVec,
    pub poller_category_failures_total: CounterVec,
    pub scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let router_memory_total_mb =
            Gauge::with_opts(opts!("router_memory_total_mb", "Router total memory in MB"))?;
        let router_memory_used_mb = Gauge::with_opts(opts!(
            "router_memory_used_mb",
            "Router used memory in MB, including buffers and cache"
        ))?;
        let router_memory_free_mb =
            Gauge::with_opts(opts!("router_memory_free_mb", "Router free memory in MB"))?;
        let router_memory_buffers_mb =
            Gauge::with_opts(opts!("router_memory_buffers_mb", "Router buffers in MB"))?;
        let router_memory_cached_mb =
            Gauge::with_opts(opts!("router_memory_cached_mb", "Router page cache in MB"))?;
        let router_memory_actual_used_mb = Gauge::with_opts(opts!(
            "router_memory_actual_used_mb",
            "Router used memory excluding buffers and cache in MB"
        ))?;
        let router_memory_usage_percent = Gauge::with_opts(opts!(
            "router_memory_usage_percent",
            "Router memory usage excluding buffers and cache in percent"
        ))?;
        let router_cpu_usage_percent = Gauge::with_opts(opts!(
            "router_cpu_usage_percent",
            "Router CPU usage in percent (0..100)"
        ))?;
        let router_cpu_cores =
            Gauge::with_opts(opts!("router_cpu_cores", "Router CPU core count"))?;
        let router_cpu_load = GaugeVec::new(
            opts!("router_cpu_load", "Router load average by window"),
            &["window"],
        )?;
        let router_storage_total_mb =
            Gauge::with_opts(opts!("router_storage_total_mb", "Router storage total in MB"))?;
        let router_storage_used_mb =
            Gauge::with_opts(opts!("router_storage_used_mb", "Router storage used in MB"))?;
        let router_storage_free_mb =
            Gauge::with_opts(opts!("router_storage_free_mb", "Router storage free in MB"))?;
        let router_interface_up = GaugeVec::new(
            opts!("router_interface_up", "Interface link state (1 = up)"),
            &["iface"],
        )?;
        let router_interface_rx_bytes = GaugeVec::new(
            opts!("router_interface_rx_bytes", "Received bytes per interface"),
            &["iface"],
        )?;
        let router_interface_tx_bytes = GaugeVec::new(
            opts!("router_interface_tx_bytes", "Transmitted bytes per interface"),
            &["iface"],
        )?;
        let router_interface_count =
            Gauge::with_opts(opts!("router_interface_count", "Number of router interfaces"))?;

        let poller_up = Gauge::with_opts(opts!(
            "poller_up",
            "1 if the last poll cycle produced a snapshot"
        ))?;
        let poller_uptime_seconds =
            Gauge::with_opts(opts!("poller_uptime_seconds", "Poller uptime in seconds"))?;
        let poller_consecutive_failures = Gauge::with_opts(opts!(
            "poller_consecutive_failures",
            "Failed poll cycles since the last success"
        ))?;
        let poller_last_update_timestamp_seconds = Gauge::with_opts(opts!(
            "poller_last_update_timestamp_seconds",
            "Unix timestamp of the last published poll outcome"
        ))?;
        let poller_last_success_timestamp_seconds = Gauge::with_opts(opts!(
            "poller_last_success_timestamp_seconds",
            "Unix timestamp of the last successful poll"
        ))?;
        let poller_cycles_total = Counter::with_opts(opts!(
            "poller_cycles_total",
            "Published poll cycles total"
        ))?;
        let poller_errors_total = CounterVec::new(
            opts!("poller_errors_total", "Failed poll cycles total by error kind"),
            &["kind"],
        )?;
        let poller_category_failures_total = CounterVec::new(
            opts!(
                "poller_category_failures_total",
                "Tolerated category request failures total by category"
            ),
            &["category"],
        )?;
        let scrape_count_total =
            Counter::with_opts(opts!("scrape_count_total", "Number of /metrics scrapes"))?;

        register(&registry, &router_memory_total_mb)?;
        register(&registry, &router_memory_used_mb)?;
        register(&registry, &router_memory_free_mb)?;
        register(&registry, &router_memory_buffers_mb)?;
        register(&registry, &router_memory_cached_mb)?;
        register(&registry, &router_memory_actual_used_mb)?;
        register(&registry, &router_memory_usage_percent)?;
        register(&registry, &router_cpu_usage_percent)?;
        register(&registry, &router_cpu_cores)?;
        register(&registry, &router_cpu_load)?;
        register(&registry, &router_storage_total_mb)?;
        register(&registry, &router_storage_used_mb)?;
        register(&registry, &router_storage_free_mb)?;
        register(&registry, &router_interface_up)?;
        register(&registry, &router_interface_rx_bytes)?;
        register(&registry, &router_interface_tx_bytes)?;
        register(&registry, &router_interface_count)?;
        register(&registry, &poller_up)?;
        register(&registry, &poller_uptime_seconds)?;
        register(&registry, &poller_consecutive_failures)?;
        register(&registry, &poller_last_update_timestamp_seconds)?;
        register(&registry, &poller_last_success_timestamp_seconds)?;
        register(&registry, &poller_cycles_total)?;
        register(&registry, &poller_errors_total)?;
        register(&registry, &poller_category_failures_total)?;
        register(&registry, &scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            router_memory_total_mb,
            router_memory_used_mb,
            router_memory_free_mb,
            router_memory_buffers_mb,
            router_memory_cached_mb,
            router_memory_actual_used_mb,
            router_memory_usage_percent,
            router_cpu_usage_percent,
            router_cpu_cores,
            router_cpu_load,
            router_storage_total_mb,
            router_storage_used_mb,
            router_storage_free_mb,
            router_interface_up,
            router_interface_rx_bytes,
            router_interface_tx_bytes,
            router_interface_count,
            poller_up,
            poller_uptime_seconds,
            poller_consecutive_failures,
            poller_last_update_timestamp_seconds,
            poller_last_success_timestamp_seconds,
            poller_cycles_total,
            poller_errors_total,
            poller_category_failures_total,
            scrape_count_total,
        }))
    }

    pub fn update_from_state(&self, state: &DashboardState) {
        self.poller_consecutive_failures
            .set(state.consecutive_failures as f64);
        self.poller_last_update_timestamp_seconds
            .set(state.last_update_unix as f64);
        if let Some(ts) = state.last_success_unix {
            self.poller_last_success_timestamp_seconds.set(ts as f64);
        }

        self.router_interface_up.reset();
        self.router_interface_rx_bytes.reset();
        self.router_interface_tx_bytes.reset();
        self.router_cpu_load.reset();

        match &state.current {
            PollState::Ready(snapshot) => {
                self.poller_up.set(1.0);
                self.set_snapshot(snapshot);
            }
            PollState::Loading | PollState::Failed(_) => {
                self.poller_up.set(0.0);
                self.set_snapshot(&Snapshot::placeholder());
                self.router_interface_count.set(0.0);
            }
        }

        let uptime = now_unix().saturating_sub(state.started_at_unix) as f64;
        self.poller_uptime_seconds.set(uptime);
    }

    fn set_snapshot(&self, snapshot: &Snapshot) {
        let memory = &snapshot.resources.memory;
        self.router_memory_total_mb.set(memory.total as f64);
        self.router_memory_used_mb.set(memory.used as f64);
        self.router_memory_free_mb.set(memory.free as f64);
        self.router_memory_buffers_mb.set(memory.buffers as f64);
        self.router_memory_cached_mb.set(memory.cached as f64);
        self.router_memory_actual_used_mb
            .set(memory.actual_used as f64);
        self.router_memory_usage_percent
            .set(snapshot.memory_usage_percent());

        let cpu = &snapshot.resources.cpu;
        self.router_cpu_usage_percent.set(cpu.usage as f64);
        self.router_cpu_cores.set(cpu.cores as f64);
        for (window, value) in LOAD_WINDOWS.iter().zip(cpu.load) {
            self.router_cpu_load
                .with_label_values(&[*window])
                .set(value);
        }

        let storage = &snapshot.resources.storage;
        self.router_storage_total_mb.set(storage.total as f64);
        self.router_storage_used_mb.set(storage.used as f64);
        self.router_storage_free_mb.set(storage.free as f64);

        for iface in &snapshot.interfaces {
            let up = matches!(iface.status, LinkStatus::Up);
            self.router_interface_up
                .with_label_values(&[&iface.name])
                .set(if up { 1.0 } else { 0.0 });
            self.router_interface_rx_bytes
                .with_label_values(&[&iface.name])
                .set(iface.rx_bytes as f64);
            self.router_interface_tx_bytes
                .with_label_values(&[&iface.name])
                .set(iface.tx_bytes as f64);
        }
        self.router_interface_count
            .set(snapshot.interfaces.len() as f64);
    }

    pub fn record_outcome(&self, outcome: &PollOutcome) {
        self.poller_cycles_total.inc();
        if let Err(err) = outcome {
            self.poller_errors_total
                .with_label_values(&[err.kind.as_str()])
                .inc();
        }
    }

    pub fn inc_scrape_count(&self) {
        self.scrape_count_total.inc();
    }

    pub fn inc_category_failure(&self, category: &str) {
        self.poller_category_failures_total
            .with_label_values(&[category])
            .inc();
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


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PollError;
    use crate::snapshot::InterfaceStat;

    fn encoded(metrics: &Metrics) -> String {
        String::from_utf8(metrics.encode_metrics().unwrap()).unwrap()
    }

    #[test]
    fn ready_state_exports_snapshot() {
        let metrics = Metrics::new().unwrap();
        let mut snapshot = Snapshot::placeholder();
        snapshot.resources.memory.total = 3927;
        snapshot.resources.memory.actual_used = 217;
        snapshot.interfaces.push(InterfaceStat {
            name: "eth0".to_string(),
            status: LinkStatus::Up,
            ipv4: None,
            ipv6: None,
            rx_bytes: 100,
            tx_bytes: 200,
        });
        let mut state = DashboardState::new(0);
        state.apply(Ok(snapshot), 10);

        metrics.update_from_state(&state);
        let text = encoded(&metrics);
        assert!(text.contains("router_memory_total_mb 3927"));
        assert!(text.contains("router_memory_actual_used_mb 217"));
        assert!(text.contains("router_interface_up{iface=\"eth0\"} 1"));
        assert!(text.contains("router_interface_tx_bytes{iface=\"eth0\"} 200"));
        assert!(text.contains("router_cpu_load{window=\"15m\"} 0"));
        assert!(text.contains("poller_up 1"));
        assert!(text.contains("poller_last_success_timestamp_seconds 10"));
    }

    #[test]
    fn failed_state_clears_router_gauges() {
        let metrics = Metrics::new().unwrap();
        let mut snapshot = Snapshot::placeholder();
        snapshot.resources.memory.total = 3927;
        let mut state = DashboardState::new(0);
        state.apply(Ok(snapshot), 1);
        metrics.update_from_state(&state);

        let outcome = Err(PollError::network("refused"));
        metrics.record_outcome(&outcome);
        state.apply(outcome, 2);
        metrics.update_from_state(&state);

        let text = encoded(&metrics);
        assert!(text.contains("router_memory_total_mb 0"));
        assert!(text.contains("poller_up 0"));
        assert!(text.contains("poller_consecutive_failures 1"));
        assert!(text.contains("poller_errors_total{kind=\"network\"} 1"));
        assert!(text.contains("poller_cycles_total 1"));
    }
}
