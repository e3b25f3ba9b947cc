//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Gauge, HistogramVec, Opts, Registry,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_counter_with_registry, register_gauge_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Start triggers
    pub start_triggers: CounterVec,
    pub cooldown_notices: Counter,

    // Intake flow
    pub inbound_events: CounterVec,
    pub validation_rejections: CounterVec,
    pub active_sessions: Gauge,

    // Relay
    pub relays: CounterVec,
    pub relay_duration: HistogramVec,

    // Backing store
    pub store_failovers: Counter,
    pub store_errors: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let start_triggers = register_counter_vec_with_registry!(
            Opts::new("intake_start_triggers_total", "Start triggers by outcome"),
            &["outcome"],
            registry
        )?;

        let cooldown_notices = register_counter_with_registry!(
            Opts::new("intake_cooldown_notices_total", "Cooldown countdowns started"),
            registry
        )?;

        let inbound_events = register_counter_vec_with_registry!(
            Opts::new("intake_inbound_events_total", "Inbound events by kind"),
            &["kind"],
            registry
        )?;

        let validation_rejections = register_counter_vec_with_registry!(
            Opts::new("intake_validation_rejections_total", "Rejected user input by kind"),
            &["kind"],
            registry
        )?;

        let active_sessions = register_gauge_with_registry!(
            Opts::new("intake_active_sessions", "Chats with an unfinished intake"),
            registry
        )?;

        let relays = register_counter_vec_with_registry!(
            Opts::new("intake_relays_total", "File relays by status"),
            &["status"],
            registry
        )?;

        let relay_duration = register_histogram_vec_with_registry!(
            "intake_relay_duration_seconds",
            "Download plus mail relay duration in seconds",
            &["status"],
            registry
        )?;

        let store_failovers = register_counter_with_registry!(
            Opts::new("intake_store_failovers_total", "Fallbacks to the in-process store"),
            registry
        )?;

        let store_errors = register_counter_vec_with_registry!(
            Opts::new("intake_store_errors_total", "Backing store errors by operation"),
            &["operation"],
            registry
        )?;

        Ok(Self {
            registry,
            start_triggers,
            cooldown_notices,
            inbound_events,
            validation_rejections,
            active_sessions,
            relays,
            relay_duration,
            store_failovers,
            store_errors,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a start trigger decision
    pub fn record_start(&self, admitted: bool) {
        let outcome = if admitted { "admitted" } else { "limited" };
        self.start_triggers.with_label_values(&[outcome]).inc();
    }

    pub fn record_event(&self, kind: &str) {
        self.inbound_events.with_label_values(&[kind]).inc();
    }

    pub fn record_rejection(&self, kind: &str) {
        self.validation_rejections.with_label_values(&[kind]).inc();
    }

    /// Record a finished relay attempt
    pub fn record_relay(&self, success: bool, seconds: f64) {
        let status = if success { "success" } else { "error" };
        self.relays.with_label_values(&[status]).inc();
        self.relay_duration.with_label_values(&[status]).observe(seconds);
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_start_and_relay() {
        let metrics = Metrics::new().unwrap();
        metrics.record_start(true);
        metrics.record_start(false);
        metrics.record_start(false);
        metrics.record_relay(true, 0.25);

        assert_eq!(metrics.start_triggers.with_label_values(&["limited"]).get(), 2.0);
        assert_eq!(metrics.relays.with_label_values(&["success"]).get(), 1.0);
    }

    #[test]
    fn test_export_contains_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event("text");
        metrics.store_failovers.inc();

        let text = metrics.export_prometheus();
        assert!(text.contains("intake_inbound_events_total"));
        assert!(text.contains("intake_store_failovers_total"));
    }
}
