//! Pipeline metrics

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use whatsjet_common::{Error, Result};

/// Prometheus counters for the delivery pipeline
pub struct Metrics {
    registry: Registry,
    pub messages_sent: IntCounter,
    pub messages_failed: IntCounter,
    pub send_retries: IntCounter,
    pub inbound_events: IntCounterVec,
    pub orphaned_events: IntCounter,
    pub campaigns_completed: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help).map_err(metric_err)?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(metric_err)?;
    Ok(counter)
}

fn metric_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("Metrics registration failed: {}", e))
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("whatsjet".to_string()), None)
            .map_err(metric_err)?;

        let inbound_events = IntCounterVec::new(
            Opts::new("inbound_events_total", "Inbound webhook events processed"),
            &["kind"],
        )
        .map_err(metric_err)?;
        registry
            .register(Box::new(inbound_events.clone()))
            .map_err(metric_err)?;

        Ok(Self {
            messages_sent: counter(&registry, "messages_sent_total", "Messages accepted by the provider")?,
            messages_failed: counter(&registry, "messages_failed_total", "Messages that failed to send")?,
            send_retries: counter(&registry, "send_retries_total", "Send attempts re-enqueued after a transient failure")?,
            orphaned_events: counter(&registry, "orphaned_events_total", "Status events dropped for an unknown provider message id")?,
            campaigns_completed: counter(&registry, "campaigns_completed_total", "Campaigns that reached COMPLETED")?,
            inbound_events,
            registry,
        })
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_err)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_prefixed_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.messages_sent.inc();
        metrics.inbound_events.with_label_values(&["read"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("whatsjet_messages_sent_total 1"));
        assert!(text.contains("whatsjet_inbound_events_total{kind=\"read\"} 1"));
    }
}
