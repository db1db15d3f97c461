use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
}

pub static PAYLOADS_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "gateway_payloads_received_total",
        "Number of station payloads accepted for writing",
    )
});

pub static POINTS_WRITTEN: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "gateway_points_written_total",
        "Number of points confirmed written by the sink",
    )
});

pub static SINK_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "gateway_sink_failures_total",
        "Number of failed sink write sessions",
    )
});

/// Text exposition of the gateway counters.
pub fn render() -> String {
    Lazy::force(&PAYLOADS_RECEIVED);
    Lazy::force(&POINTS_WRITTEN);
    Lazy::force(&SINK_FAILURES);

    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buf) {
        tracing::warn!(error = %e, "failed to encode gateway metrics");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
