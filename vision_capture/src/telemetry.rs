use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    frames_offered: Counter<u64>,
    classification_duration: Histogram<u64>,
    engine_failures: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("vision_capture");
        global::set_meter_provider(provider);

        let frames_offered = meter
            .u64_counter("frames_offered_total")
            .with_description("Frames offered to the frame gate, by outcome")
            .build();

        let boundaries = generate_boundaries((10, 50, 100, 500, 2000));

        let classification_duration = meter
            .u64_histogram("classification_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of one model classification in milliseconds")
            .build();

        let engine_failures = meter
            .u64_counter("engine_failures_total")
            .with_description("Classification engine failures per model")
            .build();

        Ok(Metrics {
            frames_offered,
            classification_duration,
            engine_failures,
            registry,
        })
    }

    pub fn record_frame_offered(&self, outcome: &'static str) {
        let attributes = [KeyValue::new("outcome", outcome)];
        self.frames_offered.add(1, &attributes);
    }

    pub fn record_classification_duration(&self, duration_ms: u64, model: &str) {
        let attributes = [KeyValue::new("model", model.to_string())];
        self.classification_duration.record(duration_ms, &attributes);
    }

    pub fn record_engine_failure(&self, model: &str) {
        let attributes = [KeyValue::new("model", model.to_string())];
        self.engine_failures.add(1, &attributes);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 5;
    let middle_step: usize = 10;
    let end_step: usize = 50;
    let tail_step: usize = 250;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
