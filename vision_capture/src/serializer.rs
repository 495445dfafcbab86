use crate::{
    display::SinkHandle,
    frame::Frame,
    gate::SlotLease,
    publisher::ResultPublisher,
    selection::ActiveModel,
    telemetry::Metrics,
};
use std::{collections::HashMap, sync::Arc, time::Instant};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use vision_classifier::{ClassificationEngine, ModelId};

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Classification worker has stopped")]
    WorkerStopped,
}

/// A held frame plus the models to run on it, fixed at submission.
#[derive(Debug)]
pub struct ClassificationRequest {
    lease: SlotLease,
    models: Vec<ActiveModel>,
}

impl ClassificationRequest {
    pub fn new(lease: SlotLease, models: Vec<ActiveModel>) -> Self {
        Self { lease, models }
    }

    pub fn frame(&self) -> &Frame {
        self.lease.frame()
    }

    pub fn models(&self) -> &[ActiveModel] {
        &self.models
    }
}

/// Front of the single classification worker. Requests run one at a time,
/// in submission order, each to completion.
#[derive(Clone)]
pub struct DispatchSerializer {
    tx: mpsc::UnboundedSender<ClassificationRequest>,
}

struct Worker {
    engine: Arc<dyn ClassificationEngine>,
    publisher: ResultPublisher,
    sinks: HashMap<ModelId, SinkHandle>,
    metrics: Arc<Metrics>,
}

impl DispatchSerializer {
    pub fn spawn(
        engine: Arc<dyn ClassificationEngine>,
        publisher: ResultPublisher,
        sinks: HashMap<ModelId, SinkHandle>,
        metrics: Arc<Metrics>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Arc::new(Worker {
            engine,
            publisher,
            sinks,
            metrics,
        });
        let handle = tokio::spawn(run_worker(rx, worker));

        (Self { tx }, handle)
    }

    /// Queues `request`. If the worker is gone the request is dropped here,
    /// which frees its frame slot.
    pub fn submit(&self, request: ClassificationRequest) -> Result<(), SubmitError> {
        self.tx
            .send(request)
            .map_err(|_| SubmitError::WorkerStopped)
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<ClassificationRequest>, worker: Arc<Worker>) {
    while let Some(request) = rx.recv().await {
        let sequence = request.frame().sequence;
        let worker = worker.clone();
        // awaited before the next request is taken
        if let Err(e) = tokio::task::spawn_blocking(move || worker.process(request)).await {
            tracing::error!(sequence, "Classification task failed: {}", e);
        }
    }
    tracing::info!("Classification worker stopped");
}

impl Worker {
    fn process(&self, request: ClassificationRequest) {
        let frame = request.frame();
        if request.models().is_empty() {
            tracing::debug!(sequence = frame.sequence, "No models enabled");
            return;
        }

        for model in request.models() {
            let started = Instant::now();
            match self
                .engine
                .classify(&frame.image, frame.orientation, &model.id, model.target)
            {
                Ok(results) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    self.metrics
                        .record_classification_duration(elapsed_ms, model.id.as_str());
                    tracing::debug!(
                        sequence = frame.sequence,
                        model = %model.id,
                        target = model.target.as_str(),
                        elapsed_ms,
                        "Classified frame"
                    );
                    match self.sinks.get(&model.id) {
                        Some(sink) => {
                            self.publisher.publish(&model.id, &results, sink);
                        }
                        None => tracing::warn!(
                            model = %model.id,
                            "No display sink for model, result not shown"
                        ),
                    }
                }
                Err(e) => {
                    self.metrics.record_engine_failure(model.id.as_str());
                    tracing::warn!(
                        sequence = frame.sequence,
                        model = %model.id,
                        "Classification failed: {}",
                        e
                    );
                }
            }
        }
    }
}
