use crate::{
    display::DisplaySink,
    frame::{Frame, TrackingQuality},
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::mpsc, sync::Arc};
use vision_classifier::{
    Classification, ClassificationEngine, ComputeTarget, EngineError, Image, IncomePrediction,
    IncomeRecord, ModelId, Orientation, TabularError, TabularPredictor,
};

pub fn frame(sequence: u64, tracking: TrackingQuality) -> Frame {
    let image = Image::new(4, 4, vec![100u8; 4 * 4 * 3]).unwrap();
    Frame::new(image, Orientation::Up, tracking, sequence)
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    texts: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

impl DisplaySink for RecordingSink {
    fn show(&mut self, text: &str) {
        self.texts.lock().push(text.to_string());
    }
}

#[derive(Clone)]
pub enum Response {
    Ranked(Vec<Classification>),
    Fail,
    Panic,
}

pub fn ranked(entries: &[(&str, f32)]) -> Response {
    Response::Ranked(
        entries
            .iter()
            .map(|(label, confidence)| Classification::new(*label, *confidence))
            .collect(),
    )
}

/// Engine with scripted per-model answers. When built with `held`, every
/// call waits for a permit from the returned sender.
pub struct FakeEngine {
    responses: HashMap<ModelId, Response>,
    order: Vec<ModelId>,
    calls: Mutex<Vec<(ModelId, ComputeTarget)>>,
    permits: Mutex<Option<mpsc::Receiver<()>>>,
}

impl FakeEngine {
    pub fn new(responses: Vec<(&str, Response)>) -> Self {
        Self {
            order: responses.iter().map(|(id, _)| ModelId::new(*id)).collect(),
            responses: responses
                .into_iter()
                .map(|(id, response)| (ModelId::new(id), response))
                .collect(),
            calls: Mutex::new(Vec::new()),
            permits: Mutex::new(None),
        }
    }

    pub fn held(responses: Vec<(&str, Response)>) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let engine = Self::new(responses);
        *engine.permits.lock() = Some(rx);
        (engine, tx)
    }

    pub fn calls(&self) -> Vec<(ModelId, ComputeTarget)> {
        self.calls.lock().clone()
    }

    pub fn called_models(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|(id, _)| id.to_string())
            .collect()
    }
}

impl ClassificationEngine for FakeEngine {
    fn classify(
        &self,
        _image: &Image,
        _orientation: Orientation,
        model: &ModelId,
        target: ComputeTarget,
    ) -> Result<Vec<Classification>, EngineError> {
        if let Some(permits) = &*self.permits.lock() {
            // a dropped sender releases every waiting call
            let _ = permits.recv();
        }
        self.calls.lock().push((model.clone(), target));

        match self.responses.get(model) {
            Some(Response::Ranked(results)) => Ok(results.clone()),
            Some(Response::Fail) => Err(EngineError::Inference("scripted failure".to_string())),
            Some(Response::Panic) => panic!("scripted panic"),
            None => Err(EngineError::UnknownModel(model.clone())),
        }
    }

    fn models(&self) -> Vec<ModelId> {
        self.order.clone()
    }
}

/// Income predictor with a fixed answer that remembers every record it saw.
pub struct FakePredictor {
    answer: Option<IncomePrediction>,
    seen: Mutex<Vec<IncomeRecord>>,
}

impl FakePredictor {
    pub fn new(level: &str, probability: f64) -> Self {
        Self {
            answer: Some(IncomePrediction {
                income_level: level.to_string(),
                probability,
            }),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<IncomeRecord> {
        self.seen.lock().clone()
    }
}

impl TabularPredictor for FakePredictor {
    fn predict(&self, record: &IncomeRecord) -> Result<IncomePrediction, TabularError> {
        self.seen.lock().push(record.clone());
        self.answer.clone().ok_or(TabularError::ClassMismatch {
            classes: 2,
            outputs: 0,
        })
    }
}
