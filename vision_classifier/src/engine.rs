use crate::types::{Classification, ComputeTarget, Image, ModelId, Orientation};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Model not loaded: {0}")]
    UnknownModel(ModelId),
    #[error("Failed to load model {model}: {reason}")]
    LoadFailed { model: ModelId, reason: String },
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Model {model} has {labels} labels but produced {outputs} scores")]
    LabelMismatch {
        model: ModelId,
        labels: usize,
        outputs: usize,
    },
}

/// Blocking image classifier. Results come back ranked, best first, and that
/// ranking is authoritative for callers.
pub trait ClassificationEngine: Send + Sync + 'static {
    fn classify(
        &self,
        image: &Image,
        orientation: Orientation,
        model: &ModelId,
        target: ComputeTarget,
    ) -> Result<Vec<Classification>, EngineError>;

    fn models(&self) -> Vec<ModelId>;
}
