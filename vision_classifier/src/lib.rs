mod labels;
mod ort_engine;

pub mod config;
pub mod engine;
pub mod tabular;
pub mod types;

pub use engine::{ClassificationEngine, EngineError};
pub use ort_engine::OrtClassificationEngine;
pub use tabular::{
    IncomePrediction, IncomeRecord, OrtIncomePredictor, TabularError, TabularPredictor,
};
pub use types::{Classification, ComputeTarget, Image, ModelId, Orientation};
