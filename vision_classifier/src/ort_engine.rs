use crate::{
    config::{CropAndScale, ModelConfig, Validatable},
    engine::{ClassificationEngine, EngineError},
    labels::load_labels,
    types::{Classification, ComputeTarget, Image, ModelId, Orientation},
};
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array, Dimension, Ix4};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

fn transform_image(
    image: &Image,
    orientation: Orientation,
    crop: CropAndScale,
    size: u32,
) -> Result<Array<f32, Ix4>, String> {
    let original_img = image
        .to_dynamic()
        .ok_or_else(|| "pixel buffer does not match its dimensions".to_string())?;
    let upright = orientation.apply(original_img);
    let img = fit_to_square(upright, crop, size);

    let side = size as usize;
    let mut input = Array::zeros((1, 3, side, side));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    Ok(input)
}

fn fit_to_square(img: DynamicImage, crop: CropAndScale, size: u32) -> RgbImage {
    match crop {
        CropAndScale::CenterCrop => {
            let (width, height) = img.dimensions();
            let side = width.min(height);
            img.crop_imm((width - side) / 2, (height - side) / 2, side, side)
                .resize_exact(size, size, FilterType::CatmullRom)
                .to_rgb8()
        }
        CropAndScale::ScaleFit => {
            let fitted = img.resize(size, size, FilterType::CatmullRom).to_rgb8();
            let mut canvas = RgbImage::new(size, size);
            let x = (size - fitted.width()) / 2;
            let y = (size - fitted.height()) / 2;
            image::imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);
            canvas
        }
        CropAndScale::ScaleFill => img
            .resize_exact(size, size, FilterType::CatmullRom)
            .to_rgb8(),
    }
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn rank(
    model: &ModelId,
    scores: &[f32],
    labels: &[String],
    apply_softmax: bool,
    top_k: usize,
) -> Result<Vec<Classification>, EngineError> {
    if scores.len() != labels.len() {
        return Err(EngineError::LabelMismatch {
            model: model.clone(),
            labels: labels.len(),
            outputs: scores.len(),
        });
    }

    let probabilities = if apply_softmax {
        softmax(scores)
    } else {
        scores.to_vec()
    };

    let mut ranked: Vec<Classification> = labels
        .iter()
        .zip(probabilities)
        .map(|(label, confidence)| Classification::new(label.clone(), confidence))
        .collect();
    // stable: equal scores keep label order
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked.truncate(top_k);

    Ok(ranked)
}

pub(crate) fn build_session(path: &Path, target: ComputeTarget) -> Result<Session, String> {
    let builder = Session::builder()
        .map_err(|e| format!("failed to create session builder: {}", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| format!("failed to set optimization level: {}", e))?;

    let builder = match target {
        ComputeTarget::Cpu => builder,
        ComputeTarget::Gpu => builder
            .with_execution_providers([CUDAExecutionProvider::default()
                .build()
                .error_on_failure()])
            .map_err(|e| format!("failed to register CUDA execution provider: {}", e))?,
    };

    builder
        .commit_from_file(path)
        .map_err(|e| format!("failed to load {:?}: {}", path, e))
}

pub(crate) fn run_session<D: Dimension + 'static>(
    session: &mut Session,
    input: &Array<f32, D>,
) -> Result<Vec<f32>, EngineError> {
    let output_name = session
        .outputs
        .first()
        .map(|o| o.name.clone())
        .ok_or_else(|| EngineError::Inference("model declares no outputs".to_string()))?;

    let tensor_ref = TensorRef::from_array_view(input.view())
        .map_err(|e| EngineError::Inference(format!("failed to build tensor: {}", e)))?;

    let outputs = session
        .run(ort::inputs![tensor_ref])
        .map_err(|e| EngineError::Inference(format!("inference failed: {}", e)))?;

    let output = outputs
        .get(output_name.as_str())
        .ok_or_else(|| EngineError::Inference(format!("missing output {}", output_name)))?;

    let (_shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| EngineError::Inference(format!("failed to extract tensor: {}", e)))?;

    Ok(data.to_vec())
}

enum GpuSession {
    Unbuilt,
    Ready(Session),
    Unavailable,
}

struct LoadedModel {
    id: ModelId,
    path: PathBuf,
    labels: Vec<String>,
    input_size: u32,
    crop: CropAndScale,
    softmax: bool,
    top_k: usize,
    cpu: Mutex<Session>,
    gpu: Mutex<GpuSession>,
}

impl LoadedModel {
    fn load(config: &ModelConfig) -> Result<Self, EngineError> {
        let load_failed = |reason: String| EngineError::LoadFailed {
            model: config.id.clone(),
            reason,
        };

        config.validate().map_err(load_failed)?;
        let labels = load_labels(&config.get_labels_path())
            .map_err(|e| load_failed(format!("failed to load labels: {}", e)))?;
        let cpu = build_session(&config.get_path(), ComputeTarget::Cpu).map_err(load_failed)?;

        tracing::info!(
            model = %config.id,
            labels = labels.len(),
            input_size = config.input_size,
            "Loaded classification model"
        );

        Ok(Self {
            id: config.id.clone(),
            path: config.get_path(),
            labels,
            input_size: config.input_size,
            crop: config.crop,
            softmax: config.softmax,
            top_k: config.top_k,
            cpu: Mutex::new(cpu),
            gpu: Mutex::new(GpuSession::Unbuilt),
        })
    }

    fn infer(
        &self,
        input: &Array<f32, Ix4>,
        target: ComputeTarget,
    ) -> Result<Vec<f32>, EngineError> {
        if target == ComputeTarget::Gpu {
            let mut gpu = self.gpu.lock();
            if let GpuSession::Unbuilt = *gpu {
                *gpu = match build_session(&self.path, ComputeTarget::Gpu) {
                    Ok(session) => {
                        tracing::info!(model = %self.id, "Created GPU session");
                        GpuSession::Ready(session)
                    }
                    Err(e) => {
                        tracing::warn!(model = %self.id, "GPU unavailable, using CPU: {}", e);
                        GpuSession::Unavailable
                    }
                };
            }
            if let GpuSession::Ready(session) = &mut *gpu {
                return run_session(session, input);
            }
        }

        let mut session = self.cpu.lock();
        run_session(&mut session, input)
    }
}

/// Runs ONNX image classifiers, one session per model and compute target.
pub struct OrtClassificationEngine {
    models: Vec<LoadedModel>,
}

impl OrtClassificationEngine {
    pub fn new(configs: &[ModelConfig]) -> Result<Self, EngineError> {
        let models = configs
            .iter()
            .map(LoadedModel::load)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!("Created {} classification models", models.len());

        Ok(Self { models })
    }

    fn model(&self, id: &ModelId) -> Result<&LoadedModel, EngineError> {
        self.models
            .iter()
            .find(|m| &m.id == id)
            .ok_or_else(|| EngineError::UnknownModel(id.clone()))
    }
}

impl ClassificationEngine for OrtClassificationEngine {
    fn classify(
        &self,
        image: &Image,
        orientation: Orientation,
        model: &ModelId,
        target: ComputeTarget,
    ) -> Result<Vec<Classification>, EngineError> {
        let loaded = self.model(model)?;
        let input = transform_image(image, orientation, loaded.crop, loaded.input_size)
            .map_err(EngineError::InvalidImage)?;
        let scores = loaded.infer(&input, target)?;

        let ranked = rank(model, &scores, &loaded.labels, loaded.softmax, loaded.top_k)?;
        tracing::trace!(
            model = %model,
            target = target.as_str(),
            "Ranked {} classes",
            ranked.len()
        );

        Ok(ranked)
    }

    fn models(&self) -> Vec<ModelId> {
        self.models.iter().map(|m| m.id.clone()).collect()
    }
}
