use crate::types::{ComputeTarget, ModelId};
use serde::Deserialize;
use std::path::PathBuf;

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

/// How a frame is fitted into the square model input.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CropAndScale {
    #[default]
    CenterCrop,
    ScaleFit,
    ScaleFill,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub id: ModelId,
    pub model_dir: PathBuf,
    pub onnx_file: String,
    pub labels_file: String,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub crop: CropAndScale,
    #[serde(default = "default_softmax")]
    pub softmax: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub compute_target: ComputeTarget,
}

fn default_input_size() -> u32 {
    224
}

fn default_softmax() -> bool {
    true
}

fn default_top_k() -> usize {
    5
}

fn default_enabled() -> bool {
    true
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    pub fn get_labels_path(&self) -> PathBuf {
        self.model_dir.join(&self.labels_file)
    }
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        if !self.get_labels_path().exists() {
            return Err(format!("Labels file not found: {:?}", self.get_labels_path()));
        }
        if self.input_size == 0 {
            return Err(format!("Model {}: input_size must be positive", self.id));
        }
        if self.top_k == 0 {
            return Err(format!("Model {}: top_k must be positive", self.id));
        }
        Ok(())
    }
}

/// ONNX export of the census income classifier.
#[derive(Debug, Deserialize, Clone)]
pub struct TabularModelConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    #[serde(default = "default_income_classes")]
    pub classes: Vec<String>,
}

fn default_income_classes() -> Vec<String> {
    vec!["<=50K".to_string(), ">50K".to_string()]
}

impl TabularModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

impl Validatable for TabularModelConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        if self.classes.is_empty() {
            return Err("Income model needs at least one class".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn model_config(dir: PathBuf) -> ModelConfig {
        ModelConfig {
            id: ModelId::new("inception"),
            model_dir: dir,
            onnx_file: "inception.onnx".to_string(),
            labels_file: "inception.txt".to_string(),
            input_size: 299,
            crop: CropAndScale::CenterCrop,
            softmax: true,
            top_k: 5,
            enabled: true,
            compute_target: ComputeTarget::Cpu,
        }
    }

    #[test]
    fn test_validate_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = model_config(dir.path().to_path_buf());
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("Model file not found"));

        fs::write(dir.path().join("inception.onnx"), b"").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("Labels file not found"));

        fs::write(dir.path().join("inception.txt"), b"tench\n").unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("inception.onnx"), b"").unwrap();
        fs::write(dir.path().join("inception.txt"), b"tench\n").unwrap();

        let mut cfg = model_config(dir.path().to_path_buf());
        cfg.input_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = model_config(dir.path().to_path_buf());
        cfg.top_k = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_tabular_config_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = TabularModelConfig {
            model_dir: dir.path().to_path_buf(),
            onnx_file: "adult_income.onnx".to_string(),
            classes: default_income_classes(),
        };
        assert!(cfg.validate().is_err());

        fs::write(dir.path().join("adult_income.onnx"), b"").unwrap();
        assert!(cfg.validate().is_ok());

        cfg.classes.clear();
        assert!(cfg.validate().is_err());
    }
}
