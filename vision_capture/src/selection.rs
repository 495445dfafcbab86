use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;
use vision_classifier::{config::ModelConfig, ComputeTarget, ModelId};

#[derive(Error, Debug, PartialEq)]
pub enum SelectionError {
    #[error("Unknown model: {0}")]
    UnknownModel(ModelId),
}

#[derive(Debug)]
struct ModelToggle {
    id: ModelId,
    enabled: AtomicBool,
    gpu: AtomicBool,
}

/// A model that takes part in a classification request.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveModel {
    pub id: ModelId,
    pub target: ComputeTarget,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSetting {
    pub id: ModelId,
    pub enabled: bool,
    pub compute_target: ComputeTarget,
}

/// Which models run and where. Written from the settings surface while the
/// classification worker reads it; every field is its own atomic so a read
/// never observes a torn entry. Clones share the same toggles.
#[derive(Debug, Clone)]
pub struct EngineSelection {
    models: Arc<Vec<ModelToggle>>,
}

impl EngineSelection {
    pub fn new(models: impl IntoIterator<Item = ModelSetting>) -> Self {
        let models = models
            .into_iter()
            .map(|setting| ModelToggle {
                id: setting.id,
                enabled: AtomicBool::new(setting.enabled),
                gpu: AtomicBool::new(setting.compute_target == ComputeTarget::Gpu),
            })
            .collect();
        Self {
            models: Arc::new(models),
        }
    }

    pub fn from_configs(configs: &[ModelConfig]) -> Self {
        Self::new(configs.iter().map(|c| ModelSetting {
            id: c.id.clone(),
            enabled: c.enabled,
            compute_target: c.compute_target,
        }))
    }

    /// Enabled models in configuration order.
    pub fn snapshot(&self) -> Vec<ActiveModel> {
        self.models
            .iter()
            .filter(|m| m.enabled.load(Ordering::Acquire))
            .map(|m| ActiveModel {
                id: m.id.clone(),
                target: target_of(&m.gpu),
            })
            .collect()
    }

    pub fn view(&self) -> Vec<ModelSetting> {
        self.models
            .iter()
            .map(|m| ModelSetting {
                id: m.id.clone(),
                enabled: m.enabled.load(Ordering::Acquire),
                compute_target: target_of(&m.gpu),
            })
            .collect()
    }

    pub fn set_enabled(&self, id: &ModelId, enabled: bool) -> Result<(), SelectionError> {
        self.toggle(id)?.enabled.store(enabled, Ordering::Release);
        tracing::info!(model = %id, enabled, "Model selection changed");
        Ok(())
    }

    pub fn set_compute_target(
        &self,
        id: &ModelId,
        target: ComputeTarget,
    ) -> Result<(), SelectionError> {
        self.toggle(id)?
            .gpu
            .store(target == ComputeTarget::Gpu, Ordering::Release);
        tracing::info!(model = %id, target = target.as_str(), "Compute target changed");
        Ok(())
    }

    /// Moves every model to the GPU or back to the CPU.
    pub fn set_use_gpu(&self, use_gpu: bool) {
        for model in self.models.iter() {
            model.gpu.store(use_gpu, Ordering::Release);
        }
        tracing::info!(use_gpu, "Compute target changed for all models");
    }

    fn toggle(&self, id: &ModelId) -> Result<&ModelToggle, SelectionError> {
        self.models
            .iter()
            .find(|m| &m.id == id)
            .ok_or_else(|| SelectionError::UnknownModel(id.clone()))
    }
}

fn target_of(gpu: &AtomicBool) -> ComputeTarget {
    if gpu.load(Ordering::Acquire) {
        ComputeTarget::Gpu
    } else {
        ComputeTarget::Cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> EngineSelection {
        EngineSelection::new([
            ModelSetting {
                id: ModelId::new("custom"),
                enabled: true,
                compute_target: ComputeTarget::Cpu,
            },
            ModelSetting {
                id: ModelId::new("inception"),
                enabled: true,
                compute_target: ComputeTarget::Cpu,
            },
        ])
    }

    fn ids(models: &[ActiveModel]) -> Vec<&str> {
        models.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_snapshot_keeps_order_and_skips_disabled() {
        let selection = selection();
        assert_eq!(ids(&selection.snapshot()), vec!["custom", "inception"]);

        selection
            .set_enabled(&ModelId::new("custom"), false)
            .unwrap();
        assert_eq!(ids(&selection.snapshot()), vec!["inception"]);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_writes() {
        let selection = selection();
        let snapshot = selection.snapshot();

        selection.set_use_gpu(true);
        selection
            .set_enabled(&ModelId::new("inception"), false)
            .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|m| m.target == ComputeTarget::Cpu));
        assert_eq!(selection.snapshot()[0].target, ComputeTarget::Gpu);
    }

    #[test]
    fn test_clones_share_toggles() {
        let selection = selection();
        let settings_view = selection.clone();

        settings_view
            .set_compute_target(&ModelId::new("inception"), ComputeTarget::Gpu)
            .unwrap();

        let view = selection.view();
        assert_eq!(view[0].compute_target, ComputeTarget::Cpu);
        assert_eq!(view[1].compute_target, ComputeTarget::Gpu);
    }

    #[test]
    fn test_unknown_model() {
        let err = selection()
            .set_enabled(&ModelId::new("resnet"), true)
            .unwrap_err();
        assert_eq!(err, SelectionError::UnknownModel(ModelId::new("resnet")));
    }

    #[test]
    fn test_concurrent_toggling_never_tears() {
        let selection = selection();
        let writer = {
            let selection = selection.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    selection.set_use_gpu(i % 2 == 0);
                    selection
                        .set_enabled(&ModelId::new("custom"), i % 3 != 0)
                        .unwrap();
                }
            })
        };

        for _ in 0..1000 {
            let snapshot = selection.snapshot();
            assert!(!snapshot.is_empty());
            assert!(snapshot.iter().any(|m| m.id.as_str() == "inception"));
        }
        writer.join().unwrap();
    }
}
