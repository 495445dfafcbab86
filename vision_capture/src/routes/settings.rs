use crate::{
    selection::{ModelSetting, SelectionError},
    server::SharedState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use vision_classifier::{ComputeTarget, ModelId};

#[derive(Serialize)]
pub struct SettingsResponse {
    models: Vec<ModelSetting>,
}

#[derive(Deserialize)]
pub struct GpuUpdate {
    use_gpu: bool,
}

#[derive(Deserialize)]
pub struct ModelUpdate {
    enabled: Option<bool>,
    compute_target: Option<ComputeTarget>,
}

impl IntoResponse for SelectionError {
    fn into_response(self) -> Response {
        let status = match self {
            SelectionError::UnknownModel(_) => StatusCode::NOT_FOUND,
        };
        (status, self.to_string()).into_response()
    }
}

pub async fn get_settings(State(state): State<SharedState>) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        models: state.selection.view(),
    })
}

pub async fn set_gpu(
    State(state): State<SharedState>,
    Json(update): Json<GpuUpdate>,
) -> Json<SettingsResponse> {
    state.selection.set_use_gpu(update.use_gpu);
    get_settings(State(state)).await
}

pub async fn update_model(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(update): Json<ModelUpdate>,
) -> Result<Json<SettingsResponse>, SelectionError> {
    let id = ModelId::new(id);
    if !state.selection.view().iter().any(|m| m.id == id) {
        return Err(SelectionError::UnknownModel(id));
    }
    if let Some(enabled) = update.enabled {
        state.selection.set_enabled(&id, enabled)?;
    }
    if let Some(target) = update.compute_target {
        state.selection.set_compute_target(&id, target)?;
    }
    Ok(get_settings(State(state)).await)
}
