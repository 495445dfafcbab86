use crate::{display::SinkTarget, gate::GateStats, server::SharedState};
use axum::{extract::State, response::Json};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
pub struct LabelsResponse {
    status: String,
    labels: BTreeMap<String, String>,
    income: Option<String>,
    gate: GateStats,
}

pub async fn current_labels(State(state): State<SharedState>) -> Json<LabelsResponse> {
    Json(LabelsResponse {
        status: state.board.get(&SinkTarget::Status).unwrap_or_default(),
        labels: state.board.model_labels(),
        income: state.board.get(&SinkTarget::Income),
        gate: state.pipeline.gate().stats(),
    })
}
