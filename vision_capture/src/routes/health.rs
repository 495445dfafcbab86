use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Status {
    status: String,
    classifying: bool,
}

pub async fn healthcheck(State(state): State<SharedState>) -> Json<Status> {
    Json(Status {
        status: "Available".into(),
        classifying: state.pipeline.gate().is_occupied(),
    })
}
