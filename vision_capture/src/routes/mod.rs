mod health;
mod income;
mod labels;
mod metrics;
mod settings;

use crate::server::SharedState;
use axum::{
    routing::{get, put},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/labels", get(labels::current_labels))
        .route("/settings", get(settings::get_settings))
        .route("/settings/gpu", put(settings::set_gpu))
        .route("/settings/models/{id}", put(settings::update_model))
        .route("/income", get(income::get_income).put(income::update_income))
}
