use crate::{
    income::{IncomeError, IncomeService, IncomeUpdate},
    server::SharedState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use vision_classifier::{tabular::CategoricalField, IncomePrediction, IncomeRecord, TabularError};

#[derive(Serialize)]
pub struct IncomeResponse {
    record: IncomeRecord,
    fields: BTreeMap<&'static str, Vec<&'static str>>,
    prediction: Option<IncomePrediction>,
    label: Option<String>,
}

impl IntoResponse for IncomeError {
    fn into_response(self) -> Response {
        let status = match &self {
            IncomeError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            IncomeError::Tabular(
                TabularError::InvalidValue { .. } | TabularError::InvalidNumber { .. },
            ) => StatusCode::BAD_REQUEST,
            IncomeError::Tabular(_) | IncomeError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

fn service(state: &SharedState) -> Result<&Arc<IncomeService>, IncomeError> {
    state.income.as_ref().ok_or(IncomeError::Unavailable)
}

fn describe(income: &IncomeService) -> IncomeResponse {
    let prediction = income.last_prediction();
    IncomeResponse {
        record: income.record(),
        fields: CategoricalField::ALL
            .iter()
            .map(|field| (field.as_str(), field.allowed_values()))
            .collect(),
        label: prediction.as_ref().map(IncomePrediction::label),
        prediction,
    }
}

pub async fn get_income(
    State(state): State<SharedState>,
) -> Result<Json<IncomeResponse>, IncomeError> {
    Ok(Json(describe(service(&state)?)))
}

pub async fn update_income(
    State(state): State<SharedState>,
    Json(update): Json<IncomeUpdate>,
) -> Result<Json<IncomeResponse>, IncomeError> {
    let income = service(&state)?;
    income.update(update).await?;
    Ok(Json(describe(income)))
}
