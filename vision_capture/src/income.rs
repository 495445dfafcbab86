use crate::display::SinkHandle;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use vision_classifier::{IncomePrediction, IncomeRecord, TabularError, TabularPredictor};

#[derive(Error, Debug)]
pub enum IncomeError {
    #[error("Income model is not configured")]
    Unavailable,
    #[error(transparent)]
    Tabular(#[from] TabularError),
    #[error("Income prediction task failed: {0}")]
    Task(String),
}

/// Partial edit of the current record. Absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct IncomeUpdate {
    pub age: Option<f64>,
    pub work_class: Option<String>,
    pub education: Option<String>,
    pub marital_status: Option<String>,
    pub occupation: Option<String>,
    pub relationship: Option<String>,
    pub race: Option<String>,
    pub sex: Option<String>,
    pub capital_gain: Option<f64>,
    pub capital_loss: Option<f64>,
    pub hours_per_week: Option<f64>,
    pub native_country: Option<String>,
}

impl IncomeUpdate {
    fn apply_to(self, record: &mut IncomeRecord) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        set(&mut record.age, self.age);
        set(&mut record.work_class, self.work_class);
        set(&mut record.education, self.education);
        set(&mut record.marital_status, self.marital_status);
        set(&mut record.occupation, self.occupation);
        set(&mut record.relationship, self.relationship);
        set(&mut record.race, self.race);
        set(&mut record.sex, self.sex);
        set(&mut record.capital_gain, self.capital_gain);
        set(&mut record.capital_loss, self.capital_loss);
        set(&mut record.hours_per_week, self.hours_per_week);
        set(&mut record.native_country, self.native_country);
    }
}

/// Holds the record being edited and re-predicts its income level after
/// every accepted change.
pub struct IncomeService {
    predictor: Arc<dyn TabularPredictor>,
    record: Mutex<IncomeRecord>,
    last: Mutex<Option<IncomePrediction>>,
    label: SinkHandle,
}

impl IncomeService {
    pub fn new(predictor: Arc<dyn TabularPredictor>, label: SinkHandle) -> Self {
        Self {
            predictor,
            record: Mutex::new(IncomeRecord::default()),
            last: Mutex::new(None),
            label,
        }
    }

    pub fn record(&self) -> IncomeRecord {
        self.record.lock().clone()
    }

    pub fn last_prediction(&self) -> Option<IncomePrediction> {
        self.last.lock().clone()
    }

    /// Applies `update` when every resulting value is allowed, then predicts.
    /// A rejected update leaves the record untouched.
    pub async fn update(&self, update: IncomeUpdate) -> Result<IncomePrediction, IncomeError> {
        let mut candidate = self.record();
        update.apply_to(&mut candidate);
        candidate.truncate_numbers();
        candidate.validate()?;

        *self.record.lock() = candidate;
        self.refresh().await
    }

    /// Predicts for the current record and shows the result on the label.
    pub async fn refresh(&self) -> Result<IncomePrediction, IncomeError> {
        let record = self.record();
        let predictor = self.predictor.clone();
        let prediction = tokio::task::spawn_blocking(move || predictor.predict(&record))
            .await
            .map_err(|e| IncomeError::Task(e.to_string()))?;

        match prediction {
            Ok(prediction) => {
                tracing::debug!(label = %prediction.label(), "Predicted income level");
                self.label.show(prediction.label());
                *self.last.lock() = Some(prediction.clone());
                Ok(prediction)
            }
            Err(e) => {
                tracing::warn!("Failed to infer income level: {}", e);
                Err(e.into())
            }
        }
    }
}
