use crate::{
    config::{TabularModelConfig, Validatable},
    engine::EngineError,
    ort_engine::{build_session, run_session},
    types::ComputeTarget,
};
use ndarray::Array2;
use ort::session::Session;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabularError {
    #[error("{value:?} is not a valid {field}")]
    InvalidValue { field: CategoricalField, value: String },
    #[error("{field} must be a finite number")]
    InvalidNumber { field: &'static str },
    #[error("Model declares {classes} classes but produced {outputs} probabilities")]
    ClassMismatch { classes: usize, outputs: usize },
    #[error("Failed to load income model: {0}")]
    LoadFailed(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The categorical columns of the census income model, in input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalField {
    WorkClass,
    Education,
    MaritalStatus,
    Occupation,
    Relationship,
    Race,
    Sex,
    NativeCountry,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 8] = [
        CategoricalField::WorkClass,
        CategoricalField::Education,
        CategoricalField::MaritalStatus,
        CategoricalField::Occupation,
        CategoricalField::Relationship,
        CategoricalField::Race,
        CategoricalField::Sex,
        CategoricalField::NativeCountry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoricalField::WorkClass => "work_class",
            CategoricalField::Education => "education",
            CategoricalField::MaritalStatus => "marital_status",
            CategoricalField::Occupation => "occupation",
            CategoricalField::Relationship => "relationship",
            CategoricalField::Race => "race",
            CategoricalField::Sex => "sex",
            CategoricalField::NativeCountry => "native_country",
        }
    }

    /// Allowed values, sorted.
    pub fn allowed_values(&self) -> Vec<&'static str> {
        let mut values = self.raw_values().to_vec();
        values.sort_unstable();
        values
    }

    pub fn allows(&self, value: &str) -> bool {
        self.raw_values().contains(&value)
    }

    fn raw_values(&self) -> &'static [&'static str] {
        match self {
            CategoricalField::WorkClass => &[
                "Private",
                "Self-emp-not-inc",
                "Self-emp-inc",
                "Federal-gov",
                "Local-gov",
                "State-gov",
                "Without-pay",
                "Never-worked",
            ],
            CategoricalField::Education => &[
                "Bachelors",
                "Some-college",
                "11th",
                "HS-grad",
                "Prof-school",
                "Assoc-acdm",
                "Assoc-voc",
                "9th",
                "7th-8th",
                "12th",
                "Masters",
                "1st-4th",
                "10th",
                "Doctorate",
                "5th-6th",
                "Preschool",
            ],
            CategoricalField::MaritalStatus => &[
                "Married-civ-spouse",
                "Divorced",
                "Never-married",
                "Separated",
                "Widowed",
                "Married-spouse-absent",
                "Married-AF-spouse",
            ],
            CategoricalField::Occupation => &[
                "Tech-support",
                "Craft-repair",
                "Other-service",
                "Sales",
                "Exec-managerial",
                "Prof-specialty",
                "Handlers-cleaners",
                "Machine-op-inspct",
                "Adm-clerical",
                "Farming-fishing",
                "Transport-moving",
                "Priv-house-serv",
                "Protective-serv",
                "Armed-Forces",
            ],
            CategoricalField::Relationship => &[
                "Wife",
                "Own-child",
                "Husband",
                "Not-in-family",
                "Other-relative",
                "Unmarried",
            ],
            CategoricalField::Race => &[
                "White",
                "Asian-Pac-Islander",
                "Amer-Indian-Eskimo",
                "Other",
                "Black",
            ],
            CategoricalField::Sex => &["Male", "Female"],
            CategoricalField::NativeCountry => &[
                "United-States",
                "Cambodia",
                "England",
                "Puerto-Rico",
                "Canada",
                "Germany",
                "Outlying-US(Guam-USVI-etc)",
                "India",
                "Japan",
                "Greece",
                "South",
                "China",
                "Cuba",
                "Iran",
                "Honduras",
                "Philippines",
                "Italy",
                "Poland",
                "Jamaica",
                "Vietnam",
                "Mexico",
                "Portugal",
                "Ireland",
                "France",
                "Dominican-Republic",
                "Laos",
                "Ecuador",
                "Taiwan",
                "Haiti",
                "Columbia",
                "Hungary",
                "Guatemala",
                "Nicaragua",
                "Scotland",
                "Thailand",
                "Yugoslavia",
                "El-Salvador",
                "Trinadad&Tobago",
                "Peru",
                "Hong",
                "Holand-Netherlands",
            ],
        }
    }
}

impl fmt::Display for CategoricalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One census record as the income model sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub age: f64,
    pub work_class: String,
    pub education: String,
    pub marital_status: String,
    pub occupation: String,
    pub relationship: String,
    pub race: String,
    pub sex: String,
    pub capital_gain: f64,
    pub capital_loss: f64,
    pub hours_per_week: f64,
    pub native_country: String,
}

impl Default for IncomeRecord {
    fn default() -> Self {
        Self {
            age: 35.0,
            work_class: "Private".to_string(),
            education: "HS-grad".to_string(),
            marital_status: "Never-married".to_string(),
            occupation: "Tech-support".to_string(),
            relationship: "Own-child".to_string(),
            race: "White".to_string(),
            sex: "Male".to_string(),
            capital_gain: 0.0,
            capital_loss: 0.0,
            hours_per_week: 40.0,
            native_country: "United-States".to_string(),
        }
    }
}

impl IncomeRecord {
    pub fn categorical(&self, field: CategoricalField) -> &str {
        match field {
            CategoricalField::WorkClass => &self.work_class,
            CategoricalField::Education => &self.education,
            CategoricalField::MaritalStatus => &self.marital_status,
            CategoricalField::Occupation => &self.occupation,
            CategoricalField::Relationship => &self.relationship,
            CategoricalField::Race => &self.race,
            CategoricalField::Sex => &self.sex,
            CategoricalField::NativeCountry => &self.native_country,
        }
    }

    pub fn numeric(&self) -> [(&'static str, f64); 4] {
        [
            ("age", self.age),
            ("capital_gain", self.capital_gain),
            ("capital_loss", self.capital_loss),
            ("hours_per_week", self.hours_per_week),
        ]
    }

    /// Checks every categorical value against its allowed set and every
    /// number for finiteness.
    pub fn validate(&self) -> Result<(), TabularError> {
        for field in CategoricalField::ALL {
            let value = self.categorical(field);
            if !field.allows(value) {
                return Err(TabularError::InvalidValue {
                    field,
                    value: value.to_string(),
                });
            }
        }
        for (field, value) in self.numeric() {
            if !value.is_finite() {
                return Err(TabularError::InvalidNumber { field });
            }
        }
        Ok(())
    }

    /// Drops the fractional part of every number, the way the inputs are
    /// bucketed for the model.
    pub fn truncate_numbers(&mut self) {
        self.age = self.age.trunc();
        self.capital_gain = self.capital_gain.trunc();
        self.capital_loss = self.capital_loss.trunc();
        self.hours_per_week = self.hours_per_week.trunc();
    }

    /// Numbers first, then one one-hot block per categorical field over its
    /// sorted allowed values.
    pub fn encode(&self) -> Result<Array2<f32>, TabularError> {
        self.validate()?;

        let mut features: Vec<f32> = self.numeric().iter().map(|(_, v)| *v as f32).collect();
        for field in CategoricalField::ALL {
            let value = self.categorical(field);
            features.extend(
                field
                    .allowed_values()
                    .into_iter()
                    .map(|allowed| if allowed == value { 1.0 } else { 0.0 }),
            );
        }

        Ok(Array2::from_shape_fn((1, features.len()), |(_, i)| features[i]))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomePrediction {
    pub income_level: String,
    pub probability: f64,
}

impl IncomePrediction {
    /// `"<=50K : 0.87%"`. The probability is printed as the model reports it.
    pub fn label(&self) -> String {
        format!("{} : {:.2}%", self.income_level, self.probability)
    }
}

pub trait TabularPredictor: Send + Sync + 'static {
    fn predict(&self, record: &IncomeRecord) -> Result<IncomePrediction, TabularError>;
}

fn pick_class(
    classes: &[String],
    probabilities: &[f32],
) -> Result<IncomePrediction, TabularError> {
    if classes.len() != probabilities.len() || classes.is_empty() {
        return Err(TabularError::ClassMismatch {
            classes: classes.len(),
            outputs: probabilities.len(),
        });
    }

    // first class wins a tie
    let (index, probability) = probabilities
        .iter()
        .enumerate()
        .fold((0, probabilities[0]), |best, (i, &p)| {
            if p > best.1 {
                (i, p)
            } else {
                best
            }
        });

    Ok(IncomePrediction {
        income_level: classes[index].clone(),
        probability: probability as f64,
    })
}

/// Income classifier exported to ONNX with a single float feature input and
/// a class probability output.
pub struct OrtIncomePredictor {
    session: Mutex<Session>,
    classes: Vec<String>,
}

impl OrtIncomePredictor {
    pub fn new(config: &TabularModelConfig) -> Result<Self, TabularError> {
        config.validate().map_err(TabularError::LoadFailed)?;
        let session = build_session(&config.get_path(), ComputeTarget::Cpu)
            .map_err(TabularError::LoadFailed)?;

        tracing::info!(classes = ?config.classes, "Loaded income model");

        Ok(Self {
            session: Mutex::new(session),
            classes: config.classes.clone(),
        })
    }
}

impl TabularPredictor for OrtIncomePredictor {
    fn predict(&self, record: &IncomeRecord) -> Result<IncomePrediction, TabularError> {
        let input = record.encode()?;
        let probabilities = {
            let mut session = self.session.lock();
            run_session(&mut session, &input)?
        };
        pick_class(&self.classes, &probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let record = IncomeRecord::default();
        assert!(record.validate().is_ok());
        assert_eq!(record.age, 35.0);
        assert_eq!(record.hours_per_week, 40.0);
        assert_eq!(record.native_country, "United-States");
    }

    #[test]
    fn test_allowed_values_are_sorted() {
        let work = CategoricalField::WorkClass.allowed_values();
        assert_eq!(work.first(), Some(&"Federal-gov"));
        assert_eq!(work.last(), Some(&"Without-pay"));

        let education = CategoricalField::Education.allowed_values();
        assert_eq!(&education[..3], &["10th", "11th", "12th"]);

        for field in CategoricalField::ALL {
            let values = field.allowed_values();
            assert!(values.windows(2).all(|w| w[0] < w[1]), "{} not sorted", field);
        }
    }

    #[test]
    fn test_out_of_set_value_is_rejected() {
        let record = IncomeRecord {
            occupation: "Astronaut".to_string(),
            ..IncomeRecord::default()
        };

        let err = record.validate().unwrap_err();
        assert!(matches!(
            err,
            TabularError::InvalidValue {
                field: CategoricalField::Occupation,
                ..
            }
        ));
        assert!(record.encode().is_err());
    }

    #[test]
    fn test_non_finite_number_is_rejected() {
        let record = IncomeRecord {
            hours_per_week: f64::NAN,
            ..IncomeRecord::default()
        };
        assert!(matches!(
            record.validate(),
            Err(TabularError::InvalidNumber {
                field: "hours_per_week"
            })
        ));
    }

    #[test]
    fn test_truncate_numbers_rounds_toward_zero() {
        let mut record = IncomeRecord {
            age: 41.9,
            capital_gain: 1234.7,
            capital_loss: -0.5,
            hours_per_week: 39.99,
            ..IncomeRecord::default()
        };
        record.truncate_numbers();

        assert_eq!(record.age, 41.0);
        assert_eq!(record.capital_gain, 1234.0);
        assert_eq!(record.capital_loss, 0.0);
        assert_eq!(record.hours_per_week, 39.0);
    }

    #[test]
    fn test_encode_layout() {
        let record = IncomeRecord::default();
        let input = record.encode().unwrap();

        let categories: usize = CategoricalField::ALL
            .iter()
            .map(|f| f.allowed_values().len())
            .sum();
        assert_eq!(input.shape(), &[1, 4 + categories]);
        assert_eq!(input[[0, 0]], 35.0);
        assert_eq!(input[[0, 3]], 40.0);

        // work class block starts right after the numbers; "Private" is fourth
        let work = CategoricalField::WorkClass.allowed_values();
        let private = work.iter().position(|v| *v == "Private").unwrap();
        assert_eq!(private, 3);
        assert_eq!(input[[0, 4 + private]], 1.0);
        assert_eq!(input.iter().filter(|v| **v == 1.0).count(), 8);
    }

    #[test]
    fn test_pick_class() {
        let classes = vec!["<=50K".to_string(), ">50K".to_string()];

        let prediction = pick_class(&classes, &[0.25, 0.75]).unwrap();
        assert_eq!(prediction.income_level, ">50K");
        assert_eq!(prediction.probability, 0.75);

        let tie = pick_class(&classes, &[0.5, 0.5]).unwrap();
        assert_eq!(tie.income_level, "<=50K");

        assert!(matches!(
            pick_class(&classes, &[1.0]),
            Err(TabularError::ClassMismatch {
                classes: 2,
                outputs: 1
            })
        ));
    }

    #[test]
    fn test_label_format() {
        let prediction = IncomePrediction {
            income_level: "<=50K".to_string(),
            probability: 0.8764,
        };
        assert_eq!(prediction.label(), "<=50K : 0.88%");
    }

    #[test]
    fn test_missing_model_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = TabularModelConfig {
            model_dir: dir.path().to_path_buf(),
            onnx_file: "adult_income.onnx".to_string(),
            classes: vec!["<=50K".to_string(), ">50K".to_string()],
        };

        let err = OrtIncomePredictor::new(&config).err().unwrap();
        assert!(matches!(err, TabularError::LoadFailed(_)));
    }
}
