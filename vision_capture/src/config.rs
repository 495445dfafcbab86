use serde::Deserialize;
use vision_classifier::{
    config::{ModelConfig, TabularModelConfig},
    Orientation,
};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub camera: CameraConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub income: Option<TabularModelConfig>,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: i32,
    #[serde(default = "default_frame_fps")]
    pub frame_fps: u64,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

fn default_frame_fps() -> u64 {
    30
}

fn fps_to_delay_ms(fps: u64) -> u64 {
    (1000.0 / fps.max(1) as f64).round() as u64
}

impl CameraConfig {
    pub fn get_frame_delay_ms(&self) -> u64 {
        fps_to_delay_ms(self.frame_fps)
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct TrackingConfig {
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_min_detail")]
    pub min_detail: f32,
    #[serde(default = "default_max_motion")]
    pub max_motion: f32,
}

fn default_warmup_frames() -> u32 {
    5
}

fn default_min_detail() -> f32 {
    6.0
}

fn default_max_motion() -> f32 {
    40.0
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            warmup_frames: default_warmup_frames(),
            min_detail: default_min_detail(),
            max_motion: default_max_motion(),
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct PipelineConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

fn default_confidence_threshold() -> f32 {
    0.5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct DisplayConfig {
    #[serde(default = "default_clear_label_after_secs")]
    pub clear_label_after_secs: f64,
}

fn default_clear_label_after_secs() -> f64 {
    5.0
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            clear_label_after_secs: default_clear_label_after_secs(),
        }
    }
}

impl DisplayConfig {
    pub fn clear_after(&self) -> Option<std::time::Duration> {
        if self.clear_label_after_secs > 0.0 {
            Some(std::time::Duration::from_secs_f64(
                self.clear_label_after_secs,
            ))
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("VC")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    check_values(&config).map_err(config::ConfigError::Message)?;

    Ok(config)
}

const MAX_CLEAR_LABEL_AFTER_SECS: f64 = 24.0 * 60.0 * 60.0;

fn check_values(config: &Config) -> Result<(), String> {
    if config.models.is_empty() {
        return Err("at least one model must be configured".to_string());
    }

    let threshold = config.pipeline.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(format!(
            "pipeline.confidence_threshold must be within [0, 1], got {}",
            threshold
        ));
    }

    let clear = config.display.clear_label_after_secs;
    if !clear.is_finite() || !(0.0..=MAX_CLEAR_LABEL_AFTER_SECS).contains(&clear) {
        return Err(format!(
            "display.clear_label_after_secs must be within [0, {}], got {}",
            MAX_CLEAR_LABEL_AFTER_SECS, clear
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vision_classifier::config::CropAndScale;

    const BASE: &str = r#"
log_level: debug
server:
  host: 127.0.0.1
  port: 8080
camera:
  frame_fps: 20
  orientation: right
models:
  - id: custom
    model_dir: models
    onnx_file: custom.onnx
    labels_file: custom.txt
  - id: inception
    model_dir: models
    onnx_file: inception.onnx
    labels_file: inception.txt
    input_size: 299
    compute_target: gpu
"#;

    fn parse(yaml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = parse(BASE);

        assert_eq!(config.log_level.as_str(), "debug");
        assert_eq!(config.server.get_address(), "127.0.0.1:8080");
        assert_eq!(config.camera.get_frame_delay_ms(), 50);
        assert_eq!(config.camera.orientation, Orientation::Right);
        assert_eq!(config.pipeline.confidence_threshold, 0.5);
        assert_eq!(
            config.display.clear_after(),
            Some(std::time::Duration::from_secs(5))
        );

        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].id.as_str(), "custom");
        assert_eq!(config.models[0].input_size, 224);
        assert_eq!(config.models[0].crop, CropAndScale::CenterCrop);
        assert!(config.models[0].enabled);
        assert_eq!(config.models[1].input_size, 299);
        assert_eq!(
            config.models[1].compute_target,
            vision_classifier::ComputeTarget::Gpu
        );
    }

    #[test]
    fn test_zero_clear_disables_self_clearing() {
        let config = parse(&format!("{}\ndisplay:\n  clear_label_after_secs: 0\n", BASE));
        assert_eq!(config.display.clear_after(), None);
    }

    #[test]
    fn test_log_level_and_environment() {
        assert!(LogLevel::try_from("INFO".to_string()).is_ok());
        assert!(LogLevel::try_from("trace".to_string()).is_err());
        assert_eq!(
            Environment::try_from("Production".to_string())
                .unwrap()
                .as_str(),
            "production"
        );
        assert!(Environment::try_from("staging".to_string()).is_err());
    }

    #[test]
    fn test_fps_to_delay() {
        assert_eq!(fps_to_delay_ms(30), 33);
        assert_eq!(fps_to_delay_ms(0), 1000);
    }

    #[test]
    fn test_check_values_rejects_out_of_range() {
        assert!(check_values(&parse(BASE)).is_ok());

        for secs in [f64::INFINITY, f64::NAN, 1e19, -1.0] {
            let mut config = parse(BASE);
            config.display.clear_label_after_secs = secs;
            let err = check_values(&config).unwrap_err();
            assert!(err.contains("clear_label_after_secs"), "{}", err);
        }

        for threshold in [1.5, -0.1, f32::NAN] {
            let mut config = parse(BASE);
            config.pipeline.confidence_threshold = threshold;
            let err = check_values(&config).unwrap_err();
            assert!(err.contains("confidence_threshold"), "{}", err);
        }

        let mut config = parse(BASE);
        config.models.clear();
        assert!(check_values(&config).is_err());
    }

    #[test]
    fn test_income_model_is_optional() {
        assert!(parse(BASE).income.is_none());

        let config = parse(&format!(
            "{}\nincome:\n  model_dir: models\n  onnx_file: adult_income.onnx\n",
            BASE
        ));
        let income = config.income.unwrap();
        assert_eq!(income.onnx_file, "adult_income.onnx");
        assert_eq!(income.classes, vec!["<=50K", ">50K"]);
    }
}
