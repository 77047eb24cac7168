use crate::error::ValidationError;
use crate::models::PredictionSet;
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://detect.roboflow.com";
pub const DEFAULT_MODEL_ID: &str = "microplastic_100/4";
pub const API_KEY_ENV: &str = "ROBOFLOW_API_KEY";

/// Extensions accepted for uploaded images
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("no API key configured; pass --api-key or set {API_KEY_ENV}")]
    MissingApiKey,

    #[error("image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("request to detection API failed: {0}")]
    Transport(String),

    #[error("detection API returned invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("detection API returned an unexpected response: {0}")]
    Invalid(#[from] ValidationError),

    #[error("failed to save results to {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type InferenceResult<T> = Result<T, InferenceError>;

/// Connection settings for the hosted detection model
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub api_url: String,
    pub model_id: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl DetectorConfig {
    /// Defaults with the API key taken from the environment, if set
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw response plus its validated predictions
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub raw: Value,
    pub predictions: PredictionSet,
}

/// Blocking client for the hosted detection API
pub struct Detector {
    config: DetectorConfig,
    api_key: String,
    agent: ureq::Agent,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> InferenceResult<Self> {
        let api_key = config.api_key.clone().ok_or(InferenceError::MissingApiKey)?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(config.timeout)
            .build();
        Ok(Self {
            config,
            api_key,
            agent,
        })
    }

    /// Model endpoint without the key
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.model_id
        )
    }

    /// Send an image file to the model and validate what comes back
    pub fn detect(&self, image_path: impl AsRef<Path>) -> InferenceResult<DetectionOutcome> {
        let image_path = image_path.as_ref();
        if !image_path.is_file() {
            return Err(InferenceError::ImageNotFound(image_path.to_path_buf()));
        }

        log::info!("Analyzing image: {}", image_path.display());
        let bytes = std::fs::read(image_path).map_err(|source| InferenceError::Read {
            path: image_path.to_path_buf(),
            source,
        })?;

        let raw = self.detect_bytes(&bytes)?;
        let predictions = PredictionSet::from_value(&raw)?;
        log::debug!("Model returned {} predictions", predictions.len());

        Ok(DetectionOutcome { raw, predictions })
    }

    /// Post already-loaded image bytes; returns the response JSON unvalidated
    pub fn detect_bytes(&self, bytes: &[u8]) -> InferenceResult<Value> {
        let body = request_body(bytes);
        let endpoint = self.endpoint();
        log::debug!("POST {} ({} bytes)", endpoint, body.len());

        let response = match self
            .agent
            .post(&endpoint)
            .query("api_key", &self.api_key)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(InferenceError::Status { status, body });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(InferenceError::Transport(transport.to_string()));
            }
        };

        let status = response.status();
        let text = response
            .into_string()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        if status != 200 {
            return Err(InferenceError::Status { status, body: text });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Detect and write the raw response as pretty JSON.
    ///
    /// Without `output`, results go to `<image stem>_results.json` in the
    /// working directory.
    pub fn detect_and_save(
        &self,
        image_path: impl AsRef<Path>,
        output: Option<&Path>,
    ) -> InferenceResult<(DetectionOutcome, PathBuf)> {
        let image_path = image_path.as_ref();
        let outcome = self.detect(image_path)?;
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_results_path(image_path));

        save_results(&outcome.raw, &output)?;
        log::info!("Results saved to: {}", output.display());
        Ok((outcome, output))
    }
}

/// The API expects the base64 image as a JSON string body
pub fn request_body(bytes: &[u8]) -> String {
    Value::String(B64.encode(bytes)).to_string()
}

pub fn save_results(raw: &Value, path: &Path) -> InferenceResult<()> {
    let text = serde_json::to_string_pretty(raw)?;
    std::fs::write(path, text).map_err(|source| InferenceError::Save {
        path: path.to_path_buf(),
        source,
    })
}

pub fn default_results_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    PathBuf::from(format!("{stem}_results.json"))
}

/// `photo.jpg` -> `photo_detected.jpg`, next to the input
pub fn default_annotated_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let name = match image_path.extension() {
        Some(ext) => format!("{stem}_detected.{}", ext.to_string_lossy()),
        None => format!("{stem}_detected.png"),
    };
    image_path.with_file_name(name)
}

/// Whether `path` has one of the accepted image extensions
pub fn is_allowed_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}
