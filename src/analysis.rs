use crate::capture::ImageHandle;
use crate::error::{AnalysisError, describe_transport};
use crate::presentation::{PresentationToken, StressBand, emotion};
use crate::service::{ANALYZE_PATH, ServiceConfig};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const IMAGE_FIELD: &str = "image";
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";
const IMAGE_FILE_NAME: &str = "scan.jpg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Always within `0..=100`.
    pub stress_level: u8,
    /// Lower-cased label as returned by the service.
    pub emotion_label: String,
    pub explanation: String,
}

impl AnalysisResult {
    pub fn presentation(&self) -> PresentationToken {
        emotion(&self.emotion_label)
    }

    pub fn band(&self) -> StressBand {
        StressBand::for_level(self.stress_level)
    }
}

/// Single-attempt analysis of one image. Retrying is the caller's decision.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, image: ImageHandle) -> Result<AnalysisResult, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct HttpAnalyzer {
    client: Client,
    endpoint: String,
}

impl HttpAnalyzer {
    pub fn new(service: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            client: service.build_client()?,
            endpoint: service.endpoint(ANALYZE_PATH),
        })
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, image: ImageHandle) -> Result<AnalysisResult, AnalysisError> {
        if image.is_empty() {
            return Err(AnalysisError::EmptyImage);
        }
        let (info, bytes) = image.into_parts();
        info!(uri = %info.source_uri, bytes = bytes.len(), "submitting scan for analysis");

        let form = Form::new().part(IMAGE_FIELD, image_part(bytes, IMAGE_CONTENT_TYPE)?);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "analysis request failed");
                AnalysisError::Transport(describe_transport(&err))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "analysis service rejected scan");
            return Err(AnalysisError::Service {
                status_code: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| AnalysisError::Transport(describe_transport(&err)))?;
        let json: Value = serde_json::from_str(&body).map_err(|err| {
            error!(error = %err, "analysis response is not JSON");
            AnalysisError::Protocol(format!("invalid JSON: {err}"))
        })?;

        let result = parse_analysis(&json).inspect_err(|err| {
            error!(error = %err, "analysis response failed validation");
        })?;
        debug!(
            stress_level = result.stress_level,
            emotion = %result.emotion_label,
            "analysis complete"
        );
        Ok(result)
    }
}

/// Builds the multipart upload part. Nothing has been sent yet if this fails.
fn image_part(bytes: Vec<u8>, content_type: &str) -> Result<Part, AnalysisError> {
    Part::bytes(bytes)
        .file_name(IMAGE_FILE_NAME)
        .mime_str(content_type)
        .map_err(|err| AnalysisError::Protocol(format!("invalid upload content type: {err}")))
}

/// Validates `{ stress_level, emotion, explanation }`.
///
/// Out-of-range stress levels are rejected rather than clamped.
pub fn parse_analysis(root: &Value) -> Result<AnalysisResult, AnalysisError> {
    let stress = root
        .get("stress_level")
        .ok_or_else(|| protocol("missing stress_level"))?
        .as_f64()
        .ok_or_else(|| protocol("stress_level is not a number"))?;
    if !(0.0..=100.0).contains(&stress) {
        return Err(protocol(format!("stress_level {stress} outside 0-100")));
    }

    let emotion_label = root
        .get("emotion")
        .and_then(Value::as_str)
        .ok_or_else(|| protocol("missing emotion"))?
        .trim()
        .to_lowercase();
    let explanation = root
        .get("explanation")
        .and_then(Value::as_str)
        .ok_or_else(|| protocol("missing explanation"))?
        .to_string();

    Ok(AnalysisResult {
        stress_level: stress.round() as u8,
        emotion_label,
        explanation,
    })
}

fn protocol(message: impl Into<String>) -> AnalysisError {
    AnalysisError::Protocol(message.into())
}

/// Offline analyzer answering with a fixed result after a delay.
#[derive(Debug, Clone)]
pub struct ScriptedAnalyzer {
    result: AnalysisResult,
    delay: Duration,
}

impl ScriptedAnalyzer {
    pub fn new(result: AnalysisResult, delay: Duration) -> Self {
        Self { result, delay }
    }

    pub fn placeholder() -> Self {
        Self::new(
            AnalysisResult {
                stress_level: 65,
                emotion_label: "fear".to_string(),
                explanation: "Tension around the brow and jaw suggests elevated stress."
                    .to_string(),
            },
            Duration::from_secs(2),
        )
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, image: ImageHandle) -> Result<AnalysisResult, AnalysisError> {
        if image.is_empty() {
            return Err(AnalysisError::EmptyImage);
        }
        tokio::time::sleep(self.delay).await;
        Ok(self.result.clone())
    }
}
