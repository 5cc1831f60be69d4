use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{SpeechAudio, Synthesizer, cancellable};
use crate::{
    error::{Result, SlidecastError},
    types::Language,
};

pub const DEFAULT_LOCAL_URL: &str = "http://localhost:5108";
pub const LOCAL_URL_ENV: &str = "KOKOVOX_URL";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Speech service on the local machine. It answers with a finished WAV file.
pub struct LocalBackend {
    base_url: String,
    client: Client,
}

impl LocalBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Endpoint from `KOKOVOX_URL`, else the default port on localhost.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(LOCAL_URL_ENV).unwrap_or_else(|_| DEFAULT_LOCAL_URL.to_string()),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| SlidecastError::HealthCheckFailed {
                url: self.base_url.clone(),
                reason: e.to_string(),
            })?;

        if response.status() != StatusCode::OK {
            return Err(SlidecastError::HealthCheckFailed {
                url: self.base_url.clone(),
                reason: format!("health check returned status {}", response.status().as_u16()),
            });
        }

        info!(url = %self.base_url, "Local TTS service is healthy");
        Ok(())
    }

    async fn request(&self, text: &str, language: Language) -> Result<SpeechAudio> {
        let url = format!("{}/v1/audio/speech", self.base_url);
        debug!(url = %url, chars = text.chars().count(), "Requesting local TTS");

        let response = self
            .client
            .post(&url)
            .timeout(SYNTHESIS_TIMEOUT)
            .json(&serde_json::json!({
                "language": language.as_str(),
                "text": text,
            }))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SlidecastError::SynthesisFailed {
                backend: "local",
                reason: format!("TTS API returned status {}: {}", status.as_u16(), body),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(SlidecastError::SynthesisFailed {
                backend: "local",
                reason: "TTS API returned an empty body".to_string(),
            });
        }

        Ok(SpeechAudio::Container(bytes.to_vec()))
    }
}

#[async_trait]
impl Synthesizer for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn prepare(&self, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, self.health_check()).await
    }

    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        cancel: &CancellationToken,
    ) -> Result<SpeechAudio> {
        cancellable(cancel, self.request(text, language)).await
    }
}
