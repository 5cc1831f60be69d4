use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{SpeechAudio, Synthesizer, cancellable};
use crate::{
    error::{Result, SlidecastError},
    keys::KeyPool,
    types::Language,
    wav::PcmFormat,
};

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model: String,
    pub voice: String,
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash-preview-tts".to_string(),
            voice: "Iapetus".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Generative speech API, rotating through a pool of API keys.
pub struct RemoteBackend {
    keys: Arc<KeyPool>,
    config: RemoteConfig,
    client: Client,
}

impl RemoteBackend {
    pub fn new(keys: Arc<KeyPool>, config: RemoteConfig) -> Self {
        Self {
            keys,
            config,
            client: Client::new(),
        }
    }

    pub fn keys(&self) -> &KeyPool {
        &self.keys
    }

    async fn request(&self, text: &str, api_key: &str) -> Result<SpeechAudio> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.config.timeout)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&serde_json::json!({
                "contents": [
                    {
                        "parts": [{ "text": text }],
                    },
                ],
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": {
                                "voiceName": &self.config.voice,
                            },
                        },
                    },
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlidecastError::RemoteRequest {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body = response.json::<Value>().await?;
        extract_audio(&body)
    }
}

#[async_trait]
impl Synthesizer for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    /// One attempt per key at most. Retryable failures move on to the next
    /// key; anything else ends the loop at once.
    ///
    /// The starting key is taken from the shared cursor once, so concurrent
    /// requests on the same pool still visit every key.
    async fn synthesize(
        &self,
        text: &str,
        _language: Language,
        cancel: &CancellationToken,
    ) -> Result<SpeechAudio> {
        let attempts = self.keys.len();
        let (start, _) = self.keys.next_key();
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                self.keys.next_key();
            }
            let index = (start + attempt) % attempts;
            let api_key = self.keys.key(index);
            debug!(key = index + 1, attempt = attempt + 1, "Requesting remote TTS");

            match cancellable(cancel, self.request(text, api_key)).await {
                Ok(audio) => {
                    info!(key = index + 1, "Remote TTS succeeded");
                    return Ok(audio);
                }
                Err(e) if e.is_retryable() => {
                    warn!(key = index + 1, attempt = attempt + 1, error = %e, "Retryable TTS error, trying next key");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        warn!(attempts, "All API keys exhausted");
        Err(last_error.unwrap_or(SlidecastError::NoApiKeys))
    }
}

/// Pull the first inline audio part out of a `generateContent` response.
fn extract_audio(body: &Value) -> Result<SpeechAudio> {
    let candidates = body["candidates"].as_array().map_or(&[][..], Vec::as_slice);
    let Some(candidate) = candidates.first() else {
        return Err(SlidecastError::EmptyAudio {
            reason: "no candidates".to_string(),
        });
    };

    let parts = candidate["content"]["parts"]
        .as_array()
        .map_or(&[][..], Vec::as_slice);
    if parts.is_empty() {
        return Err(SlidecastError::EmptyAudio {
            reason: "no content parts".to_string(),
        });
    }

    let Some(inline) = parts
        .iter()
        .map(|part| &part["inlineData"])
        .find(|inline| inline["data"].is_string())
    else {
        return Err(SlidecastError::EmptyAudio {
            reason: "no inline audio data".to_string(),
        });
    };

    let data = STANDARD
        .decode(inline["data"].as_str().unwrap_or_default())
        .map_err(|e| SlidecastError::EmptyAudio {
            reason: format!("invalid base64 payload: {e}"),
        })?;
    if data.is_empty() {
        return Err(SlidecastError::EmptyAudio {
            reason: "inline audio data is empty".to_string(),
        });
    }

    let format = inline["mimeType"]
        .as_str()
        .and_then(sample_rate_from_mime)
        .map_or(PcmFormat::REMOTE, |sample_rate| PcmFormat {
            sample_rate,
            ..PcmFormat::REMOTE
        });

    Ok(SpeechAudio::Pcm { data, format })
}

/// `audio/L16;codec=pcm;rate=24000` -> 24000
fn sample_rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
}

/// The API wraps failures as `{"error": {"status": .., "message": ..}}`.
fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let error = &json["error"];
    match (error["status"].as_str(), error["message"].as_str()) {
        (Some(status), Some(message)) => format!("{status}: {message}"),
        (None, Some(message)) => message.to_string(),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server, ServerGuard};

    use super::*;

    const PATH: &str = "/v1beta/models/gemini-2.5-flash-preview-tts:generateContent";

    fn backend(server: &ServerGuard, keys: &[&str]) -> RemoteBackend {
        RemoteBackend::new(
            Arc::new(KeyPool::new(keys).unwrap()),
            RemoteConfig {
                base_url: server.url(),
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
    }

    fn audio_body(pcm: &[u8]) -> String {
        serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "inlineData": {
                            "mimeType": "audio/L16;codec=pcm;rate=24000",
                            "data": STANDARD.encode(pcm),
                        }
                    }]
                }
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn persistent_rate_limit_tries_each_key_once() {
        let mut server = Server::new_async().await;
        let limited = server
            .mock("POST", PATH)
            .with_status(429)
            .with_body(r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"quota"}}"#)
            .expect(3)
            .create_async()
            .await;

        let backend = backend(&server, &["k1", "k2", "k3"]);
        let start = backend.keys().cursor();
        let err = backend
            .synthesize("hi", Language::En, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SlidecastError::RemoteRequest { status: 429, .. }));
        assert_eq!(backend.keys().cursor(), start);
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_requests_each_try_every_key() {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::new();
        for key in ["k1", "k2"] {
            for text in ["AAA", "BBB"] {
                mocks.push(
                    server
                        .mock("POST", PATH)
                        .match_header("x-goog-api-key", key)
                        .match_body(Matcher::PartialJson(serde_json::json!({
                            "contents": [{ "parts": [{ "text": text }] }]
                        })))
                        .with_status(429)
                        .with_body(r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"quota"}}"#)
                        .expect(1)
                        .create_async()
                        .await,
                );
            }
        }

        let backend = backend(&server, &["k1", "k2"]);
        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(
            backend.synthesize("AAA", Language::Ja, &cancel),
            backend.synthesize("BBB", Language::En, &cancel),
        );

        assert!(matches!(a, Err(SlidecastError::RemoteRequest { status: 429, .. })));
        assert!(matches!(b, Err(SlidecastError::RemoteRequest { status: 429, .. })));
        for mock in &mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn non_retryable_error_stops_after_one_attempt() {
        let mut server = Server::new_async().await;
        let bad = server
            .mock("POST", PATH)
            .with_status(400)
            .with_body(r#"{"error":{"status":"INVALID_ARGUMENT","message":"bad text"}}"#)
            .expect(1)
            .create_async()
            .await;

        let backend = backend(&server, &["k1", "k2", "k3"]);
        let err = backend
            .synthesize("hi", Language::En, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            SlidecastError::RemoteRequest { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "INVALID_ARGUMENT: bad text");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.keys().cursor(), 1);
        bad.assert_async().await;
    }

    #[tokio::test]
    async fn fails_over_to_next_key() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "k1")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "k2")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "contents": [{ "parts": [{ "text": "hello" }] }],
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Iapetus" } }
                    }
                }
            })))
            .with_status(200)
            .with_body(audio_body(&[1, 0, 2, 0]))
            .expect(1)
            .create_async()
            .await;

        let backend = backend(&server, &["k1", "k2"]);
        let audio = backend
            .synthesize("hello", Language::Ja, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            audio,
            SpeechAudio::Pcm {
                data: vec![1, 0, 2, 0],
                format: PcmFormat::REMOTE,
            }
        );
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn empty_candidates_are_retried() {
        let mut server = Server::new_async().await;
        let empty = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "k1")
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "k2")
            .with_status(200)
            .with_body(audio_body(&[0, 0]))
            .expect(1)
            .create_async()
            .await;

        let backend = backend(&server, &["k1", "k2"]);
        backend
            .synthesize("hi", Language::En, &CancellationToken::new())
            .await
            .unwrap();

        empty.assert_async().await;
        ok.assert_async().await;
    }

    #[test]
    fn missing_parts_and_inline_data_are_empty_audio() {
        let no_parts = serde_json::json!({"candidates": [{"content": {"parts": []}}]});
        let no_inline = serde_json::json!({"candidates": [{"content": {"parts": [{"text": "x"}]}}]});
        for body in [no_parts, no_inline] {
            let err = extract_audio(&body).unwrap_err();
            assert!(matches!(err, SlidecastError::EmptyAudio { .. }));
        }
    }

    #[test]
    fn sample_rate_comes_from_mime_type() {
        assert_eq!(
            sample_rate_from_mime("audio/L16;codec=pcm;rate=24000"),
            Some(24_000)
        );
        assert_eq!(sample_rate_from_mime("audio/L16; rate=16000"), Some(16_000));
        assert_eq!(sample_rate_from_mime("audio/L16"), None);
    }

    #[test]
    fn error_message_prefers_api_status() {
        assert_eq!(
            error_message(r#"{"error":{"status":"UNAVAILABLE","message":"overloaded"}}"#),
            "UNAVAILABLE: overloaded"
        );
        assert_eq!(error_message("plain text\n"), "plain text");
    }
}
