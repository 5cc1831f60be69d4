use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlidecastError {
    #[error("Input not found: {path}")]
    MissingInput { path: PathBuf },

    #[error("Not a markdown file: {path}")]
    NotMarkdown { path: PathBuf },

    #[error("No notes found in {path}. Ensure comments are in <!-- --> format")]
    NothingToSynthesize { path: PathBuf },

    #[error("Slide {slide_number} ({title}) has no comment. All slides must have a <!-- --> comment")]
    MissingNarration { slide_number: usize, title: String },

    #[error("TTS service at {url} is not available: {reason}")]
    HealthCheckFailed { url: String, reason: String },

    #[error(
        "No API keys found. Set GOOGLE_API_KEY or GOOGLE_API_KEY_1, GOOGLE_API_KEY_2, etc, or run `slidecast config add api-key`"
    )]
    NoApiKeys,

    #[error("Too many API keys: {count} (max {max})")]
    TooManyApiKeys { count: usize, max: usize },

    #[error("Config error in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("{backend} synthesis failed: {reason}")]
    SynthesisFailed { backend: &'static str, reason: String },

    #[error("Remote TTS request failed with status {status}: {message}")]
    RemoteRequest { status: u16, message: String },

    #[error("No audio data in response: {reason}")]
    EmptyAudio { reason: String },

    #[error("Unsupported audio format: {reason}")]
    UnsupportedAudioFormat { reason: String },

    #[error("No slide images found in {dir}")]
    NoSlideImages { dir: PathBuf },

    #[error("Failed to get audio duration for {path}: {reason}")]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("Encoding failed for {path}: {reason}")]
    EncodeFailed { path: PathBuf, reason: String },

    #[error("Error creating combined video for {language}: {reason}")]
    ConcatFailed { language: String, reason: String },

    #[error("Track {language} failed: {reason}")]
    TrackFailed { language: String, reason: String },

    #[error("All tracks failed: {summary}")]
    AllTracksFailed { summary: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("WAV error: {0}")]
    WavError(#[from] hound::Error),
}

impl SlidecastError {
    /// Whether another API key may succeed where this attempt failed.
    ///
    /// Rate limits, quota exhaustion, server-side failures, timeouts and
    /// empty responses are transient; everything else aborts the attempt loop.
    pub fn is_retryable(&self) -> bool {
        match self {
            SlidecastError::RemoteRequest { status, message } => {
                matches!(status, 429 | 500 | 503) || mentions_rate_limit(message)
            }
            SlidecastError::EmptyAudio { .. } => true,
            SlidecastError::ApiError(e) => {
                e.is_timeout()
                    || e.status()
                        .is_some_and(|s| matches!(s.as_u16(), 429 | 500 | 503))
            }
            _ => false,
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("quota")
        || message.contains("rate limit")
        || message.contains("rate_limit")
        || message.contains("resource_exhausted")
}

pub type Result<T> = std::result::Result<T, SlidecastError>;
