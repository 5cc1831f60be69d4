pub mod local;
pub mod remote;

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Result, SlidecastError},
    types::Language,
    wav::PcmFormat,
};

pub use local::{DEFAULT_LOCAL_URL, LocalBackend};
pub use remote::{RemoteBackend, RemoteConfig};

/// Audio returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechAudio {
    /// A complete audio file, written as-is.
    Container(Vec<u8>),
    /// Raw little-endian samples that still need a WAV header.
    Pcm { data: Vec<u8>, format: PcmFormat },
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run once before the first slide. A failure aborts the whole run.
    async fn prepare(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        cancel: &CancellationToken,
    ) -> Result<SpeechAudio>;
}

/// Backend chosen at construction time.
pub enum Backend {
    Local(LocalBackend),
    Remote(RemoteBackend),
}

#[async_trait]
impl Synthesizer for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Local(b) => b.name(),
            Backend::Remote(b) => b.name(),
        }
    }

    async fn prepare(&self, cancel: &CancellationToken) -> Result<()> {
        match self {
            Backend::Local(b) => b.prepare(cancel).await,
            Backend::Remote(b) => b.prepare(cancel).await,
        }
    }

    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        cancel: &CancellationToken,
    ) -> Result<SpeechAudio> {
        match self {
            Backend::Local(b) => b.synthesize(text, language, cancel).await,
            Backend::Remote(b) => b.synthesize(text, language, cancel).await,
        }
    }
}

/// Race a network call against the caller's cancellation token.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(SlidecastError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(SlidecastError::Cancelled),
        result = fut => result,
    }
}
