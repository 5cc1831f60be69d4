use std::{
    future::Future,
    path::{Path, PathBuf},
};

use futures::future::join_all;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::{Result, SlidecastError},
    layout::get_audio_path,
    media::MediaTool,
    notes::{SplitStrategy, extract_notes},
    tts::{SpeechAudio, Synthesizer},
    types::{BatchReport, ConcatOutcome, Language, SlideNote, SlideOutcome, TrackReport},
    video::{assemble_clips, concatenate, remove_stale},
    wav::{write_container, write_wav},
};

/// Silence appended to remote-backend audio.
pub const REMOTE_TRAILING_SILENCE_SECS: f32 = 1.0;

/// Read a markdown deck and extract one narration per slide.
pub async fn read_deck(path: &Path, strategy: SplitStrategy) -> Result<Vec<SlideNote>> {
    if !path.is_file() {
        return Err(SlidecastError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let is_markdown = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
    if !is_markdown {
        return Err(SlidecastError::NotMarkdown {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path).await?;
    let notes = extract_notes(&content, strategy)?;
    if notes.is_empty() {
        return Err(SlidecastError::NothingToSynthesize {
            path: path.to_path_buf(),
        });
    }

    info!(deck = %path.display(), slides = notes.len(), "Found slides with notes");
    Ok(notes)
}

/// Synthesize every note in order into `slide.NNN.wav` files.
///
/// A failed slide is logged and skipped, leaving no audio file behind.
/// Cancellation stops the loop, and a batch where nothing was produced is an
/// error.
pub async fn synthesize_notes(
    backend: &dyn Synthesizer,
    notes: &[SlideNote],
    output_dir: &Path,
    language: Language,
    cancel: &CancellationToken,
) -> Result<BatchReport> {
    fs::create_dir_all(output_dir).await?;

    let mut report = BatchReport::default();
    for note in notes {
        let path = get_audio_path(output_dir, note.slide_number);
        remove_stale(&path).await?;
        info!(
            slide = note.slide_number,
            chars = note.text.chars().count(),
            backend = backend.name(),
            "Synthesizing slide"
        );

        let result = match backend.synthesize(&note.text, language, cancel).await {
            Ok(audio) => save_audio(&path, audio).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(slide = note.slide_number, path = %path.display(), "Saved audio");
                report.push(SlideOutcome::created(note.slide_number, path));
            }
            Err(SlidecastError::Cancelled) => return Err(SlidecastError::Cancelled),
            Err(e) => {
                warn!(slide = note.slide_number, error = %e, "Failed to generate TTS, skipping slide");
                report.push(SlideOutcome::skipped(note.slide_number, e.to_string()));
            }
        }
    }

    if report.created() == 0 {
        return Err(SlidecastError::SynthesisFailed {
            backend: backend.name(),
            reason: format!("no audio produced for any of {} slide(s)", notes.len()),
        });
    }

    Ok(report)
}

async fn save_audio(path: &Path, audio: SpeechAudio) -> Result<()> {
    match audio {
        SpeechAudio::Container(bytes) => write_container(path, &bytes).await,
        SpeechAudio::Pcm { data, format } => {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || {
                write_wav(&path, &data, format, REMOTE_TRAILING_SILENCE_SECS)
            })
            .await
            .map_err(|e| SlidecastError::IoError(std::io::Error::other(e)))?
        }
    }
}

/// Deck in, one audio file per slide out.
pub async fn generate_narration(
    backend: &dyn Synthesizer,
    deck: &Path,
    output_dir: &Path,
    language: Language,
    strategy: SplitStrategy,
    cancel: &CancellationToken,
) -> Result<BatchReport> {
    let notes = read_deck(deck, strategy).await?;
    synthesize_notes(backend, &notes, output_dir, language, cancel).await
}

/// Per-slide clips, then the combined video.
///
/// A language where no clip could be encoded fails.
pub async fn build_video(
    media: &dyn MediaTool,
    slides_dir: &Path,
    audio_dir: &Path,
    output_dir: &Path,
    language: Language,
    cancel: &CancellationToken,
) -> Result<(BatchReport, ConcatOutcome)> {
    let clips = assemble_clips(media, slides_dir, audio_dir, output_dir, language, cancel).await?;
    if clips.created() == 0 {
        return Err(SlidecastError::TrackFailed {
            language: language.to_string(),
            reason: format!("no clips created from {} slide(s)", clips.outcomes.len()),
        });
    }

    let combined = concatenate(media, output_dir, language, cancel).await?;
    Ok((clips, combined))
}

/// Inputs and outputs of one language track.
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub language: Language,
    pub deck: PathBuf,
    /// Where the rendered `slide.NNN.png` images live.
    pub slides_dir: PathBuf,
    /// Audio, clips and the combined video all land here.
    pub output_dir: PathBuf,
    pub strategy: SplitStrategy,
}

/// Narration, clips and combined video for one language, strictly in order.
pub async fn run_track(
    backend: &dyn Synthesizer,
    media: &dyn MediaTool,
    spec: &TrackSpec,
    cancel: &CancellationToken,
) -> Result<TrackReport> {
    info!(language = %spec.language, deck = %spec.deck.display(), "Starting track");

    let audio = generate_narration(
        backend,
        &spec.deck,
        &spec.output_dir,
        spec.language,
        spec.strategy,
        cancel,
    )
    .await?;

    let (clips, combined) = build_video(
        media,
        &spec.slides_dir,
        &spec.output_dir,
        &spec.output_dir,
        spec.language,
        cancel,
    )
    .await?;

    Ok(TrackReport {
        language: spec.language,
        audio,
        clips,
        combined,
    })
}

/// Run one track per language concurrently and wait for all of them.
///
/// The run fails only when every track failed. Otherwise failed tracks are
/// logged and left out of the result.
pub async fn run_tracks<T, F, Fut>(languages: &[Language], track: F) -> Result<Vec<T>>
where
    F: Fn(Language) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let results = join_all(languages.iter().map(|&language| {
        let fut = track(language);
        async move { (language, fut.await) }
    }))
    .await;

    let mut succeeded = Vec::new();
    let mut failures = Vec::new();
    for (language, result) in results {
        match result {
            Ok(value) => succeeded.push(value),
            Err(e) => failures.push((language, e)),
        }
    }

    if succeeded.is_empty() && !failures.is_empty() {
        let summary = failures
            .iter()
            .map(|(language, e)| format!("{language}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SlidecastError::AllTracksFailed { summary });
    }

    for (language, e) in &failures {
        warn!(%language, error = %e, "Track failed");
    }

    Ok(succeeded)
}
