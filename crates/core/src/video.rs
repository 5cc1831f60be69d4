use std::path::{self, Path};

use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::{Result, SlidecastError},
    layout::{
        find_clips, find_slide_images, get_audio_path, get_clip_path, get_combined_path,
        get_manifest_path,
    },
    media::{ClipRequest, MediaTool},
    types::{BatchReport, ConcatOutcome, Language, SlideOutcome},
};

/// Every clip ends on this much silence after the narration.
pub const TRAILING_PAD_SECS: f64 = 1.0;

/// Encode one clip per rendered slide image that has narration audio.
///
/// Slides are processed in slide-number order. A missing audio file, a failed
/// probe or a failed encode skips that slide only. A clip left over from an
/// earlier run is removed before its slide is attempted.
pub async fn assemble_clips(
    media: &dyn MediaTool,
    slides_dir: &Path,
    audio_dir: &Path,
    output_dir: &Path,
    language: Language,
    cancel: &CancellationToken,
) -> Result<BatchReport> {
    if !audio_dir.is_dir() {
        return Err(SlidecastError::MissingInput {
            path: audio_dir.to_path_buf(),
        });
    }
    let slides = find_slide_images(slides_dir)?;
    if slides.is_empty() {
        return Err(SlidecastError::NoSlideImages {
            dir: slides_dir.to_path_buf(),
        });
    }

    fs::create_dir_all(output_dir).await?;
    info!(%language, slides = slides.len(), "Assembling clips");

    let mut report = BatchReport::default();
    for (slide_number, image) in slides {
        if cancel.is_cancelled() {
            warn!(%language, slide = slide_number, "Clip assembly cancelled");
            return Err(SlidecastError::Cancelled);
        }

        let clip = get_clip_path(output_dir, language, slide_number);
        remove_stale(&clip).await?;

        let audio = get_audio_path(audio_dir, slide_number);
        if !audio.is_file() {
            warn!(slide = slide_number, audio = %audio.display(), "Audio file not found, skipping slide");
            report.push(SlideOutcome::skipped(
                slide_number,
                format!("audio file {} not found", audio.display()),
            ));
            continue;
        }

        let duration = match media.probe_duration(&audio).await {
            Ok(d) => d,
            Err(e) => {
                warn!(slide = slide_number, error = %e, "Skipping slide");
                report.push(SlideOutcome::skipped(slide_number, e.to_string()));
                continue;
            }
        };

        let request = ClipRequest {
            image: path::absolute(&image)?,
            audio: path::absolute(&audio)?,
            output: path::absolute(&clip)?,
            duration_secs: duration + TRAILING_PAD_SECS,
        };

        match media.encode_clip(&request).await {
            Ok(()) => {
                info!(slide = slide_number, clip = %request.output.display(), "Created clip");
                report.push(SlideOutcome::created(slide_number, request.output));
            }
            Err(e) => {
                warn!(slide = slide_number, error = %e, "Error processing slide");
                report.push(SlideOutcome::skipped(slide_number, e.to_string()));
            }
        }
    }

    Ok(report)
}

/// Stream-copy a language's clips, in name order, into one video.
///
/// No clips is not an error: the language simply produced nothing.
pub async fn concatenate(
    media: &dyn MediaTool,
    clips_dir: &Path,
    language: Language,
    cancel: &CancellationToken,
) -> Result<ConcatOutcome> {
    if cancel.is_cancelled() {
        return Err(SlidecastError::Cancelled);
    }

    let clips = find_clips(clips_dir, language)?;
    if clips.is_empty() {
        info!(%language, "No clips found, skipping combined video");
        return Ok(ConcatOutcome::Skipped);
    }

    let manifest = path::absolute(get_manifest_path(clips_dir, language))?;
    let output = path::absolute(get_combined_path(clips_dir, language))?;

    let mut listing = String::new();
    for clip in &clips {
        listing.push_str(&manifest_entry(&path::absolute(clip)?));
    }
    fs::write(&manifest, listing).await?;

    info!(%language, clips = clips.len(), "Creating combined video");
    media
        .concat(&manifest, &output)
        .await
        .map_err(|e| SlidecastError::ConcatFailed {
            language: language.to_string(),
            reason: e.to_string(),
        })?;

    info!(%language, video = %output.display(), "Created combined video");
    Ok(ConcatOutcome::Created(output))
}

/// Delete `path` if a previous run left it behind.
pub(crate) async fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "Removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// One `file '...'` line of a concat demuxer listing.
pub fn manifest_entry(clip: &Path) -> String {
    let path = clip.to_string_lossy().replace('\\', "/");
    format!("file '{}'\n", path.replace('\'', r"'\''"))
}
