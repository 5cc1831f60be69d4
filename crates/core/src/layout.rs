use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;

use crate::{
    error::{Result, SlidecastError},
    types::Language,
};

static SLIDE_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^slide\.(\d+)\.png$").expect("valid slide image regex"));

/// Markdown deck for a language, e.g. `slide-ja.md`
pub fn get_deck_path(root: &Path, language: Language) -> PathBuf {
    root.join(format!("slide-{}.md", language))
}

/// Per-language output directory, e.g. `dist/ja`
pub fn get_language_dir(dist: &Path, language: Language) -> PathBuf {
    dist.join(language.as_str())
}

/// Get the path for a slide's narration audio
pub fn get_audio_path(dir: &Path, slide_number: usize) -> PathBuf {
    dir.join(format!("slide.{:03}.wav", slide_number))
}

/// Get the path for a single-slide clip
pub fn get_clip_path(dir: &Path, language: Language, slide_number: usize) -> PathBuf {
    dir.join(format!("slide-{}-{:03}.mp4", language, slide_number))
}

/// Get the path for the concat manifest
pub fn get_manifest_path(dir: &Path, language: Language) -> PathBuf {
    dir.join(format!("filelist-{}.txt", language))
}

/// Get the path for the combined video
pub fn get_combined_path(dir: &Path, language: Language) -> PathBuf {
    dir.join(format!("video-{}.mp4", language))
}

/// Slide number embedded in `slide.<N>.png`
pub fn parse_slide_number(file_name: &str) -> Option<usize> {
    SLIDE_IMAGE_RE
        .captures(file_name)
        .and_then(|cap| cap[1].parse().ok())
}

/// Find rendered slide images, ordered by slide number rather than by name
pub fn find_slide_images(dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    if !dir.is_dir() {
        return Err(SlidecastError::MissingInput {
            path: dir.to_path_buf(),
        });
    }

    let mut slides: Vec<(usize, PathBuf)> = std::fs::read_dir(dir)?
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let number = parse_slide_number(path.file_name()?.to_str()?)?;
            Some((number, path))
        })
        .collect();

    sort_slides(&mut slides);
    Ok(slides)
}

pub fn sort_slides(slides: &mut [(usize, PathBuf)]) {
    slides.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
}

/// Find per-slide clips for a language. Clip names are zero-padded, so name
/// order is slide order.
pub fn find_clips(dir: &Path, language: Language) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("slide-{}-", language);
    let mut clips: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".mp4"))
        })
        .collect();

    clips.sort();
    Ok(clips)
}
