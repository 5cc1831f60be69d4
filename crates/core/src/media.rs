use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Output,
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{
    error::{Result, SlidecastError},
    format::format_seconds,
};

/// Still image + narration to be encoded as one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    pub image: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub duration_secs: f64,
}

/// The external prober/encoder.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Duration of an audio file in seconds.
    async fn probe_duration(&self, audio: &Path) -> Result<f64>;

    async fn encode_clip(&self, request: &ClipRequest) -> Result<()>;

    /// Stream-copy every file listed in `manifest` into `output`.
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<()>;
}

pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl Ffmpeg {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Binaries from `FFMPEG_BIN` / `FFPROBE_BIN`, else from `PATH`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var_os("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".into()),
            std::env::var_os("FFPROBE_BIN").unwrap_or_else(|| "ffprobe".into()),
        )
    }
}

#[async_trait]
impl MediaTool for Ffmpeg {
    async fn probe_duration(&self, audio: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(audio)
            .output()
            .await?;

        if !output.status.success() {
            return Err(SlidecastError::ProbeFailed {
                path: audio.to_path_buf(),
                reason: captured(&output),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_duration(&stdout).ok_or_else(|| SlidecastError::ProbeFailed {
            path: audio.to_path_buf(),
            reason: format!("failed to parse duration from output '{}'", stdout.trim()),
        })
    }

    async fn encode_clip(&self, request: &ClipRequest) -> Result<()> {
        let args = clip_args(request);
        debug!(command = ?args, "Running ffmpeg");

        let output = Command::new(&self.ffmpeg).args(&args).output().await?;
        if !output.status.success() {
            return Err(SlidecastError::EncodeFailed {
                path: request.output.clone(),
                reason: captured(&output),
            });
        }

        Ok(())
    }

    async fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        let args = concat_args(manifest, output);
        debug!(command = ?args, "Running ffmpeg");

        let result = Command::new(&self.ffmpeg).args(&args).output().await?;
        if !result.status.success() {
            return Err(SlidecastError::EncodeFailed {
                path: output.to_path_buf(),
                reason: captured(&result),
            });
        }

        Ok(())
    }
}

/// Loop the still image for the clip duration, mux the narration padded with
/// silence to the same length, and round both dimensions down to even numbers
/// for yuv420p.
pub fn clip_args(request: &ClipRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-loop".into(), "1".into(), "-i".into()];
    args.push(request.image.clone().into());
    args.push("-i".into());
    args.push(request.audio.clone().into());
    args.extend(
        [
            "-c:v",
            "libx264",
            "-tune",
            "stillimage",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-af",
            "apad",
            "-pix_fmt",
            "yuv420p",
            "-t",
        ]
        .map(OsString::from),
    );
    args.push(format_seconds(request.duration_secs).into());
    args.push("-vf".into());
    args.push("scale=trunc(iw/2)*2:trunc(ih/2)*2".into());
    args.push(request.output.clone().into());
    args
}

pub fn concat_args(manifest: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-f", "concat", "-safe", "0", "-i"]
        .map(OsString::from)
        .to_vec();
    args.push(manifest.into());
    args.push("-c".into());
    args.push("copy".into());
    args.push(output.into());
    args
}

pub fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

fn captured(output: &Output) -> String {
    let code = output
        .status
        .code()
        .map_or_else(|| "signal".to_string(), |c| c.to_string());
    format!(
        "exit code {}: {}{}",
        code,
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    )
}
