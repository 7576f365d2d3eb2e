//! Audio track selection and probing.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use rand::seq::IndexedRandom;
use rand::Rng;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::source::has_extension;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "ogg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Music,
    Narration,
}

#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub path: PathBuf,
    /// Length in seconds, when ffprobe could read it
    pub duration: Option<f64>,
    pub kind: TrackKind,
}

impl AudioTrack {
    pub async fn probe(path: PathBuf, kind: TrackKind) -> Self {
        let duration = match probe_duration(&path).await {
            Ok(duration) => Some(duration),
            Err(e) => {
                warn!("Could not probe {}: {}", path.display(), e);
                None
            }
        };
        Self {
            path,
            duration,
            kind,
        }
    }
}

/// Audio files in the music pool, sorted by name.
pub async fn list_tracks(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut tracks = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && has_extension(&path, AUDIO_EXTENSIONS) {
            tracks.push(path);
        }
    }
    tracks.sort();
    Ok(tracks)
}

pub fn choose_track<R: Rng + ?Sized>(tracks: &[PathBuf], dir: &Path, rng: &mut R) -> Result<PathBuf> {
    let track = tracks
        .choose(rng)
        .cloned()
        .ok_or_else(|| PipelineError::NoMusic(dir.to_path_buf()))?;
    info!("Selected music: {}", track.display());
    Ok(track)
}

/// Length of the video for a track: the track itself, capped at `ceiling`.
pub fn clamp_duration(track: Option<f64>, ceiling: f64) -> f64 {
    match track {
        Some(length) if length.is_finite() && length > 0.0 => length.min(ceiling),
        _ => ceiling,
    }
}

pub async fn probe_duration(path: &Path) -> Result<f64> {
    which::which("ffprobe").map_err(|_| PipelineError::ffmpeg("ffprobe not found in PATH", None))?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(PipelineError::ffmpeg(
            format!("ffprobe failed for {}", path.display()),
            Some(stderr),
        ));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_duration(stdout: &str) -> Result<f64> {
    stdout
        .trim()
        .parse::<f64>()
        .map_err(|_| PipelineError::ffmpeg(format!("unexpected ffprobe output: {:?}", stdout.trim()), None))
}
