use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Inputs for one encode: still background, transparent overlay, one audio track.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub background: PathBuf,
    pub overlay: PathBuf,
    pub audio: PathBuf,
    /// Output length in seconds, already clamped
    pub duration: f64,
    pub fps: u32,
    pub output: PathBuf,
}

/// Turns an [`EncodeJob`] into a video file.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, job: &EncodeJob) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
    preset: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            preset: "medium".to_string(),
        }
    }

    pub fn build_args(&self, job: &EncodeJob) -> Vec<String> {
        let fps = job.fps.to_string();
        let duration = format!("{:.3}", job.duration);
        let background = job.background.to_string_lossy();
        let overlay = job.overlay.to_string_lossy();
        let audio = job.audio.to_string_lossy();
        let output = job.output.to_string_lossy();

        [
            "-y",
            "-v",
            "error",
            // repeat the background for the whole duration
            "-loop",
            "1",
            "-framerate",
            fps.as_str(),
            "-i",
            &*background,
            "-i",
            &*overlay,
            "-i",
            &*audio,
            "-filter_complex",
            "[0:v][1:v]overlay=0:0:format=auto,format=yuv420p[v]",
            "-map",
            "[v]",
            "-map",
            "2:a:0",
            "-c:v",
            "libx264",
            "-preset",
            self.preset.as_str(),
            "-tune",
            "stillimage",
            "-pix_fmt",
            "yuv420p",
            "-r",
            fps.as_str(),
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-t",
            duration.as_str(),
            "-shortest",
            "-movflags",
            "+faststart",
            &*output,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob) -> Result<PathBuf> {
        which::which(&self.binary)
            .map_err(|_| PipelineError::ffmpeg(format!("{} not found in PATH", self.binary), None))?;

        let args = self.build_args(job);
        debug!("Running {} {}", self.binary, args.join(" "));
        info!("Encoding {:.1}s video to {}", job.duration, job.output.display());

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PipelineError::ffmpeg(format!("Failed to run FFmpeg: {}", e), None))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(PipelineError::ffmpeg(
                format!("FFmpeg exited with {}", output.status),
                Some(stderr),
            ));
        }

        info!("Encoded video: {}", job.output.display());
        Ok(job.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(duration: f64) -> EncodeJob {
        EncodeJob {
            background: PathBuf::from("work/background.png"),
            overlay: PathBuf::from("work/overlay.png"),
            audio: PathBuf::from("bgm/flute.mp3"),
            duration,
            fps: 24,
            output: PathBuf::from("short.mp4"),
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
        args.windows(2)
            .filter(|w| w[0] == flag)
            .map(|w| w[1].as_str())
            .collect()
    }

    #[test]
    fn test_inputs_in_order() {
        let args = FfmpegEncoder::new().build_args(&job(58.0));
        assert_eq!(
            value_after(&args, "-i"),
            vec!["work/background.png", "work/overlay.png", "bgm/flute.mp3"]
        );
        assert_eq!(value_after(&args, "-loop"), vec!["1"]);
        let loop_pos = args.iter().position(|a| a == "-loop").unwrap();
        let overlay_pos = args.iter().position(|a| a == "work/overlay.png").unwrap();
        assert!(loop_pos < overlay_pos);
    }

    #[test]
    fn test_overlay_filter_and_audio_map() {
        let args = FfmpegEncoder::new().build_args(&job(58.0));
        let filter = value_after(&args, "-filter_complex");
        assert!(filter[0].starts_with("[0:v][1:v]overlay=0:0"));
        assert_eq!(value_after(&args, "-map"), vec!["[v]", "2:a:0"]);
    }

    #[test]
    fn test_codec_and_pixel_format() {
        let args = FfmpegEncoder::new().build_args(&job(58.0));
        assert_eq!(value_after(&args, "-c:v"), vec!["libx264"]);
        assert_eq!(value_after(&args, "-pix_fmt"), vec!["yuv420p"]);
        assert_eq!(value_after(&args, "-c:a"), vec!["aac"]);
        assert_eq!(args.last().unwrap(), "short.mp4");
    }

    #[test]
    fn test_duration_cap_is_passed() {
        let args = FfmpegEncoder::new().build_args(&job(58.0));
        assert_eq!(value_after(&args, "-t"), vec!["58.000"]);
        assert!(args.contains(&"-shortest".to_string()));
    }
}
