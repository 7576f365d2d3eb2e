use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::audio::{clamp_duration, AudioTrack};
use crate::config::RenderConfig;
use crate::error::{PipelineError, Result};
use crate::video::encoder::{EncodeJob, Encoder};
use crate::video::frame::prepare_background;
use crate::video::overlay::{load_font, render_overlay, OverlayStyle};

/// Produces the finished video for one run.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, image: &Path, quote: &str, audio: &AudioTrack) -> Result<PathBuf>;
}

/// Writes the still frame and the caption layer for one video.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, image: &Path, quote: &str, background: &Path, overlay: &Path) -> Result<()>;
}

/// Cover-fit background plus the wrapped quote on a rounded panel.
pub struct QuoteCard {
    config: RenderConfig,
}

impl QuoteCard {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }
}

impl Rasterizer for QuoteCard {
    fn rasterize(&self, source: &Path, quote: &str, background: &Path, overlay: &Path) -> Result<()> {
        let config = &self.config;
        prepare_background(source, background, config.width, config.height)?;

        let font = load_font(&config.fonts)?;
        let style = OverlayStyle::new(
            config.width,
            config.height,
            config.font_size,
            config.wrap_width,
            config.bottom_margin,
        );
        render_overlay(quote, &font, &style).save_with_format(overlay, image::ImageFormat::Png)?;
        Ok(())
    }
}

pub struct Compositor {
    config: RenderConfig,
    work_dir: PathBuf,
    output_path: PathBuf,
    rasterizer: Arc<dyn Rasterizer>,
    encoder: Box<dyn Encoder>,
}

impl Compositor {
    pub fn new(
        config: RenderConfig,
        work_dir: PathBuf,
        output_path: PathBuf,
        encoder: Box<dyn Encoder>,
    ) -> Self {
        Self {
            rasterizer: Arc::new(QuoteCard::new(config.clone())),
            config,
            work_dir,
            output_path,
            encoder,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    async fn render_inner(&self, image: &Path, quote: &str, audio: &AudioTrack) -> Result<PathBuf> {
        // removed when dropped, whichever way this function returns
        let scratch = tempfile::Builder::new()
            .prefix("render-")
            .tempdir_in(&self.work_dir)?;
        let background = scratch.path().join("background.png");
        let overlay = scratch.path().join("overlay.png");

        let rasterizer = self.rasterizer.clone();
        let (source, quote_owned) = (image.to_path_buf(), quote.to_string());
        let (bg_path, overlay_path) = (background.clone(), overlay.clone());
        tokio::task::spawn_blocking(move || {
            rasterizer.rasterize(&source, &quote_owned, &bg_path, &overlay_path)
        })
        .await
        .map_err(|e| PipelineError::Render(format!("raster task failed: {}", e)))??;

        let duration = clamp_duration(audio.duration, self.config.max_duration);
        info!(
            "Rendering {:.1}s video with {}",
            duration,
            audio.path.display()
        );

        let job = EncodeJob {
            background,
            overlay,
            audio: audio.path.clone(),
            duration,
            fps: self.config.fps,
            output: self.output_path.clone(),
        };
        self.encoder.encode(&job).await
    }
}

#[async_trait]
impl Renderer for Compositor {
    async fn render(&self, image: &Path, quote: &str, audio: &AudioTrack) -> Result<PathBuf> {
        info!("Rendering video for {}", image.display());
        match self.render_inner(image, quote, audio).await {
            Ok(path) => {
                info!("Video generation completed: {}", path.display());
                Ok(path)
            }
            Err(e) => {
                if let PipelineError::Ffmpeg {
                    stderr: Some(stderr),
                    ..
                } = &e
                {
                    error!("FFmpeg stderr:\n{}", stderr);
                }
                error!("Render failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TrackKind;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::sync::Mutex;

    /// Records the job, checks the intermediates exist, then writes a stub file.
    struct RecordingEncoder {
        jobs: Arc<Mutex<Vec<EncodeJob>>>,
        fail: bool,
    }

    #[async_trait]
    impl Encoder for RecordingEncoder {
        async fn encode(&self, job: &EncodeJob) -> Result<PathBuf> {
            assert!(job.background.exists());
            assert!(job.overlay.exists());
            self.jobs.lock().unwrap().push(job.clone());
            if self.fail {
                return Err(PipelineError::ffmpeg(
                    "FFmpeg exited with exit status: 1",
                    Some("Invalid data found when processing input".into()),
                ));
            }
            tokio::fs::write(&job.output, b"mp4").await?;
            Ok(job.output.clone())
        }
    }

    /// Flat frames, no text, so no font is needed.
    struct PlainFrames;

    impl Rasterizer for PlainFrames {
        fn rasterize(&self, _source: &Path, _quote: &str, background: &Path, overlay: &Path) -> Result<()> {
            RgbImage::from_pixel(108, 192, Rgb([10, 60, 120])).save(background)?;
            RgbaImage::from_pixel(108, 192, Rgba([0, 0, 0, 0])).save(overlay)?;
            Ok(())
        }
    }

    fn small_config() -> RenderConfig {
        RenderConfig {
            width: 108,
            height: 192,
            font_size: 12.0,
            bottom_margin: 20,
            ..RenderConfig::default()
        }
    }

    fn scratch_dirs(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("render-"))
            .count()
    }

    fn track(seconds: f64) -> AudioTrack {
        AudioTrack {
            path: PathBuf::from("bgm/flute.mp3"),
            duration: Some(seconds),
            kind: TrackKind::Music,
        }
    }

    fn compositor(dir: &Path, config: RenderConfig, encoder: RecordingEncoder) -> Compositor {
        Compositor::new(
            config,
            dir.to_path_buf(),
            dir.join("short.mp4"),
            Box::new(encoder),
        )
    }

    #[tokio::test]
    async fn test_render_clamps_duration_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let image = tmp.path().join("krishna.png");
        std::fs::write(&image, b"unused by the plain rasterizer").unwrap();

        let jobs = Arc::new(Mutex::new(Vec::new()));
        let encoder = RecordingEncoder {
            jobs: jobs.clone(),
            fail: false,
        };
        let compositor =
            compositor(tmp.path(), small_config(), encoder).with_rasterizer(Arc::new(PlainFrames));

        let output = compositor
            .render(&image, "Hare Krishna Hare Rama", &track(120.0))
            .await
            .unwrap();

        assert_eq!(output, tmp.path().join("short.mp4"));
        let jobs = jobs.lock().unwrap();
        assert_eq!(jobs[0].duration, 58.0);
        assert_eq!(jobs[0].fps, 24);
        assert_eq!(scratch_dirs(tmp.path()), 0);
        assert!(image.exists());
    }

    #[tokio::test]
    async fn test_short_track_sets_duration() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = Arc::new(Mutex::new(Vec::new()));
        let encoder = RecordingEncoder {
            jobs: jobs.clone(),
            fail: false,
        };
        let compositor =
            compositor(tmp.path(), small_config(), encoder).with_rasterizer(Arc::new(PlainFrames));

        compositor
            .render(&tmp.path().join("any.png"), "Radhe", &track(21.5))
            .await
            .unwrap();
        assert_eq!(jobs.lock().unwrap()[0].duration, 21.5);
    }

    #[tokio::test]
    async fn test_encoder_failure_still_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = RecordingEncoder {
            jobs: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        };
        let compositor =
            compositor(tmp.path(), small_config(), encoder).with_rasterizer(Arc::new(PlainFrames));

        let err = compositor
            .render(&tmp.path().join("any.png"), "Radhe Radhe", &track(20.0))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Ffmpeg { .. }));
        assert_eq!(scratch_dirs(tmp.path()), 0);
        assert!(!tmp.path().join("short.mp4").exists());
    }

    #[tokio::test]
    async fn test_bad_image_fails_before_encoding() {
        let tmp = tempfile::tempdir().unwrap();
        let image = tmp.path().join("broken.jpg");
        std::fs::write(&image, b"not an image").unwrap();

        let jobs = Arc::new(Mutex::new(Vec::new()));
        let encoder = RecordingEncoder {
            jobs: jobs.clone(),
            fail: false,
        };
        let compositor = compositor(tmp.path(), small_config(), encoder);

        assert!(compositor.render(&image, "Jai Shree Krishna", &track(30.0)).await.is_err());
        assert!(jobs.lock().unwrap().is_empty());
        assert_eq!(scratch_dirs(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_font_is_render_error_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let image = tmp.path().join("krishna.png");
        RgbImage::from_pixel(300, 200, Rgb([10, 60, 120])).save(&image).unwrap();

        let jobs = Arc::new(Mutex::new(Vec::new()));
        let encoder = RecordingEncoder {
            jobs: jobs.clone(),
            fail: false,
        };
        let config = RenderConfig {
            fonts: vec![tmp.path().join("missing.ttf")],
            ..small_config()
        };
        let compositor = compositor(tmp.path(), config, encoder);

        let err = compositor
            .render(&image, "Jai Shree Krishna", &track(30.0))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Render(_)));
        assert!(jobs.lock().unwrap().is_empty());
        assert_eq!(scratch_dirs(tmp.path()), 0);
    }
}
