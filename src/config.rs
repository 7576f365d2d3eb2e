//! Run configuration.
//!
//! Built once in `main` and handed to each stage by reference. Secrets are not
//! part of this struct; they are read by the clients that need them.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// Fonts tried after the configured one when it cannot be loaded.
///
/// Devanagari faces come first. Text is drawn glyph by glyph without shaping,
/// so conjuncts and vowel signs in Hindi quotes render in isolated forms.
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoSansDevanagari-Bold.ttf",
    "/usr/share/fonts/noto/NotoSansDevanagari-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Which audio track goes under the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    /// Random file from the background music pool.
    Music,
    /// Spoken version of the quote.
    Narration,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Output frame width in pixels
    pub width: u32,
    /// Output frame height in pixels
    pub height: u32,
    pub fps: u32,
    /// Hard ceiling for the video length in seconds
    pub max_duration: f64,
    /// Wrap width in characters
    pub wrap_width: usize,
    pub font_size: f32,
    /// Distance between the text block and the bottom edge
    pub bottom_margin: u32,
    /// Font candidates, in order of preference
    pub fonts: Vec<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 24,
            max_duration: 58.0,
            wrap_width: 25,
            font_size: 75.0,
            bottom_margin: 200,
            fonts: font_candidates(PathBuf::from("fonts/font.ttf")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Try the image generation service before the local pool
    pub enabled: bool,
    pub retries: u32,
    pub retry_delay: Duration,
    /// Text models, highest priority first
    pub text_models: Vec<String>,
    /// Language the quote is written in
    pub language: String,
    /// Send the local image along with the caption prompt
    pub attach_image: bool,
    pub tts_language_code: String,
    pub tts_voice: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retries: 3,
            retry_delay: Duration::from_secs(5),
            text_models: [
                "gemini-2.5-flash",
                "gemini-2.0-flash",
                "gemini-2.0-flash-exp",
                "gemini-1.5-flash",
                "gemini-pro",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
            language: "Hindi".to_string(),
            attach_image: true,
            tts_language_code: "hi-IN".to_string(),
            tts_voice: "hi-IN-Wavenet-C".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub enabled: bool,
    pub category_id: String,
    pub tags: Vec<String>,
    pub privacy_status: String,
    /// Keep the rendered file after a successful upload
    pub keep_video: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            category_id: "22".to_string(),
            tags: ["Krishna", "Bhakti", "Motivation", "Hinduism", "Shorts"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            privacy_status: "private".to_string(),
            keep_video: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Pool of images not yet published
    pub images_dir: PathBuf,
    /// Images that have already been published
    pub used_dir: PathBuf,
    /// Background music pool
    pub bgm_dir: PathBuf,
    /// Scratch space for generated and intermediate files
    pub work_dir: PathBuf,
    /// Final video path
    pub output_file: PathBuf,
    pub audio_mode: AudioMode,
    pub render: RenderConfig,
    pub generation: GenerationConfig,
    pub upload: UploadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("images"),
            used_dir: PathBuf::from("images_used"),
            bgm_dir: PathBuf::from("bgm"),
            work_dir: PathBuf::from("output"),
            output_file: PathBuf::from("short.mp4"),
            audio_mode: AudioMode::Music,
            render: RenderConfig::default(),
            generation: GenerationConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, with a few knobs readable from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(retries) = std::env::var("IMAGE_GEN_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.generation.retries = retries;
        }
        if let Some(secs) = std::env::var("IMAGE_GEN_RETRY_DELAY")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.generation.retry_delay = Duration::from_secs(secs);
        }
        if let Ok(models) = std::env::var("TEXT_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !models.is_empty() {
                config.generation.text_models = models;
            }
        }
        if let Ok(privacy) = std::env::var("YOUTUBE_PRIVACY_STATUS") {
            config.upload.privacy_status = privacy;
        }

        config
    }

    /// Replace the preferred font, keeping the system fallbacks behind it.
    pub fn set_font(&mut self, font: PathBuf) {
        self.render.fonts = font_candidates(font);
    }

    /// Fixed path the image generator writes to.
    pub fn generated_image_path(&self) -> PathBuf {
        self.work_dir.join("generated.jpg")
    }

    /// Fixed path the speech synthesizer writes to.
    pub fn narration_path(&self) -> PathBuf {
        self.work_dir.join("narration.mp3")
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::create_dir_all(&self.used_dir).await?;
        Ok(())
    }
}

fn font_candidates(preferred: PathBuf) -> Vec<PathBuf> {
    std::iter::once(preferred)
        .chain(FALLBACK_FONTS.iter().map(PathBuf::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_portrait_short() {
        let config = Config::default();
        assert_eq!((config.render.width, config.render.height), (1080, 1920));
        assert_eq!(config.render.max_duration, 58.0);
        assert_eq!(config.generation.retries, 3);
        assert_eq!(config.generation.text_models[0], "gemini-2.5-flash");
    }

    #[test]
    fn test_set_font_keeps_fallbacks() {
        let mut config = Config::default();
        config.set_font(PathBuf::from("custom.ttf"));
        assert_eq!(config.render.fonts[0], PathBuf::from("custom.ttf"));
        assert_eq!(config.render.fonts.len(), FALLBACK_FONTS.len() + 1);
    }

    #[tokio::test]
    async fn test_ensure_dirs_creates_work_and_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            work_dir: tmp.path().join("work"),
            used_dir: tmp.path().join("used"),
            ..Config::default()
        };
        config.ensure_dirs().await.unwrap();
        assert!(config.work_dir.is_dir());
        assert!(config.used_dir.is_dir());
    }
}
