//! One run: image, caption, audio, render, upload, archive.
//!
//! Stages run strictly in order and the first error stops the run. The source
//! image is archived only after the upload is confirmed.

use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::api::SpeechSynthesizer;
use crate::audio::{choose_track, list_tracks, AudioTrack, TrackKind};
use crate::caption::{CaptionGenerator, CaptionPayload};
use crate::config::UploadConfig;
use crate::error::{PipelineError, Result};
use crate::publish::{Publisher, UploadResult, VideoMetadata};
use crate::scene::Scene;
use crate::source::{ImageOrigin, ImageSelector, SourceImage};
use crate::video::Renderer;

pub enum AudioSource {
    /// Random track from a directory of music files.
    Music { dir: PathBuf },
    /// The quote read aloud, written to a fixed path.
    Narration {
        synthesizer: Box<dyn SpeechSynthesizer>,
        output: PathBuf,
    },
}

#[derive(Debug)]
pub struct RunReport {
    pub image: SourceImage,
    pub caption: CaptionPayload,
    pub video: PathBuf,
    /// `None` when uploading is disabled
    pub upload: Option<UploadResult>,
    pub archived_to: Option<PathBuf>,
}

pub struct Pipeline {
    selector: ImageSelector,
    captions: CaptionGenerator,
    audio: AudioSource,
    renderer: Box<dyn Renderer>,
    publisher: Option<Box<dyn Publisher>>,
    upload: UploadConfig,
    used_dir: PathBuf,
    attach_image: bool,
}

impl Pipeline {
    pub fn new(
        selector: ImageSelector,
        captions: CaptionGenerator,
        audio: AudioSource,
        renderer: Box<dyn Renderer>,
        used_dir: PathBuf,
    ) -> Self {
        Self {
            selector,
            captions,
            audio,
            renderer,
            publisher: None,
            upload: UploadConfig::default(),
            used_dir,
            attach_image: true,
        }
    }

    pub fn with_publisher(mut self, publisher: Box<dyn Publisher>, upload: UploadConfig) -> Self {
        self.publisher = Some(publisher);
        self.upload = upload;
        self
    }

    pub fn with_attach_image(mut self, attach_image: bool) -> Self {
        self.attach_image = attach_image;
        self
    }

    pub async fn run<R: Rng + ?Sized>(&self, scene: Option<&Scene>, rng: &mut R) -> Result<RunReport> {
        info!("Step 1/5: Selecting image...");
        let image = self.selector.select(scene, rng).await?;

        info!("Step 2/5: Generating caption...");
        let attached = (self.attach_image && image.origin == ImageOrigin::Local)
            .then_some(image.path.as_path());
        let caption = self.captions.generate(scene, attached).await?;

        info!("Step 3/5: Preparing audio...");
        let audio = self.prepare_audio(&caption.quote, rng).await?;

        info!("Step 4/5: Rendering video...");
        let video = self
            .renderer
            .render(&image.path, &caption.quote, &audio)
            .await?;

        let Some(publisher) = &self.publisher else {
            info!("Upload disabled, video left at {}", video.display());
            return Ok(RunReport {
                image,
                caption,
                video,
                upload: None,
                archived_to: None,
            });
        };

        info!("Step 5/5: Uploading...");
        let metadata = VideoMetadata::from_caption(&caption, &self.upload);
        let upload = publisher.publish(&video, &metadata).await;

        if let UploadResult::Failed { reason } = &upload {
            warn!("Upload failed, {} was not moved", image.path.display());
            return Err(PipelineError::UploadFailed(reason.clone()));
        }

        let archived_to = match image.origin {
            ImageOrigin::Local => match archive_image(&image.path, &self.used_dir).await {
                Ok(dest) => {
                    info!("Moved {} to {}", image.path.display(), dest.display());
                    Some(dest)
                }
                Err(e) => {
                    error!("Uploaded, but could not archive {}: {}", image.path.display(), e);
                    None
                }
            },
            ImageOrigin::Generated => None,
        };

        if !self.upload.keep_video {
            if let Err(e) = tokio::fs::remove_file(&video).await {
                warn!("Could not remove {}: {}", video.display(), e);
            }
        }

        Ok(RunReport {
            image,
            caption,
            video,
            upload: Some(upload),
            archived_to,
        })
    }

    async fn prepare_audio<R: Rng + ?Sized>(&self, quote: &str, rng: &mut R) -> Result<AudioTrack> {
        match &self.audio {
            AudioSource::Music { dir } => {
                let tracks = list_tracks(dir).await?;
                let path = choose_track(&tracks, dir, rng)?;
                Ok(AudioTrack::probe(path, TrackKind::Music).await)
            }
            AudioSource::Narration {
                synthesizer,
                output,
            } => {
                synthesizer.synthesize(quote, output).await.map_err(|e| {
                    error!("Voice generation failed: {}", e);
                    match e {
                        PipelineError::Speech(_) => e,
                        other => PipelineError::Speech(other.to_string()),
                    }
                })?;
                Ok(AudioTrack::probe(output.clone(), TrackKind::Narration).await)
            }
        }
    }
}

/// Move a published image into the archive directory without overwriting
/// anything already there.
pub async fn archive_image(image: &Path, used_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(used_dir).await?;

    let file_name = image
        .file_name()
        .ok_or_else(|| PipelineError::Config(format!("{} has no file name", image.display())))?;
    let mut dest = used_dir.join(file_name);

    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = image
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut n = 1;
    while tokio::fs::try_exists(&dest).await? {
        dest = used_dir.join(format!("{stem}-{n}{ext}"));
        n += 1;
    }

    match tokio::fs::rename(image, &dest).await {
        Ok(()) => {}
        Err(e) if is_cross_device(&e) => {
            debug!("Cross-device rename, copying {} instead", image.display());
            tokio::fs::copy(image, &dest).await?;
            tokio::fs::remove_file(image).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(dest)
}

/// EXDEV, the error code for a rename across filesystems on Linux and macOS.
fn is_cross_device(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}
