use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("No images available in {0} and image generation failed")]
    NoImages(PathBuf),

    #[error("No background music found in {0}")]
    NoMusic(PathBuf),

    #[error("API error: {0}")]
    Api(String),

    #[error("Caption parse error: {0}")]
    CaptionParse(String),

    #[error("All text models failed ({attempts} tried)")]
    AllModelsFailed { attempts: usize },

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("FFmpeg error: {message}")]
    Ffmpeg {
        message: String,
        stderr: Option<String>,
    },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Coarse classification used to pick the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing secrets or inputs; nothing has been touched yet.
    Precondition,
    /// A stage failed and the remaining stages were skipped.
    StageFatal,
    /// Everything rendered but the upload did not go through.
    Upload,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Precondition => 2,
            ErrorKind::StageFatal => 3,
            ErrorKind::Upload => 4,
        }
    }
}

impl PipelineError {
    pub fn ffmpeg(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Ffmpeg {
            message: message.into(),
            stderr,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::MissingCredential(_) | Self::NoImages(_) => {
                ErrorKind::Precondition
            }
            Self::Auth(_) | Self::UploadFailed(_) => ErrorKind::Upload,
            _ => ErrorKind::StageFatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
