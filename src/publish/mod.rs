//! Uploading the finished video.

mod credentials;
mod youtube;

use std::path::Path;

use async_trait::async_trait;

use crate::caption::CaptionPayload;
use crate::config::UploadConfig;

pub use credentials::{CredentialProvider, OAuthCredentials};
pub use youtube::YouTubeUploader;

const MAX_TITLE_CHARS: usize = 100;
const SHORTS_TAG: &str = "#Shorts";
const DEFAULT_DESCRIPTION: &str = "Jai Shree Krishna. Daily Motivation. #Bhakti #Hinduism";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
    pub made_for_kids: bool,
}

impl VideoMetadata {
    pub fn from_caption(caption: &CaptionPayload, config: &UploadConfig) -> Self {
        let base = if caption.title.is_empty() {
            caption.quote.as_str()
        } else {
            caption.title.as_str()
        };
        let description = if caption.description.is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            caption.description.clone()
        };

        Self {
            title: shorts_title(base),
            description,
            tags: config.tags.clone(),
            category_id: config.category_id.clone(),
            privacy_status: config.privacy_status.clone(),
            made_for_kids: false,
        }
    }
}

/// Title with `#Shorts`, cut to the platform's character limit.
fn shorts_title(base: &str) -> String {
    let base = base.trim();
    if base.to_lowercase().contains(&SHORTS_TAG.to_lowercase()) {
        return base.chars().take(MAX_TITLE_CHARS).collect();
    }
    let room = MAX_TITLE_CHARS - SHORTS_TAG.chars().count() - 1;
    let head: String = base.chars().take(room).collect();
    format!("{} {}", head.trim_end(), SHORTS_TAG)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Published { video_id: String },
    Failed { reason: String },
}

/// Sends a video to the hosting platform. Failures are reported, not raised.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, video: &Path, metadata: &VideoMetadata) -> UploadResult;
}
