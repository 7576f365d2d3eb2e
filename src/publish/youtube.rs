use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::{PipelineError, Result};
use crate::publish::credentials::CredentialProvider;
use crate::publish::{Publisher, UploadResult, VideoMetadata};

const YOUTUBE_API: &str = "https://www.googleapis.com";

#[derive(Debug, Deserialize)]
struct InsertResponse {
    id: String,
}

pub struct YouTubeUploader {
    credentials: CredentialProvider,
    base_url: String,
}

impl YouTubeUploader {
    pub fn new(credentials: CredentialProvider) -> Self {
        Self::with_base_url(credentials, YOUTUBE_API)
    }

    pub fn with_base_url(credentials: CredentialProvider, base_url: impl Into<String>) -> Self {
        Self {
            credentials,
            base_url: base_url.into(),
        }
    }

    async fn upload(&self, video: &Path, metadata: &VideoMetadata) -> Result<String> {
        let client = self.credentials.authorized_client().await?;

        let snippet = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "tags": metadata.tags,
                "categoryId": metadata.category_id
            },
            "status": {
                "privacyStatus": metadata.privacy_status,
                "selfDeclaredMadeForKids": metadata.made_for_kids
            }
        });
        let video_bytes = tokio::fs::read(video).await?;
        let boundary = format!("bhakti-shorts-{:016x}", rand::random::<u64>());
        let body = multipart_related(&boundary, &serde_json::to_vec(&snippet)?, &video_bytes);

        let url = format!(
            "{}/upload/youtube/v3/videos?uploadType=multipart&part=snippet,status",
            self.base_url
        );
        info!(
            "Uploading {} ({} bytes) as \"{}\"",
            video.display(),
            video_bytes.len(),
            metadata.title
        );

        let response = client
            .authorize(client.client.post(&url))
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::UploadFailed(format!(
                "YouTube returned {}: {}",
                status, error_text
            )));
        }

        let inserted: InsertResponse = response.json().await?;
        Ok(inserted.id)
    }
}

/// Two-part `multipart/related` body: JSON metadata, then the video bytes.
fn multipart_related(boundary: &str, metadata: &[u8], media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{boundary}\r\nContent-Type: video/mp4\r\n\r\n").as_bytes());
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl Publisher for YouTubeUploader {
    async fn publish(&self, video: &Path, metadata: &VideoMetadata) -> UploadResult {
        match self.upload(video, metadata).await {
            Ok(video_id) => {
                info!("Upload success! Video ID: {}", video_id);
                UploadResult::Published { video_id }
            }
            Err(e) => {
                error!("Upload failed: {:?}", e);
                UploadResult::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
