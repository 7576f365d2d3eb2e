use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::info;

use crate::error::{PipelineError, Result};

const POLLINATIONS_API: &str = "https://image.pollinations.ai";

/// Text-to-image service writing raw image bytes to disk.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, output_path: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PollinationsClient {
    base_url: String,
    width: u32,
    height: u32,
    client: Client,
}

impl PollinationsClient {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::with_base_url(POLLINATIONS_API, width, height)
    }

    pub fn with_base_url(base_url: impl Into<String>, width: u32, height: u32) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(180)).build()?;
        Ok(Self {
            base_url: base_url.into(),
            width,
            height,
            client,
        })
    }

    fn url(&self, prompt: &str, seed: u32) -> String {
        format!(
            "{}/prompt/{}?width={}&height={}&seed={}&nologo=true",
            self.base_url,
            urlencoding::encode(prompt),
            self.width,
            self.height,
            seed
        )
    }
}

#[async_trait]
impl ImageGenerator for PollinationsClient {
    async fn generate(&self, prompt: &str, output_path: &Path) -> Result<()> {
        info!("Generating image for prompt: {}", prompt);

        let url = self.url(prompt, rand::random::<u32>());
        let response = self.client.get(&url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(PipelineError::Api(format!(
                "Image generation returned HTTP {}",
                response.status()
            )));
        }

        let image_data = response.bytes().await?;
        if image_data.is_empty() {
            return Err(PipelineError::Api("Image generation returned no data".to_string()));
        }

        tokio::fs::write(output_path, &image_data).await?;
        info!("Image saved to: {}", output_path.display());
        Ok(())
    }
}
