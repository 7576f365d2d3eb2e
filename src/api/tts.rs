use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::gemini::API_KEY_HEADER;
use crate::error::{PipelineError, Result};

const GOOGLE_TTS_API: &str = "https://texttospeech.googleapis.com";

/// Turns text into a spoken audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<()>;
}

#[derive(Clone)]
pub struct GoogleTts {
    api_key: String,
    base_url: String,
    language_code: String,
    voice: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

impl GoogleTts {
    pub fn new(api_key: String, language_code: String, voice: String) -> Result<Self> {
        Self::with_base_url(api_key, GOOGLE_TTS_API, language_code, voice)
    }

    pub fn with_base_url(
        api_key: String,
        base_url: impl Into<String>,
        language_code: String,
        voice: String,
    ) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            api_key,
            base_url: base_url.into(),
            language_code,
            voice,
            client,
        })
    }

    async fn request_audio(&self, text: &str) -> Result<Vec<u8>> {
        let url = format!("{}/v1/text:synthesize", self.base_url);
        let request_body = json!({
            "input": { "text": text },
            "voice": {
                "languageCode": self.language_code,
                "name": self.voice
            },
            "audioConfig": { "audioEncoding": "MP3" }
        });

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Speech(format!(
                "TTS API returned {}: {}",
                status, error_text
            )));
        }

        let response: SynthesizeResponse = response.json().await?;
        BASE64_STANDARD
            .decode(response.audio_content)
            .map_err(|e| PipelineError::Speech(format!("Invalid audio content: {}", e)))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str, output_path: &Path) -> Result<()> {
        info!("Generating speech with voice {}", self.voice);

        let audio = self
            .request_audio(text)
            .await
            .map_err(|e| match e {
                PipelineError::Speech(_) => e,
                other => PipelineError::Speech(other.to_string()),
            })?;

        tokio::fs::write(output_path, audio).await?;
        info!("Speech saved to: {}", output_path.display());
        Ok(())
    }
}
