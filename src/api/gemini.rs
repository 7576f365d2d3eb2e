use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::caption::{TextGenerator, TextRequest};
use crate::error::{PipelineError, Result};

const GEMINI_API: &str = "https://generativelanguage.googleapis.com";
/// The key travels in this header so it never appears in a request URL.
pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
    #[serde(default, rename = "supportedGenerationMethods")]
    supported_generation_methods: Vec<String>,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, GEMINI_API)
    }

    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            api_key,
            base_url: base_url.into(),
            client,
        })
    }

    /// First four characters of the key, for diagnostics.
    pub fn key_hint(&self) -> String {
        format!("{}...", self.api_key.chars().take(4).collect::<String>())
    }

    pub async fn generate_content(&self, model: &str, request: &TextRequest) -> Result<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        let mut parts = Vec::with_capacity(2);
        if let Some(image) = &request.image {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: &image.mime_type,
                    data: &image.data,
                },
            });
        }
        parts.push(Part::Text {
            text: &request.prompt,
        });
        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Api(format!(
                "Gemini API returned {} for {}: {}",
                status, model, error_text
            )));
        }

        let response: GenerateResponse = response.json().await?;
        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PipelineError::Api(format!("No content in {} response", model)))?;

        debug!("Raw response from {}: {}", model, text);
        Ok(text)
    }

    /// Models available to this key that support `generateContent`.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1beta/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Api(format!(
                "Could not list models ({}): {}",
                status, error_text
            )));
        }

        let response: ListModelsResponse = response.json().await?;
        let models: Vec<String> = response
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| m.name)
            .collect();

        info!("Found {} text generation models", models.len());
        Ok(models)
    }
}

/// One Gemini model id in the caption fallback chain.
pub struct GeminiModel {
    client: Arc<GeminiClient>,
    model: String,
}

impl GeminiModel {
    pub fn new(client: Arc<GeminiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn chain(client: Arc<GeminiClient>, models: &[String]) -> Vec<Box<dyn TextGenerator>> {
        models
            .iter()
            .map(|model| Box::new(Self::new(client.clone(), model.clone())) as Box<dyn TextGenerator>)
            .collect()
    }
}

#[async_trait]
impl TextGenerator for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &TextRequest) -> Result<String> {
        self.client.generate_content(&self.model, request).await
    }
}
