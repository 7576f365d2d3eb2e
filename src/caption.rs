//! Caption generation.
//!
//! A prompt asks a text model for a JSON object with a quote, a title and a
//! description. Models are tried in priority order; the first one whose answer
//! parses wins.

use std::path::Path;

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::scene::Scene;

/// Quote, title and description for one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionPayload {
    pub quote: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Image sent inline with the prompt.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 encoded bytes
    pub data: String,
}

impl InlineImage {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            _ => "image/jpeg",
        };
        Ok(Self {
            mime_type: mime_type.to_string(),
            data: BASE64_STANDARD.encode(bytes),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

/// One model able to turn a prompt into free text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &TextRequest) -> Result<String>;
}

pub fn build_prompt(scene: Option<&Scene>, language: &str) -> String {
    let theme = match scene {
        Some(scene) => format!(
            "The video shows: {}. Match the quote to this scene.\n",
            scene.label
        ),
        None => String::new(),
    };

    format!(
        r#"You are a spiritual content creator making a devotional YouTube Short about Lord Krishna.
{theme}If an image is attached, first identify its emotion (Peace, Love, Power, Wisdom) and write for that emotion.

Return ONLY a single JSON object with exactly these three fields:
{{
  "quote": "A powerful, short {language} spiritual quote (max 15 words). No emoji, no hashtags, no English.",
  "title": "A catchy video title (max 60 characters). Emoji allowed.",
  "description": "Two or three devotional sentences. Emoji allowed. End with 3 to 5 hashtags."
}}

Do not add any text before or after the JSON."#
    )
}

/// Slice the JSON object out of a model answer.
///
/// Code fences are stripped, then everything from the first `{` to the last
/// `}` (inclusive) is returned.
pub fn extract_json(text: &str) -> Result<&str> {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text).trim();

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(PipelineError::CaptionParse(format!(
            "no JSON object found in response: {}",
            preview(text)
        ))),
    }
}

pub fn parse_caption(text: &str) -> Result<CaptionPayload> {
    let json = extract_json(text)?;
    let mut payload: CaptionPayload = serde_json::from_str(json)
        .map_err(|e| PipelineError::CaptionParse(format!("invalid caption JSON: {}", e)))?;

    payload.quote = payload.quote.trim().to_string();
    payload.title = payload.title.trim().to_string();
    payload.description = payload.description.trim().to_string();

    if payload.quote.is_empty() {
        return Err(PipelineError::CaptionParse("empty quote".to_string()));
    }
    Ok(payload)
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.to_string()
    }
}

pub struct CaptionGenerator {
    providers: Vec<Box<dyn TextGenerator>>,
    language: String,
}

impl CaptionGenerator {
    pub fn new(providers: Vec<Box<dyn TextGenerator>>, language: impl Into<String>) -> Self {
        Self {
            providers,
            language: language.into(),
        }
    }

    pub async fn generate(
        &self,
        scene: Option<&Scene>,
        image: Option<&Path>,
    ) -> Result<CaptionPayload> {
        let image = match image {
            Some(path) => match InlineImage::from_path(path).await {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!("Could not attach {} to prompt: {}", path.display(), e);
                    None
                }
            },
            None => None,
        };
        let request = TextRequest {
            prompt: build_prompt(scene, &self.language),
            image,
        };

        for provider in &self.providers {
            info!("Trying model: {}", provider.name());
            let result = match provider.generate(&request).await {
                Ok(text) => parse_caption(&text),
                Err(e) => Err(e),
            };
            match result {
                Ok(payload) => {
                    info!("Generated quote with {}: {}", provider.name(), payload.quote);
                    return Ok(payload);
                }
                Err(e) => warn!("Model {} failed: {}", provider.name(), e),
            }
        }

        Err(PipelineError::AllModelsFailed {
            attempts: self.providers.len(),
        })
    }
}
