//! Generative text collaborators
//!
//! Supported providers:
//! - OpenAI-compatible chat completions (`/v1/chat/completions`)
//! - Ollama (`/api/generate`)
//!
//! Both accept an optional image, sent as a base64 payload with its media type.

pub mod prompts;

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

pub use prompts::DocumentPrompts;
pub use prompts::PromptTemplate;

use crate::config::AppConfig;
use crate::errors::DocRagError;
use crate::errors::Result;

/// Image attached to a generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl ImageInput {
    /// Wrap image bytes, deriving the media type from the object key
    pub fn from_key(key: &str, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: media_type_for_key(key).to_string(),
        }
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

/// Media type from the file extension; PNG when unknown
pub fn media_type_for_key(key: &str) -> &'static str {
    let lower = key.to_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/png"
    }
}

/// Prompt (plus optional image) in, text out
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str, image: Option<&ImageInput>) -> Result<String>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl LlmProvider {
    /// Pick the provider from the configured key and endpoint
    pub fn detect(endpoint: &str, key: &str) -> Self {
        if key == "ollama" || endpoint.contains(":11434") {
            LlmProvider::Ollama
        } else {
            LlmProvider::OpenAI
        }
    }
}

/// HTTP text generator
pub struct LlmService {
    provider: LlmProvider,
    endpoint: String,
    api_key: String,
    model: String,
    vision_model: String,
    temperature: f32,
    max_tokens: usize,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

impl LlmService {
    /// # Errors
    /// - `HttpError` if the HTTP client cannot be built
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.generation_timeout() + Duration::from_secs(5))
            .build()
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;

        Ok(Self {
            provider: LlmProvider::detect(config.llm_endpoint(), config.llm_key()),
            endpoint: config.llm_endpoint().trim_end_matches('/').to_string(),
            api_key: config.llm_key().to_string(),
            model: config.llm_model().to_string(),
            vision_model: config.llm.vision_model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            client,
        })
    }

    #[must_use]
    pub const fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn model_for(&self, image: Option<&ImageInput>) -> &str {
        if image.is_some() {
            &self.vision_model
        } else {
            &self.model
        }
    }

    async fn generate_openai(&self, prompt: &str, image: Option<&ImageInput>) -> Result<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<Message>,
            temperature: f32,
            max_tokens: usize,
        }

        #[derive(Serialize)]
        struct Message {
            role: &'static str,
            content: Vec<ContentPart>,
        }

        #[derive(Serialize)]
        #[serde(tag = "type", rename_all = "snake_case")]
        enum ContentPart {
            Text { text: String },
            ImageUrl { image_url: ImageUrl },
        }

        #[derive(Serialize)]
        struct ImageUrl {
            url: String,
        }

        let mut content = Vec::new();
        if let Some(image) = image {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", image.media_type, image.to_base64()),
                },
            });
        }
        content.push(ContentPart::Text {
            text: prompt.to_string(),
        });

        let request = Request {
            model: self.model_for(image),
            messages: vec![Message {
                role: "user",
                content,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = if self.endpoint.ends_with("/v1") {
            format!("{}/chat/completions", self.endpoint)
        } else {
            format!("{}/v1/chat/completions", self.endpoint)
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocRagError::LlmError(format!(
                "OpenAI API error: {status} - {error_text}"
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| DocRagError::LlmError("No completion choices returned".to_string()))
    }

    async fn generate_ollama(&self, prompt: &str, image: Option<&ImageInput>) -> Result<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            images: Vec<String>,
            options: Options,
        }

        #[derive(Serialize)]
        struct Options {
            temperature: f32,
            num_predict: usize,
        }

        let request = Request {
            model: self.model_for(image),
            prompt,
            stream: false,
            images: image.map(|i| vec![i.to_base64()]).unwrap_or_default(),
            options: Options {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocRagError::LlmError(format!(
                "Ollama API error: {status} - {error_text}"
            )));
        }

        let body: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| DocRagError::HttpError(e.to_string()))?;
        Ok(body.response.trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for LlmService {
    async fn generate_text(&self, prompt: &str, image: Option<&ImageInput>) -> Result<String> {
        debug!(
            "Generating with {:?} model {} ({} prompt chars, image: {})",
            self.provider,
            self.model_for(image),
            prompt.len(),
            image.is_some()
        );
        match self.provider {
            LlmProvider::OpenAI => self.generate_openai(prompt, image).await,
            LlmProvider::Ollama => self.generate_ollama(prompt, image).await,
        }
    }

    fn name(&self) -> &str {
        match self.provider {
            LlmProvider::OpenAI => "openai",
            LlmProvider::Ollama => "ollama",
        }
    }
}

/// Stand-in when no generator is configured; every call fails
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate_text(&self, _prompt: &str, _image: Option<&ImageInput>) -> Result<String> {
        Err(DocRagError::LlmError(
            "Text generation is not configured".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
