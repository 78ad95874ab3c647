use crate::core::config::LlmConfig;
use crate::core::error::GenerationError;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// One model invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCall {
    pub system: String,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub model_id: String,
}

/// Executes a single model call and returns the raw reply text.
///
/// Implementations must not retry; a failed call is reported as is.
#[async_trait]
pub trait GenerationClient: Send + Sync + Debug {
    async fn generate(&self, call: &ModelCall) -> Result<String, GenerationError>;
}

pub fn create_client(config: &LlmConfig) -> anyhow::Result<Box<dyn GenerationClient>> {
    match config.provider.as_str() {
        "anthropic" => {
            let cfg = config.anthropic.as_ref().context("Anthropic config missing")?;
            Ok(Box::new(AnthropicClient::new(&cfg.api_key, &cfg.base_url)))
        }
        "openai" => {
            let cfg = config.openai.as_ref().context("OpenAI config missing")?;
            Ok(Box::new(OpenAIClient::new(&cfg.api_key, cfg.base_url.as_deref())))
        }
        "gemini" => {
            let cfg = config.gemini.as_ref().context("Gemini config missing")?;
            Ok(Box::new(GeminiClient::new(&cfg.api_key)))
        }
        "ollama" => {
            let cfg = config.ollama.as_ref().context("Ollama config missing")?;
            Ok(Box::new(OllamaClient::new(&cfg.base_url)))
        }
        _ => Err(anyhow!("Unknown LLM provider: {}", config.provider)),
    }
}

async fn read_success_body(
    resp: reqwest::Response,
    provider: &str,
) -> Result<String, GenerationError> {
    let status = resp.status();
    if !status.is_success() {
        let error_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(GenerationError::transport_status(
            status.as_u16(),
            format!("{} API error ({}): {}", provider, status, error_text),
        ));
    }
    Ok(resp.text().await?)
}

fn decode<T: for<'de> Deserialize<'de>>(provider: &str, body: &str) -> Result<T, GenerationError> {
    serde_json::from_str(body).map_err(|e| {
        debug!("Undecodable {} response body: {}", provider, body);
        GenerationError::UnexpectedResponseShape(format!("Failed to decode {} response: {}", provider, e))
    })
}

// --- Anthropic ---
#[derive(Debug)]
struct AnthropicClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

fn anthropic_text(response: AnthropicResponse) -> Result<String, GenerationError> {
    let Some(first) = response.content.into_iter().next() else {
        let reason = response.stop_reason.as_deref().unwrap_or("unknown");
        return Err(GenerationError::UnexpectedResponseShape(format!(
            "Anthropic response has no content blocks. Stop reason: {}",
            reason
        )));
    };
    match (first.kind.as_str(), first.text) {
        ("text", Some(text)) => Ok(text),
        (kind, _) => Err(GenerationError::UnexpectedResponseShape(format!(
            "Anthropic returned a '{}' content block instead of text",
            kind
        ))),
    }
}

#[async_trait]
impl GenerationClient for AnthropicClient {
    async fn generate(&self, call: &ModelCall) -> Result<String, GenerationError> {
        let url = format!("{}/messages", self.base_url);

        let request_body = AnthropicRequest {
            model: call.model_id.clone(),
            max_tokens: call.max_output_tokens,
            system: call.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: call.prompt.clone(),
            }],
        };

        debug!("Anthropic request: model={} max_tokens={}", call.model_id, call.max_output_tokens);
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request_body)
            .send()
            .await?;

        let body = read_success_body(resp, "Anthropic").await?;
        anthropic_text(decode("Anthropic", &body)?)
    }
}

// --- OpenAI ---
#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(api_key: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<OpenAIMessage>,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

fn openai_text(response: OpenAIResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            GenerationError::UnexpectedResponseShape(
                "OpenAI response empty or missing text content".to_string(),
            )
        })
}

#[async_trait]
impl GenerationClient for OpenAIClient {
    async fn generate(&self, call: &ModelCall) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::new();
        if !call.system.is_empty() {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: call.system.clone(),
            });
        }
        messages.push(OpenAIMessage {
            role: "user".to_string(),
            content: call.prompt.clone(),
        });

        let request_body = OpenAIRequest {
            model: call.model_id.clone(),
            max_tokens: call.max_output_tokens,
            messages,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        let body = read_success_body(resp, "OpenAI").await?;
        openai_text(decode("OpenAI", &body)?)
    }
}

// --- Gemini ---
#[derive(Debug)]
struct GeminiClient {
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

fn gemini_text(response: GeminiResponse) -> Result<String, GenerationError> {
    if let Some(err) = response.error {
        return Err(GenerationError::transport(format!(
            "Gemini API returned error: {}",
            err.message
        )));
    }

    let first = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| {
            GenerationError::UnexpectedResponseShape("Gemini response has no candidates".to_string())
        })?;

    if let Some(text) = first
        .content
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
    {
        return Ok(text);
    }

    // Blocked or non-text candidates carry no text part.
    let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
    Err(GenerationError::UnexpectedResponseShape(format!(
        "Gemini response has no text part. Finish reason: {}",
        reason
    )))
}

fn gemini_url(model_id: &str) -> String {
    format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
        model_id
    )
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, call: &ModelCall) -> Result<String, GenerationError> {
        let url = gemini_url(&call.model_id);

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: call.prompt.clone(),
                }],
            }],
            system_instruction: (!call.system.is_empty()).then(|| GeminiSystemInstruction {
                parts: vec![GeminiPart {
                    text: call.system.clone(),
                }],
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: call.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let body = read_success_body(resp, "Gemini").await?;
        gemini_text(decode("Gemini", &body)?)
    }
}

// --- Ollama ---
#[derive(Debug)]
struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessageResponse,
}

#[derive(Debug, Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(&self, call: &ModelCall) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);

        let request_body = OllamaRequest {
            model: call.model_id.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: call.system.clone(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: call.prompt.clone(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                num_predict: call.max_output_tokens,
            },
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;

        let body = read_success_body(resp, "Ollama").await?;
        let result: OllamaResponse = decode("Ollama", &body)?;
        Ok(result.message.content)
    }
}
