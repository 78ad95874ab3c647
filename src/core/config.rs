use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

pub const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    /// Print results as JSON instead of starting the interactive session.
    #[serde(default)]
    pub unattended: bool,

    pub llm: LlmConfig,

    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String, // "anthropic", "openai", "gemini" or "ollama"
    pub model: String,
    pub anthropic: Option<AnthropicConfig>,
    pub openai: Option<OpenAIConfig>,
    pub gemini: Option<GeminiConfig>,
    pub ollama: Option<OllamaConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

/// Output token budgets. Batch and reprompt calls share the larger one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    #[serde(default = "default_batch_max_tokens")]
    pub batch_max_tokens: u32,
    #[serde(default = "default_section_max_tokens")]
    pub section_max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch_max_tokens: default_batch_max_tokens(),
            section_max_tokens: default_section_max_tokens(),
        }
    }
}

fn default_output() -> String {
    "output".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}
fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_batch_max_tokens() -> u32 {
    4096
}
fn default_section_max_tokens() -> u32 {
    1024
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the selected provider is configured and its URLs parse.
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            bail!("llm.model must not be empty");
        }
        if self.generation.batch_max_tokens == 0 || self.generation.section_max_tokens == 0 {
            bail!("generation token budgets must be greater than zero");
        }

        match self.llm.provider.as_str() {
            "anthropic" => {
                let cfg = self.llm.anthropic.as_ref().context("Anthropic config missing")?;
                check_url("llm.anthropic.base_url", &cfg.base_url)?;
            }
            "openai" => {
                let cfg = self.llm.openai.as_ref().context("OpenAI config missing")?;
                if let Some(base_url) = &cfg.base_url {
                    check_url("llm.openai.base_url", base_url)?;
                }
            }
            "gemini" => {
                self.llm.gemini.as_ref().context("Gemini config missing")?;
            }
            "ollama" => {
                let cfg = self.llm.ollama.as_ref().context("Ollama config missing")?;
                check_url("llm.ollama.base_url", &cfg.base_url)?;
            }
            other => bail!("Unknown LLM provider: {}", other),
        }
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        Ok(())
    }
}

fn check_url(field: &str, value: &str) -> Result<()> {
    Url::parse(value).with_context(|| format!("{} is not a valid URL: {}", field, value))?;
    Ok(())
}
