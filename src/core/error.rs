//! Error types for the generation engine.

use thiserror::Error;

/// Failures surfaced by a generation operation.
///
/// None of these are retried inside the engine. Model output is
/// non-deterministic, so the remedy for any of them is a fresh call.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Network, authentication or rate-limit failure from the model call.
    #[error("model call failed: {message}")]
    Transport { status: Option<u16>, message: String },

    /// The model answered with something other than a text block.
    #[error("model returned an unexpected response shape: {0}")]
    UnexpectedResponseShape(String),

    /// The reply could not be turned into the requested structure. The raw
    /// reply is logged by the controller and deliberately not carried here.
    #[error("failed to parse AI response")]
    Parse { reason: String },
}

impl GenerationError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn transport_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Transport { status: Some(429), .. })
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            // Request URLs may carry credentials.
            message: err.without_url().to_string(),
        }
    }
}

/// Parser-level failure. Keeps the raw model text for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse AI response: {reason}")]
pub struct ParseFailure {
    pub reason: String,
    raw: String,
}

impl ParseFailure {
    pub fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    /// Drops the raw text, keeping only what may reach the caller.
    pub fn into_generation_error(self) -> GenerationError {
        GenerationError::Parse {
            reason: self.reason,
        }
    }
}

/// Rejected section lists when a schema is built explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("section schema must contain at least one section")]
    Empty,

    #[error("section name at position {0} is blank")]
    BlankName(usize),

    #[error("duplicate section name: {0}")]
    DuplicateName(String),
}
