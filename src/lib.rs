//! Ad-copy generation engine.
//!
//! Composes prompts from project, format and mechanism context, makes one
//! model call per operation and parses the reply into section-keyed
//! [`ScriptVariation`]s.

pub mod core;
pub mod services;

pub use crate::core::config::Config;
pub use crate::core::error::{GenerationError, ParseFailure, SchemaError};
pub use crate::core::model::{
    FormatContext, GenerationOutcome, GenerationRequest, Mechanism, ParsedBatch, ProjectContext,
    RequestContext, ScriptVariation,
};
pub use crate::core::schema::SectionSchema;
pub use crate::services::llm::{create_client, GenerationClient, ModelCall};
pub use crate::services::regeneration::RegenerationController;
