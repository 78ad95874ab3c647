pub mod llm;
pub mod prompt;
pub mod regeneration;
pub mod script;
pub mod session;
