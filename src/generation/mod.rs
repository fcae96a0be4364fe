//! Generation collaborator: proposes child concepts for a concept.
//!
//! The engine only depends on [`Generator`]; [`HttpGenerator`] is the
//! production implementation talking to OpenAI or a local Ollama server.

mod http;
mod parse;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{BreakdownRequest, BreakdownResponse};

pub use http::HttpGenerator;
pub use parse::{build_prompt, parse_concepts, SYSTEM_PROMPT};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {0}")]
    Status(String),

    #[error("Failed to parse AI response: {0}")]
    Parse(String),

    /// Parsed fine but nothing usable came back.
    #[error("{0}")]
    Validation(String),

    #[error("OpenAI API key is not configured and Ollama is not enabled")]
    NotConfigured,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Propose sub-concepts for `request.concept`, using `request.context`.
    async fn break_down(
        &self,
        request: &BreakdownRequest,
    ) -> Result<BreakdownResponse, GenerationError>;
}
