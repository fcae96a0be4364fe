//! Environment-driven configuration.
//!
//! - `BREAKITDOWN_DB` - SQLite path (default: platform data dir)
//! - `USE_OLLAMA` - `true` to generate with a local Ollama server
//! - `OLLAMA_URL` / `OLLAMA_MODEL`
//! - `OPENAI_API_KEY` / `OPENAI_MODEL` / `OPENAI_BASE_URL`
//! - `BREAKDOWN_SETTLE_MS` - how long a settled breakdown stays registered as
//!   in flight, to coalesce rapid repeat calls (default: 0)

use std::time::Duration;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "gpt-oss:20b";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Which model provider the HTTP generator talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationConfig {
    OpenAi {
        base_url: String,
        api_key: Option<String>,
        model: String,
    },
    Ollama {
        base_url: String,
        model: String,
    },
}

impl GenerationConfig {
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi { model, .. } | Self::Ollama { model, .. } => model,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub generation: GenerationConfig,
    pub settle_grace: Duration,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let use_ollama = get("USE_OLLAMA").is_some_and(|value| value == "true");
        let generation = if use_ollama {
            GenerationConfig::Ollama {
                base_url: get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
                model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            }
        } else {
            GenerationConfig::OpenAi {
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
                api_key: get("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            }
        };

        let settle_grace = get("BREAKDOWN_SETTLE_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);

        Self {
            generation,
            settle_grace,
        }
    }
}
