use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Concept, TokenUsage};

/// The root container of a decomposition.
///
/// `root_idea` is the free-text prompt the user started from; `concepts` is the
/// root list of the concept forest. `token_usage` is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub id: Uuid,
    pub name: String,
    pub root_idea: String,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub token_usage: Vec<TokenUsage>,
}

impl Idea {
    pub fn new(name: impl Into<String>, root_idea: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            root_idea: root_idea.into(),
            concepts: Vec::new(),
            created_at: now,
            updated_at: now,
            token_usage: Vec::new(),
        }
    }

    /// Total number of concepts in the forest.
    pub fn concept_count(&self) -> usize {
        self.concepts
            .iter()
            .map(|concept| 1 + concept.descendant_count())
            .sum()
    }
}

/// Lightweight listing entry for ideas held by storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaSummary {
    pub id: Uuid,
    pub name: String,
    pub concept_count: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Idea> for IdeaSummary {
    fn from(idea: &Idea) -> Self {
        Self {
            id: idea.id,
            name: idea.name.clone(),
            concept_count: idea.concept_count(),
            updated_at: idea.updated_at,
        }
    }
}
