use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One node of an idea's decomposition tree.
///
/// A concept exclusively owns its `children`. `parent_id` mirrors the
/// structure: it is `Some` exactly when the node lives inside another
/// concept's `children`, and `None` when it sits in the idea's root list.
///
/// Handles into the tree are ids. Anything returned from a lookup is an owned
/// snapshot; re-resolve by id after every await instead of holding on to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub children: Vec<Concept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Concept {
    /// Build a fresh node with a new id and its own empty child list.
    pub fn new(input: CreateConceptInput, parent_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            completed: input.completed,
            children: Vec::new(),
            parent_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    pub fn brief(&self) -> ConceptBrief {
        ConceptBrief {
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}

/// Input for creating a new concept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConceptInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

impl CreateConceptInput {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            completed: false,
        }
    }
}

impl From<ConceptBrief> for CreateConceptInput {
    fn from(brief: ConceptBrief) -> Self {
        Self {
            title: brief.title,
            description: brief.description,
            completed: false,
        }
    }
}

/// Input for updating an existing concept. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConceptInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl UpdateConceptInput {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.completed.is_none()
    }
}

/// Title and description only. Used for ancestor context in breakdown
/// requests and for the concepts a breakdown proposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptBrief {
    pub title: String,
    pub description: String,
}

impl ConceptBrief {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}
