use serde::{Deserialize, Serialize};

use super::{ConceptBrief, TokenUsage};

/// Everything the generation collaborator is told about the concept being
/// broken down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRequest {
    pub concept: ConceptBrief,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BreakdownContext>,
}

/// Where the concept sits: the idea it belongs to and its ancestors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idea_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_idea: Option<String>,
    /// Ancestors ordered root-first, excluding the concept itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_chain: Vec<ConceptBrief>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
}

/// Proposed child concepts plus the cost of producing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownResponse {
    pub concepts: Vec<ConceptBrief>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}
