use serde_json::Value;

use super::GenerationError;
use crate::models::ConceptBrief;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that breaks down ideas into structured concepts. Always return valid JSON arrays.";

/// Wrap a TOON-encoded breakdown request in the user prompt.
pub fn build_prompt(toon: &str) -> String {
    format!(
        "Break down the following concept into 3-7 high-level sub-concepts. \
Each sub-concept should have a clear title and a brief description (1-2 sentences).

Use the provided context (in TOON format) to ensure the breakdown is relevant and appropriate. \
The sub-concepts should be components or aspects of the concept being broken down, \
fitting within the overall idea context.

REQUEST DATA (TOON format):
{toon}

Return only a JSON array of objects with \"title\" and \"description\" fields, no other text.

Format your response as a JSON array like this:
[
  {{\"title\": \"Sub-concept Title\", \"description\": \"Sub-concept description\"}},
  {{\"title\": \"Another Sub-concept\", \"description\": \"Another description\"}}
]"
    )
}

/// Pull the concept list out of a model reply.
///
/// Models like to wrap JSON in prose or code fences, so the outermost
/// `[`..`]` span is parsed when there is one. Elements without a non-blank
/// string title and description are dropped; only an empty result is an error.
pub fn parse_concepts(content: &str) -> Result<Vec<ConceptBrief>, GenerationError> {
    let json = match (content.find('['), content.rfind(']')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    };

    let value: Value =
        serde_json::from_str(json).map_err(|err| GenerationError::Parse(err.to_string()))?;
    let Value::Array(items) = value else {
        return Err(GenerationError::Validation(
            "Invalid response format from AI".to_string(),
        ));
    };

    let concepts: Vec<ConceptBrief> = items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?.trim();
            let description = item.get("description")?.as_str()?.trim();
            (!title.is_empty() && !description.is_empty())
                .then(|| ConceptBrief::new(title, description))
        })
        .collect();

    if concepts.is_empty() {
        return Err(GenerationError::Validation(
            "No valid concepts generated".to_string(),
        ));
    }

    if concepts.len() < items.len() {
        tracing::debug!(
            kept = concepts.len(),
            dropped = items.len() - concepts.len(),
            "Dropped malformed concepts from generation response"
        );
    }

    Ok(concepts)
}
