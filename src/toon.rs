//! TOON: a compact, CSV-like text encoding for tree context.
//!
//! Used to shrink the payload sent to the generation collaborator. Persisted
//! ideas are plain JSON; TOON is only a transport and export format.
//!
//! ```text
//! concept{title,description}:
//!   Frontend,"Buttons, forms and layout"
//! parentChain[1]{title,description}:
//!   Web app,The whole thing
//! ```
//!
//! Rules:
//! - object: `key{f1,f2}:` then one indented row of values
//! - uniform array: `key[N]{f1,f2}:` then N indented rows, in order
//! - values containing a comma, double quote or newline are wrapped in double
//!   quotes with inner quotes doubled; a missing value is an empty field
//! - each nesting level indents by [`INDENT_STEP`] spaces

use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::models::{BreakdownRequest, Concept, Idea};

pub const INDENT_STEP: usize = 2;

const CONCEPT_FIELDS: &[&str] = &[
    "id",
    "title",
    "description",
    "completed",
    "parentId",
    "createdAt",
    "updatedAt",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToonError {
    #[error("unterminated quoted value")]
    UnterminatedQuote,

    #[error("unexpected quote at byte {0}")]
    UnexpectedQuote(usize),

    #[error("expected one value, found {0}")]
    NotSingleValue(usize),
}

/// Escape one value CSV-style.
pub fn escape_value(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Inverse of [`escape_value`] for a single field.
pub fn unescape_value(field: &str) -> Result<String, ToonError> {
    let mut fields = split_row(field)?;
    match fields.len() {
        1 => Ok(fields.remove(0)),
        // A bare comma can only appear inside quotes in an escaped value.
        n => Err(ToonError::NotSingleValue(n)),
    }
}

/// Split one data row into unescaped values.
///
/// A row may span several physical lines when a quoted value holds newlines.
pub fn split_row(row: &str) -> Result<Vec<String>, ToonError> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = row.char_indices().peekable();
    let mut in_quotes = false;
    let mut field_start = true;

    while let Some((pos, ch)) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if matches!(chars.peek(), Some((_, '"'))) {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                    match chars.peek() {
                        None | Some((_, ',')) => {}
                        Some((next, _)) => return Err(ToonError::UnexpectedQuote(*next)),
                    }
                }
            } else {
                current.push(ch);
            }
            continue;
        }

        match ch {
            '"' if field_start => {
                in_quotes = true;
                field_start = false;
            }
            '"' => return Err(ToonError::UnexpectedQuote(pos)),
            ',' => {
                values.push(std::mem::take(&mut current));
                field_start = true;
            }
            _ => {
                current.push(ch);
                field_start = false;
            }
        }
    }

    if in_quotes {
        return Err(ToonError::UnterminatedQuote);
    }
    values.push(current);
    Ok(values)
}

fn row(values: &[Option<String>]) -> String {
    values
        .iter()
        .map(|value| value.as_deref().map(escape_value).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(",")
}

/// Encode a single object.
pub fn object_to_toon(key: &str, fields: &[(&str, Option<String>)], indent: usize) -> String {
    let pad = " ".repeat(indent);
    if fields.is_empty() {
        return format!("{pad}{key}{{}}:\n");
    }

    let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
    let values: Vec<Option<String>> = fields.iter().map(|(_, value)| value.clone()).collect();
    format!(
        "{pad}{key}{{{}}}:\n{}{}\n",
        names.join(","),
        " ".repeat(indent + INDENT_STEP),
        row(&values)
    )
}

/// Encode a uniform array. Each row holds one value per field, in field order.
pub fn array_to_toon(
    key: &str,
    fields: &[&str],
    rows: &[Vec<Option<String>>],
    indent: usize,
) -> String {
    let pad = " ".repeat(indent);
    if rows.is_empty() {
        return format!("{pad}{key}[0]{{}}:\n");
    }

    let data_pad = " ".repeat(indent + INDENT_STEP);
    let mut out = format!("{pad}{key}[{}]{{{}}}:\n", rows.len(), fields.join(","));
    for values in rows {
        out.push_str(&data_pad);
        out.push_str(&row(values));
        out.push('\n');
    }
    out
}

/// Encode what the generation collaborator needs to know about a breakdown.
///
/// Empty context fields are left out; the parent chain block only appears
/// when there are ancestors.
pub fn breakdown_request_to_toon(request: &BreakdownRequest) -> String {
    let mut out = object_to_toon(
        "concept",
        &[
            ("title", Some(request.concept.title.clone())),
            ("description", Some(request.concept.description.clone())),
        ],
        0,
    );

    let Some(context) = &request.context else {
        return out;
    };

    let mut fields: Vec<(&str, Option<String>)> = Vec::new();
    if let Some(name) = context.idea_name.as_ref().filter(|s| !s.is_empty()) {
        fields.push(("ideaName", Some(name.clone())));
    }
    if let Some(root) = context.root_idea.as_ref().filter(|s| !s.is_empty()) {
        fields.push(("rootIdea", Some(root.clone())));
    }
    if let Some(depth) = context.depth {
        fields.push(("depth", Some(depth.to_string())));
    }
    if !fields.is_empty() {
        out.push_str(&object_to_toon("context", &fields, 0));
    }

    if !context.parent_chain.is_empty() {
        let rows: Vec<Vec<Option<String>>> = context
            .parent_chain
            .iter()
            .map(|brief| vec![Some(brief.title.clone()), Some(brief.description.clone())])
            .collect();
        out.push_str(&array_to_toon(
            "parentChain",
            &["title", "description"],
            &rows,
            0,
        ));
    }

    out
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Encode a concept forest; each node's children follow its row as a nested
/// block one level deeper.
pub fn concepts_to_toon(concepts: &[Concept], indent: usize) -> String {
    if concepts.is_empty() {
        return String::new();
    }

    let data_pad = " ".repeat(indent + INDENT_STEP);
    let mut out = format!(
        "{}concepts[{}]{{{}}}:\n",
        " ".repeat(indent),
        concepts.len(),
        CONCEPT_FIELDS.join(",")
    );

    for concept in concepts {
        let values = [
            Some(concept.id.to_string()),
            Some(concept.title.clone()),
            Some(concept.description.clone()),
            Some(concept.completed.to_string()),
            concept.parent_id.map(|id| id.to_string()),
            Some(iso(concept.created_at)),
            Some(iso(concept.updated_at)),
        ];
        out.push_str(&data_pad);
        out.push_str(&row(&values));
        out.push('\n');
        out.push_str(&concepts_to_toon(&concept.children, indent + INDENT_STEP));
    }

    out
}

/// Whole-idea export: metadata object followed by the concept forest.
pub fn idea_to_toon(idea: &Idea) -> String {
    let mut out = object_to_toon(
        "idea",
        &[
            ("name", Some(idea.name.clone())),
            ("rootIdea", Some(idea.root_idea.clone())),
            ("createdAt", Some(iso(idea.created_at))),
            ("updatedAt", Some(iso(idea.updated_at))),
        ],
        0,
    );
    out.push_str(&concepts_to_toon(&idea.concepts, 0));
    out
}
