//! Idea export/import and terminal rendering.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Concept, Idea};
use crate::toon;

const COMPLETED: char = '●';
const OPEN: char = '○';

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid idea document: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
    Yaml,
    Toon,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toon => "toon",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toon => "toon",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "toon" => Ok(Self::Toon),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

pub fn export(idea: &Idea, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Markdown => Ok(to_markdown(idea)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(idea)?),
        ExportFormat::Yaml => Ok(serde_yaml::to_string(idea)?),
        ExportFormat::Toon => Ok(toon::idea_to_toon(idea)),
    }
}

/// Markdown outline: a checklist nested two spaces per level.
///
/// Titles, descriptions and the idea name are escaped with [`escape_markdown`]
/// so every concept stays on its own line and the outline reads back exactly.
pub fn to_markdown(idea: &Idea) -> String {
    fn walk(out: &mut String, concepts: &[Concept], level: usize) {
        for concept in concepts {
            let mark = if concept.completed { 'x' } else { ' ' };
            out.push_str(&"  ".repeat(level));
            out.push_str(&format!("- [{}] **{}**", mark, escape_markdown(&concept.title)));
            if !concept.description.is_empty() {
                out.push_str(": ");
                out.push_str(&escape_markdown(&concept.description));
            }
            out.push('\n');
            walk(out, &concept.children, level + 1);
        }
    }

    let mut out = format!("# {}\n\n", escape_markdown(&idea.name));
    if !idea.root_idea.is_empty() {
        out.push_str(&format!("> {}\n\n", idea.root_idea.replace('\n', "\n> ")));
    }
    walk(&mut out, &idea.concepts, 0);
    out
}

/// Backslash-escape the characters that carry outline structure and write
/// line breaks as `<br>`.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '*' | '[' | ']' | '<' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("<br>"),
            _ => out.push(ch),
        }
    }
    out
}

/// Read an exported JSON document back.
///
/// A missing id gets a fresh one and a missing `createdAt` is set to now;
/// `updatedAt` is always refreshed.
pub fn import_json(json: &str) -> Result<Idea, ExportError> {
    let mut value: Value = serde_json::from_str(json)?;
    let Some(object) = value.as_object_mut() else {
        return Err(ExportError::Invalid("expected a JSON object".to_string()));
    };

    let now = Utc::now().timestamp_millis();
    let has_id = object
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        object.insert("id".to_string(), Value::from(Uuid::new_v4().to_string()));
    }
    if object.get("createdAt").map_or(true, Value::is_null) {
        object.insert("createdAt".to_string(), Value::from(now));
    }
    object.insert("updatedAt".to_string(), Value::from(now));

    Ok(serde_json::from_value(value)?)
}

/// Render an idea as an ASCII tree with completion markers.
///
/// ```text
/// Proto
/// ├── ● Frontend [1a2b3c4d]
/// │   └── ○ UI Kit [5e6f7a8b]
/// └── ○ Backend [9c0d1e2f]
/// ```
pub fn render_tree(idea: &Idea) -> String {
    let mut output = format!("{}\n", idea.name);
    for (i, concept) in idea.concepts.iter().enumerate() {
        let is_last = i == idea.concepts.len() - 1;
        render_node(&mut output, concept, "", is_last);
    }
    output
}

fn render_node(output: &mut String, concept: &Concept, prefix: &str, is_last: bool) {
    let branch = if is_last { "└── " } else { "├── " };
    let symbol = if concept.completed { COMPLETED } else { OPEN };
    output.push_str(prefix);
    output.push_str(branch);
    output.push(symbol);
    output.push(' ');
    output.push_str(&concept.title);
    output.push_str(&format!(" [{}]", short_id(concept.id)));
    output.push('\n');

    let continuation = if is_last { "    " } else { "│   " };
    let child_prefix = format!("{}{}", prefix, continuation);
    for (i, child) in concept.children.iter().enumerate() {
        let child_is_last = i == concept.children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last);
    }
}

/// First eight hex digits of an id, enough to pick a concept on the command line.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateConceptInput;
    use crate::tree;

    fn sample() -> Idea {
        let mut idea = Idea::new("Proto", "Build a web app");
        let mut frontend = Concept::new(CreateConceptInput::new("Frontend", "Client side"), None);
        frontend.completed = true;
        let frontend_id = frontend.id;
        tree::insert(&mut idea.concepts, None, frontend).unwrap();
        tree::insert(
            &mut idea.concepts,
            Some(frontend_id),
            Concept::new(CreateConceptInput::new("UI Kit", ""), None),
        )
        .unwrap();
        tree::insert(
            &mut idea.concepts,
            None,
            Concept::new(CreateConceptInput::new("Backend", "APIs"), None),
        )
        .unwrap();
        idea
    }

    #[test]
    fn markdown_outline() {
        let out = to_markdown(&sample());
        assert_eq!(
            out,
            "# Proto\n\n> Build a web app\n\n\
             - [x] **Frontend**: Client side\n  - [ ] **UI Kit**\n- [ ] **Backend**: APIs\n"
        );
    }

    #[test]
    fn markdown_escapes_structure_characters() {
        assert_eq!(escape_markdown("plain text"), "plain text");
        assert_eq!(escape_markdown("B\n- [x] **Fake**"), "B<br>- \\[x\\] \\*\\*Fake\\*\\*");
        assert_eq!(escape_markdown("a\\b <br>"), "a\\\\b \\<br>");
    }

    #[test]
    fn tree_rendering_uses_branches() {
        let idea = sample();
        let out = render_tree(&idea);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "Proto");
        assert!(lines[1].starts_with("├── ● Frontend ["));
        assert!(lines[2].starts_with("│   └── ○ UI Kit ["));
        assert!(lines[3].starts_with("└── ○ Backend ["));
    }

    #[test]
    fn format_names_parse() {
        assert_eq!("md".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!("YAML".parse::<ExportFormat>(), Ok(ExportFormat::Yaml));
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn import_fills_missing_id_and_timestamps() {
        let idea = import_json(r#"{"name": "Imported Idea", "rootIdea": "Imported Idea", "concepts": []}"#)
            .unwrap();
        assert_eq!(idea.name, "Imported Idea");
        assert!(!idea.id.is_nil());
    }

    #[test]
    fn import_keeps_an_existing_id() {
        let original = sample();
        let json = export(&original, ExportFormat::Json).unwrap();
        let imported = import_json(&json).unwrap();

        assert_eq!(imported.id, original.id);
        assert_eq!(imported.concept_count(), 3);
        assert_eq!(imported.concepts[0].children[0].title, "UI Kit");
        assert_eq!(
            imported.concepts[0].children[0].parent_id,
            Some(original.concepts[0].id)
        );
    }

    #[test]
    fn import_rejects_non_objects() {
        assert!(matches!(import_json("[]"), Err(ExportError::Invalid(_))));
    }
}
