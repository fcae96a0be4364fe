//! Structural operations on a concept forest.
//!
//! Every function here works on plain slices of [`Concept`] and is
//! synchronous. Searches are pre-order and return the first structural match,
//! so results are deterministic even if a corrupted tree holds an id twice.

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{Concept, Idea};

/// Pre-order search across the forest.
pub fn find(concepts: &[Concept], id: Uuid) -> Option<&Concept> {
    for concept in concepts {
        if concept.id == id {
            return Some(concept);
        }
        if let Some(found) = find(&concept.children, id) {
            return Some(found);
        }
    }
    None
}

/// Mutable variant of [`find`].
pub fn find_mut(concepts: &mut [Concept], id: Uuid) -> Option<&mut Concept> {
    for concept in concepts.iter_mut() {
        if concept.id == id {
            return Some(concept);
        }
        if let Some(found) = find_mut(&mut concept.children, id) {
            return Some(found);
        }
    }
    None
}

/// Roots are at depth 0; `None` when the id is absent.
pub fn depth_of(concepts: &[Concept], id: Uuid) -> Option<usize> {
    fn walk(concepts: &[Concept], id: Uuid, depth: usize) -> Option<usize> {
        for concept in concepts {
            if concept.id == id {
                return Some(depth);
            }
            if let Some(found) = walk(&concept.children, id, depth + 1) {
                return Some(found);
            }
        }
        None
    }

    walk(concepts, id, 0)
}

/// Ancestors of `id` ordered root-first, excluding the node itself.
///
/// Empty for root nodes and for ids that are not in the forest.
pub fn ancestors<'a>(concepts: &'a [Concept], id: Uuid) -> Vec<&'a Concept> {
    fn walk<'a>(concepts: &'a [Concept], id: Uuid, path: &mut Vec<&'a Concept>) -> bool {
        for concept in concepts {
            if concept.id == id {
                return true;
            }
            path.push(concept);
            if walk(&concept.children, id, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    let mut path = Vec::new();
    if walk(concepts, id, &mut path) {
        path
    } else {
        Vec::new()
    }
}

/// Pre-order flattening of the forest.
pub fn flatten(concepts: &[Concept]) -> Vec<&Concept> {
    fn walk<'a>(concepts: &'a [Concept], out: &mut Vec<&'a Concept>) {
        for concept in concepts {
            out.push(concept);
            walk(&concept.children, out);
        }
    }

    let mut out = Vec::new();
    walk(concepts, &mut out);
    out
}

/// Insert `concept` under `parent_id`, or at the root when `parent_id` is `None`.
///
/// The node's `parent_id` is overwritten to match where it lands. On a missing
/// parent nothing changes and the node is handed back.
pub fn insert(
    concepts: &mut Vec<Concept>,
    parent_id: Option<Uuid>,
    mut concept: Concept,
) -> Result<(), Concept> {
    concept.parent_id = parent_id;
    match parent_id {
        None => {
            concepts.push(concept);
            Ok(())
        }
        Some(parent_id) => match find_mut(concepts, parent_id) {
            Some(parent) => {
                parent.children.push(concept);
                Ok(())
            }
            None => Err(concept),
        },
    }
}

/// Detach the first pre-order match together with its subtree.
pub fn remove(concepts: &mut Vec<Concept>, id: Uuid) -> Option<Concept> {
    if let Some(index) = concepts.iter().position(|concept| concept.id == id) {
        return Some(concepts.remove(index));
    }
    concepts
        .iter_mut()
        .find_map(|concept| remove(&mut concept.children, id))
}

/// Drop root-list entries that carry a `parent_id`.
///
/// Such nodes belong under their parent; whatever copy lives there is kept.
/// Returns the removed nodes so callers can log and count the repair.
pub fn repair_root_list(idea: &mut Idea) -> Vec<Concept> {
    let (misplaced, kept): (Vec<Concept>, Vec<Concept>) = std::mem::take(&mut idea.concepts)
        .into_iter()
        .partition(|concept| concept.parent_id.is_some());
    idea.concepts = kept;
    misplaced
}

/// A violation of the single-owner tree invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// A root-list node that claims a parent.
    RootWithParent { id: Uuid, parent_id: Uuid },
    /// A child whose `parent_id` does not name the node that holds it.
    ParentMismatch {
        id: Uuid,
        holder: Uuid,
        recorded: Option<Uuid>,
    },
    /// The same id reachable through more than one path.
    DuplicateId(Uuid),
}

/// Check every ownership rule and report what is broken. Empty means sound.
pub fn integrity_issues(idea: &Idea) -> Vec<IntegrityIssue> {
    fn walk(
        concepts: &[Concept],
        holder: Option<Uuid>,
        seen: &mut HashSet<Uuid>,
        issues: &mut Vec<IntegrityIssue>,
    ) {
        for concept in concepts {
            if !seen.insert(concept.id) {
                issues.push(IntegrityIssue::DuplicateId(concept.id));
            }
            match (holder, concept.parent_id) {
                (None, Some(parent_id)) => issues.push(IntegrityIssue::RootWithParent {
                    id: concept.id,
                    parent_id,
                }),
                (Some(holder), recorded) if recorded != Some(holder) => {
                    issues.push(IntegrityIssue::ParentMismatch {
                        id: concept.id,
                        holder,
                        recorded,
                    })
                }
                _ => {}
            }
            walk(&concept.children, Some(concept.id), seen, issues);
        }
    }

    let mut seen = HashSet::new();
    let mut issues = Vec::new();
    walk(&idea.concepts, None, &mut seen, &mut issues);
    issues
}
