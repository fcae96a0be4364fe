//! Tree store: every mutation of the loaded idea goes through here.
//!
//! Mutations run as one synchronous step under the session lock, then enqueue
//! a save of the resulting snapshot and wait for it. Reads return owned
//! snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Concept, CreateConceptInput, Idea, IdeaSummary, TokenUsage, UpdateConceptInput};
use crate::save_queue::{SaveQueue, SaveTicket};
use crate::session::Session;
use crate::storage::IdeaStorage;
use crate::tree;

#[derive(Clone)]
pub struct TreeStore {
    storage: Arc<dyn IdeaStorage>,
    saves: SaveQueue,
}

impl TreeStore {
    /// Must be called from within a Tokio runtime; starts the save worker.
    pub fn new(storage: Arc<dyn IdeaStorage>) -> Self {
        Self {
            storage,
            saves: SaveQueue::new(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn IdeaStorage> {
        &self.storage
    }

    /// Wait until every save enqueued so far has settled.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.saves.flush().await
    }

    // ============================================================
    // Idea operations
    // ============================================================

    /// Start a new idea, make it current and persist it.
    pub async fn create_idea(
        &self,
        session: &Session,
        name: &str,
        root_idea: &str,
    ) -> Result<Idea, EngineError> {
        let idea = Idea::new(name.trim(), root_idea.trim());
        tracing::debug!(idea_id = %idea.id, name = %idea.name, "Created idea");
        session.replace(Some(idea.clone()));
        self.save_current_idea(session).await?;
        Ok(idea)
    }

    /// Make a stored idea current.
    pub async fn load_idea(&self, session: &Session, id: Uuid) -> Result<Idea, EngineError> {
        let idea = self
            .storage
            .get(id)
            .await?
            .ok_or(EngineError::IdeaNotFound(id))?;
        session.replace(Some(idea.clone()));
        tracing::debug!(idea_id = %id, concepts = idea.concept_count(), "Loaded idea");
        Ok(idea)
    }

    /// Stored ideas, most recently updated first.
    pub async fn list_ideas(&self) -> Result<Vec<IdeaSummary>, EngineError> {
        let ideas = self.storage.list().await?;
        Ok(ideas.iter().map(IdeaSummary::from).collect())
    }

    /// Remove a stored idea, unloading it first if it is current.
    ///
    /// Runs through the save queue so a pending save cannot bring it back.
    pub async fn delete_idea(&self, session: &Session, id: Uuid) -> Result<bool, EngineError> {
        if session.current_id() == Some(id) {
            session.replace(None);
        }

        let removed = Arc::new(AtomicBool::new(false));
        let flag = removed.clone();
        let storage = self.storage.clone();
        self.saves
            .enqueue(async move {
                flag.store(storage.delete(id).await?, Ordering::SeqCst);
                Ok(())
            })
            .wait()
            .await?;

        let removed = removed.load(Ordering::SeqCst);
        tracing::debug!(idea_id = %id, removed, "Deleted idea");
        Ok(removed)
    }

    /// Unload the current idea without touching storage.
    pub fn reset_idea(&self, session: &Session) -> Option<Idea> {
        session.replace(None)
    }

    pub async fn save_current_idea(&self, session: &Session) -> Result<(), EngineError> {
        self.enqueue_current_save(session)
            .ok_or(EngineError::NoCurrentIdea)?
            .wait()
            .await
    }

    /// Repair the root list, snapshot the idea and queue the write.
    ///
    /// The snapshot is taken and queued under the session lock, so queue
    /// order matches snapshot order. `None` when nothing is loaded.
    pub(crate) fn enqueue_current_save(&self, session: &Session) -> Option<SaveTicket> {
        let (repairs, ticket) = session.write(|idea| {
            let misplaced = tree::repair_root_list(idea);
            for concept in &misplaced {
                tracing::warn!(
                    concept_id = %concept.id,
                    title = %concept.title,
                    parent_id = ?concept.parent_id,
                    "Removed concept with a parent from the root list"
                );
            }
            let snapshot = idea.clone();
            let storage = self.storage.clone();
            let ticket = self.saves.enqueue(async move { storage.save(&snapshot).await });
            (misplaced.len(), ticket)
        })?;

        if repairs > 0 {
            session.record_repairs(repairs);
        }
        Some(ticket)
    }

    // ============================================================
    // Concept mutations
    // ============================================================

    /// Add a concept at the root (`parent_id: None`) or under an existing node.
    pub async fn add_concept(
        &self,
        session: &Session,
        input: CreateConceptInput,
        parent_id: Option<Uuid>,
    ) -> Result<Concept, EngineError> {
        self.insert_concept(session, None, input, parent_id).await
    }

    /// Insert into the current idea, optionally only if it is still `expected_idea`.
    ///
    /// Long-running operations use the guard so results never land in an idea
    /// loaded while they were suspended.
    pub(crate) async fn insert_concept(
        &self,
        session: &Session,
        expected_idea: Option<Uuid>,
        input: CreateConceptInput,
        parent_id: Option<Uuid>,
    ) -> Result<Concept, EngineError> {
        let concept = session
            .write(|idea| {
                if let Some(expected) = expected_idea {
                    if idea.id != expected {
                        return Err(EngineError::IdeaNotFound(expected));
                    }
                }
                let concept = Concept::new(input, parent_id);
                let snapshot = concept.clone();
                match tree::insert(&mut idea.concepts, parent_id, concept) {
                    Ok(()) => Ok(snapshot),
                    Err(_) => Err(EngineError::ConceptNotFound(
                        parent_id.unwrap_or_default(),
                    )),
                }
            })
            .ok_or(match expected_idea {
                Some(expected) => EngineError::IdeaNotFound(expected),
                None => EngineError::NoCurrentIdea,
            })??;

        tracing::debug!(
            concept_id = %concept.id,
            parent_id = ?parent_id,
            title = %concept.title,
            "Added concept"
        );
        self.save_current_idea(session).await?;
        Ok(concept)
    }

    /// Apply the present fields of `input`. `Ok(None)` when the id is absent.
    pub async fn update_concept(
        &self,
        session: &Session,
        id: Uuid,
        input: UpdateConceptInput,
    ) -> Result<Option<Concept>, EngineError> {
        let updated = session
            .write(|idea| {
                let concept = tree::find_mut(&mut idea.concepts, id)?;
                if let Some(title) = input.title {
                    concept.title = title;
                }
                if let Some(description) = input.description {
                    concept.description = description;
                }
                if let Some(completed) = input.completed {
                    concept.completed = completed;
                }
                concept.updated_at = Utc::now();
                Some(concept.clone())
            })
            .ok_or(EngineError::NoCurrentIdea)?;

        let Some(concept) = updated else {
            tracing::debug!(concept_id = %id, "Update ignored: concept not found");
            return Ok(None);
        };

        tracing::debug!(concept_id = %id, "Updated concept");
        self.save_current_idea(session).await?;
        Ok(Some(concept))
    }

    /// Remove a concept with its whole subtree. Returns whether anything was removed.
    pub async fn delete_concept(&self, session: &Session, id: Uuid) -> Result<bool, EngineError> {
        let removed = session
            .write(|idea| tree::remove(&mut idea.concepts, id))
            .ok_or(EngineError::NoCurrentIdea)?;

        match &removed {
            Some(concept) => tracing::debug!(
                concept_id = %id,
                descendants = concept.descendant_count(),
                "Deleted concept"
            ),
            None => tracing::debug!(concept_id = %id, "Delete ignored: concept not found"),
        }

        self.save_current_idea(session).await?;
        Ok(removed.is_some())
    }

    /// Append a usage record to the current idea if it is still `idea_id`.
    pub(crate) fn record_usage(&self, session: &Session, idea_id: Uuid, usage: TokenUsage) -> bool {
        session
            .write(|idea| {
                if idea.id != idea_id {
                    return false;
                }
                idea.token_usage.push(usage);
                true
            })
            .unwrap_or(false)
    }

    // ============================================================
    // Queries
    // ============================================================

    pub fn find_concept_by_id(&self, session: &Session, id: Uuid) -> Option<Concept> {
        session
            .read(|idea| tree::find(&idea.concepts, id).cloned())
            .flatten()
    }

    /// Roots are at depth 0. `None` when the concept is absent.
    pub fn get_concept_depth(&self, session: &Session, id: Uuid) -> Option<usize> {
        session
            .read(|idea| tree::depth_of(&idea.concepts, id))
            .flatten()
    }

    /// Ancestors root-first, excluding the concept itself.
    pub fn get_parent_chain(&self, session: &Session, id: Uuid) -> Vec<Concept> {
        session
            .read(|idea| {
                tree::ancestors(&idea.concepts, id)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every concept in pre-order.
    pub fn get_all_concepts(&self, session: &Session) -> Vec<Concept> {
        session
            .read(|idea| tree::flatten(&idea.concepts).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True when every concept is completed. An empty tree is never complete.
    pub fn is_idea_complete(&self, session: &Session) -> bool {
        session
            .read(|idea| {
                let all = tree::flatten(&idea.concepts);
                !all.is_empty() && all.iter().all(|concept| concept.completed)
            })
            .unwrap_or(false)
    }

    pub fn get_incomplete_concepts(&self, session: &Session) -> Vec<Concept> {
        session
            .read(|idea| {
                tree::flatten(&idea.concepts)
                    .into_iter()
                    .filter(|concept| !concept.completed)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    async fn setup() -> (TreeStore, Arc<MemoryStorage>, Session) {
        let storage = Arc::new(MemoryStorage::new());
        let store = TreeStore::new(storage.clone());
        let session = Session::new();
        store
            .create_idea(&session, "Proto", "Build a web app")
            .await
            .unwrap();
        (store, storage, session)
    }

    #[tokio::test]
    async fn mutations_without_an_idea_fail() {
        let store = TreeStore::new(Arc::new(MemoryStorage::new()));
        let session = Session::new();

        let err = store
            .add_concept(&session, CreateConceptInput::new("A", ""), None)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::NoCurrentIdea);
        assert_eq!(
            store.save_current_idea(&session).await.unwrap_err(),
            EngineError::NoCurrentIdea
        );
    }

    #[tokio::test]
    async fn add_under_missing_parent_changes_nothing() {
        let (store, _, session) = setup().await;
        let missing = Uuid::new_v4();

        let err = store
            .add_concept(&session, CreateConceptInput::new("A", ""), Some(missing))
            .await
            .unwrap_err();

        assert_eq!(err, EngineError::ConceptNotFound(missing));
        assert!(store.get_all_concepts(&session).is_empty());
    }

    #[tokio::test]
    async fn update_missing_concept_is_a_no_op() {
        let (store, _, session) = setup().await;
        let result = store
            .update_concept(&session, Uuid::new_v4(), UpdateConceptInput::completed(true))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let (store, _, session) = setup().await;
        let concept = store
            .add_concept(&session, CreateConceptInput::new("A", "first"), None)
            .await
            .unwrap();

        let updated = store
            .update_concept(&session, concept.id, UpdateConceptInput::completed(true))
            .await
            .unwrap()
            .unwrap();

        assert!(updated.completed);
        assert_eq!(updated.title, "A");
        assert_eq!(updated.description, "first");
        assert!(updated.updated_at >= concept.updated_at);
    }

    #[tokio::test]
    async fn saves_persist_the_latest_tree() {
        let (store, storage, session) = setup().await;
        let parent = store
            .add_concept(&session, CreateConceptInput::new("Frontend", ""), None)
            .await
            .unwrap();
        store
            .add_concept(&session, CreateConceptInput::new("UI Kit", ""), Some(parent.id))
            .await
            .unwrap();

        let id = session.current_id().unwrap();
        let stored = storage.get(id).await.unwrap().unwrap();
        assert_eq!(stored.concept_count(), 2);
        assert_eq!(stored.concepts[0].children[0].title, "UI Kit");
    }

    #[tokio::test]
    async fn completion_requires_every_concept() {
        let (store, _, session) = setup().await;
        assert!(!store.is_idea_complete(&session));

        let a = store
            .add_concept(&session, CreateConceptInput::new("A", ""), None)
            .await
            .unwrap();
        let b = store
            .add_concept(&session, CreateConceptInput::new("B", ""), Some(a.id))
            .await
            .unwrap();

        store
            .update_concept(&session, a.id, UpdateConceptInput::completed(true))
            .await
            .unwrap();
        assert!(!store.is_idea_complete(&session));
        assert_eq!(store.get_incomplete_concepts(&session)[0].id, b.id);

        store
            .update_concept(&session, b.id, UpdateConceptInput::completed(true))
            .await
            .unwrap();
        assert!(store.is_idea_complete(&session));
    }

    #[tokio::test]
    async fn misplaced_root_nodes_are_repaired_before_saving() {
        let (store, storage, session) = setup().await;
        let parent = store
            .add_concept(&session, CreateConceptInput::new("Parent", ""), None)
            .await
            .unwrap();

        // Corrupt the root list by hand.
        let stray = Concept::new(CreateConceptInput::new("Stray", ""), Some(parent.id));
        session.write(|idea| idea.concepts.push(stray));

        store.save_current_idea(&session).await.unwrap();

        assert_eq!(session.integrity_repairs(), 1);
        let stored = storage
            .get(session.current_id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.concepts.len(), 1);
        assert!(tree::integrity_issues(&stored).is_empty());
    }

    #[tokio::test]
    async fn usage_is_only_recorded_on_the_matching_idea() {
        let (store, _, session) = setup().await;
        let usage = TokenUsage::from_counts(
            crate::models::TokenCounts::new(10, 5),
            crate::models::UsageOperation::Breakdown,
            "gpt-oss:20b",
            None,
        );

        assert!(!store.record_usage(&session, Uuid::new_v4(), usage.clone()));
        let id = session.current_id().unwrap();
        assert!(store.record_usage(&session, id, usage));
        assert_eq!(session.current().unwrap().token_usage.len(), 1);
    }
}
