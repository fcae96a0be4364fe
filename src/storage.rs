//! Storage collaborator contract and an in-memory implementation.
//!
//! Implementations must keep their own deep copies: nothing written may
//! share structure with the live idea the engine keeps mutating.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::Idea;

#[async_trait]
pub trait IdeaStorage: Send + Sync {
    /// Insert or replace `idea`, stamping the stored copy's `updated_at`.
    async fn save(&self, idea: &Idea) -> Result<(), StorageError>;

    async fn get(&self, id: Uuid) -> Result<Option<Idea>, StorageError>;

    /// All stored ideas, most recently updated first.
    async fn list(&self) -> Result<Vec<Idea>, StorageError>;

    /// Returns whether an idea was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StorageError>;
}

/// Keeps ideas in a `RwLock<HashMap>`. Used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    ideas: RwLock<HashMap<Uuid, Idea>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.ideas.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ideas.read().await.is_empty()
    }
}

#[async_trait]
impl IdeaStorage for MemoryStorage {
    async fn save(&self, idea: &Idea) -> Result<(), StorageError> {
        let mut copy = idea.clone();
        copy.updated_at = Utc::now();
        self.ideas.write().await.insert(copy.id, copy);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Idea>, StorageError> {
        Ok(self.ideas.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Idea>, StorageError> {
        let mut ideas: Vec<Idea> = self.ideas.read().await.values().cloned().collect();
        ideas.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(ideas)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.ideas.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Concept, CreateConceptInput};

    #[tokio::test]
    async fn stored_copy_is_independent_of_the_live_idea() {
        let storage = MemoryStorage::new();
        let mut idea = Idea::new("Proto", "Build a web app");
        idea.concepts
            .push(Concept::new(CreateConceptInput::new("Frontend", ""), None));
        storage.save(&idea).await.unwrap();

        idea.concepts[0].title = "Changed".to_string();
        idea.concepts.clear();

        let stored = storage.get(idea.id).await.unwrap().unwrap();
        assert_eq!(stored.concepts.len(), 1);
        assert_eq!(stored.concepts[0].title, "Frontend");
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let storage = MemoryStorage::new();
        let idea = Idea::new("Proto", "Build a web app");
        storage.save(&idea).await.unwrap();

        assert!(storage.delete(idea.id).await.unwrap());
        assert!(!storage.delete(idea.id).await.unwrap());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let storage = MemoryStorage::new();
        let first = Idea::new("First", "a");
        let second = Idea::new("Second", "b");
        storage.save(&first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        storage.save(&second).await.unwrap();

        let names: Vec<String> = storage
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|idea| idea.name)
            .collect();
        assert_eq!(names, vec!["Second", "First"]);
    }
}
