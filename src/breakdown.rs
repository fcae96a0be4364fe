//! Breakdown coordinator.
//!
//! Asks the generator for sub-concepts and grafts them under the concept that
//! was broken down. At most one breakdown per concept id runs at a time: a
//! second request for the same id while the first is in flight joins it and
//! gets the same outcome, so its children are only added once.
//!
//! The in-flight future is spawned onto the runtime, so it runs to completion
//! even if every caller stops waiting. Its registry entry is removed when it
//! settles, whatever the outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use uuid::Uuid;

use crate::error::EngineError;
use crate::generation::Generator;
use crate::models::{
    BreakdownContext, BreakdownRequest, BreakdownResponse, Concept, ConceptBrief, Idea, TokenUsage,
};
use crate::session::Session;
use crate::store::TreeStore;
use crate::tree;

type SharedOutcome = Shared<BoxFuture<'static, Result<BreakdownOutcome, EngineError>>>;

/// What a breakdown added to the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownOutcome {
    /// `None` when the results went to the root list.
    pub parent_id: Option<Uuid>,
    pub added: Vec<Concept>,
    pub usage: Option<TokenUsage>,
}

#[derive(Clone)]
pub struct BreakdownCoordinator {
    store: TreeStore,
    generator: Arc<dyn Generator>,
    in_flight: Arc<Mutex<HashMap<Uuid, SharedOutcome>>>,
    settle_grace: Duration,
}

impl BreakdownCoordinator {
    pub fn new(store: TreeStore, generator: Arc<dyn Generator>) -> Self {
        Self {
            store,
            generator,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            settle_grace: Duration::ZERO,
        }
    }

    /// Keep a settled breakdown registered for `grace` so rapid repeat calls
    /// still join it. Callers are answered as soon as it settles.
    pub fn with_settle_grace(mut self, grace: Duration) -> Self {
        self.settle_grace = grace;
        self
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn is_in_flight(&self, concept_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .expect("breakdown registry lock poisoned")
            .contains_key(&concept_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .expect("breakdown registry lock poisoned")
            .len()
    }

    /// Break down an existing concept, adding the results as its children.
    pub async fn break_down_concept(
        &self,
        session: &Arc<Session>,
        concept_id: Uuid,
    ) -> Result<BreakdownOutcome, EngineError> {
        let outcome = {
            let mut in_flight = self
                .in_flight
                .lock()
                .expect("breakdown registry lock poisoned");

            if let Some(existing) = in_flight.get(&concept_id) {
                tracing::debug!(concept_id = %concept_id, "Joining breakdown already in flight");
                existing.clone()
            } else {
                let this = self.clone();
                let session = session.clone();
                let outcome = async move {
                    let result = this.run_concept_breakdown(&session, concept_id).await;
                    this.settle(concept_id);
                    result
                }
                .boxed()
                .shared();

                in_flight.insert(concept_id, outcome.clone());
                tokio::spawn(outcome.clone());
                outcome
            }
        };

        outcome.await
    }

    /// Break down a free-text prompt, adding the results at the root.
    ///
    /// Not deduplicated; each call produces its own set of root concepts.
    pub async fn break_down_idea(
        &self,
        session: &Arc<Session>,
        prompt: &str,
    ) -> Result<BreakdownOutcome, EngineError> {
        let (idea_id, request) = session
            .read(|idea| (idea.id, idea_request(idea, prompt)))
            .ok_or(EngineError::NoCurrentIdea)?;

        let response = self.generate(&request).await?;
        self.apply(session, idea_id, None, response).await
    }

    async fn run_concept_breakdown(
        &self,
        session: &Session,
        concept_id: Uuid,
    ) -> Result<BreakdownOutcome, EngineError> {
        let (idea_id, request) = session
            .read(|idea| concept_request(idea, concept_id).map(|request| (idea.id, request)))
            .ok_or(EngineError::NoCurrentIdea)?
            .ok_or(EngineError::ConceptNotFound(concept_id))?;

        tracing::info!(
            concept_id = %concept_id,
            title = %request.concept.title,
            "Breaking down concept"
        );
        let response = self.generate(&request).await?;
        self.apply(session, idea_id, Some(concept_id), response).await
    }

    async fn generate(&self, request: &BreakdownRequest) -> Result<BreakdownResponse, EngineError> {
        let response = self.generator.break_down(request).await.map_err(|err| {
            tracing::error!(title = %request.concept.title, "Breakdown failed: {}", err);
            EngineError::from(err)
        })?;

        if response.concepts.is_empty() {
            return Err(EngineError::Validation(
                "No valid concepts generated".to_string(),
            ));
        }
        Ok(response)
    }

    /// Record usage and insert each proposed concept as its own step.
    ///
    /// The parent is re-resolved by id for every insertion; if it or the idea
    /// went away meanwhile the remaining concepts are not added.
    async fn apply(
        &self,
        session: &Session,
        idea_id: Uuid,
        parent_id: Option<Uuid>,
        response: BreakdownResponse,
    ) -> Result<BreakdownOutcome, EngineError> {
        if let Some(usage) = &response.usage {
            if !self.store.record_usage(session, idea_id, usage.clone()) {
                return Err(EngineError::IdeaNotFound(idea_id));
            }
        }

        let mut added = Vec::with_capacity(response.concepts.len());
        for brief in response.concepts {
            let concept = self
                .store
                .insert_concept(session, Some(idea_id), brief.into(), parent_id)
                .await?;
            added.push(concept);
        }

        tracing::info!(parent_id = ?parent_id, added = added.len(), "Breakdown applied");
        Ok(BreakdownOutcome {
            parent_id,
            added,
            usage: response.usage,
        })
    }

    fn settle(&self, concept_id: Uuid) {
        if self.settle_grace.is_zero() {
            self.in_flight
                .lock()
                .expect("breakdown registry lock poisoned")
                .remove(&concept_id);
            return;
        }

        let in_flight = self.in_flight.clone();
        let grace = self.settle_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            in_flight
                .lock()
                .expect("breakdown registry lock poisoned")
                .remove(&concept_id);
        });
    }
}

/// Request for breaking down `concept_id` in `idea`, or `None` if it is absent.
pub fn concept_request(idea: &Idea, concept_id: Uuid) -> Option<BreakdownRequest> {
    let concept = tree::find(&idea.concepts, concept_id)?;
    let parent_chain: Vec<ConceptBrief> = tree::ancestors(&idea.concepts, concept_id)
        .into_iter()
        .map(Concept::brief)
        .collect();

    Some(BreakdownRequest {
        concept: concept.brief(),
        context: Some(BreakdownContext {
            idea_name: Some(idea.name.clone()),
            root_idea: Some(idea.root_idea.clone()),
            depth: tree::depth_of(&idea.concepts, concept_id),
            parent_chain,
        }),
    })
}

/// Request treating a free-text prompt as a depth-0 concept.
pub fn idea_request(idea: &Idea, prompt: &str) -> BreakdownRequest {
    BreakdownRequest {
        concept: ConceptBrief::new(prompt, prompt),
        context: Some(BreakdownContext {
            idea_name: Some(idea.name.clone()),
            root_idea: Some(idea.root_idea.clone()),
            parent_chain: Vec::new(),
            depth: Some(0),
        }),
    }
}
