use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use breakitdown::models::*;
use breakitdown::storage::{IdeaStorage, MemoryStorage};
use breakitdown::{tree, EngineError, Session, StorageError, TreeStore};
use tokio_test::assert_ok;
use uuid::Uuid;

async fn setup() -> (TreeStore, Arc<MemoryStorage>, Session) {
    let storage = Arc::new(MemoryStorage::new());
    let store = TreeStore::new(storage.clone());
    let session = Session::new();
    store
        .create_idea(&session, "Proto", "Build a web app")
        .await
        .expect("Failed to create idea");
    (store, storage, session)
}

async fn add(store: &TreeStore, session: &Session, title: &str, parent: Option<Uuid>) -> Concept {
    store
        .add_concept(session, CreateConceptInput::new(title, ""), parent)
        .await
        .expect("Failed to add concept")
}

/// Fails every save whose 1-based position is listed; otherwise delegates.
struct FlakyStorage {
    inner: MemoryStorage,
    saves: AtomicUsize,
    failing: Vec<usize>,
}

#[async_trait]
impl IdeaStorage for FlakyStorage {
    async fn save(&self, idea: &Idea) -> Result<(), StorageError> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.contains(&n) {
            return Err(StorageError::Backend(format!("disk full on save {}", n)));
        }
        self.inner.save(idea).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Idea>, StorageError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Idea>, StorageError> {
        self.inner.list().await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        self.inner.delete(id).await
    }
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn proto_frontend_ui_kit() {
        let (store, _, session) = setup().await;

        let frontend = add(&store, &session, "Frontend", None).await;
        let ui_kit = add(&store, &session, "UI Kit", Some(frontend.id)).await;

        assert_eq!(store.get_concept_depth(&session, ui_kit.id), Some(1));

        assert!(store.delete_concept(&session, frontend.id).await.unwrap());
        assert!(store.get_all_concepts(&session).is_empty());
    }

    #[tokio::test]
    async fn chain_depth_and_ancestry() {
        let (store, _, session) = setup().await;
        let mut ids = Vec::new();
        let mut parent = None;
        for level in 0..5 {
            let concept = add(&store, &session, &format!("Level {}", level), parent).await;
            parent = Some(concept.id);
            ids.push(concept.id);
        }

        assert_eq!(store.get_concept_depth(&session, ids[4]), Some(4));
        let chain: Vec<Uuid> = store
            .get_parent_chain(&session, ids[3])
            .into_iter()
            .map(|concept| concept.id)
            .collect();
        assert_eq!(chain, ids[..3].to_vec());
        assert_eq!(store.get_concept_depth(&session, Uuid::new_v4()), None);
    }

    #[tokio::test]
    async fn deletion_cascades_to_descendants() {
        let (store, _, session) = setup().await;
        let root = add(&store, &session, "Root", None).await;
        let a = add(&store, &session, "A", Some(root.id)).await;
        add(&store, &session, "A1", Some(a.id)).await;
        add(&store, &session, "B", Some(root.id)).await;
        add(&store, &session, "Other", None).await;
        let before = store.get_all_concepts(&session).len();

        let k = store.find_concept_by_id(&session, a.id).unwrap().descendant_count();
        store.delete_concept(&session, a.id).await.unwrap();

        assert_eq!(store.get_all_concepts(&session).len(), before - (k + 1));
    }
}

mod invariants {
    use super::*;

    #[tokio::test]
    async fn concurrent_adds_all_land_once() {
        let (store, storage, session) = setup().await;
        let session = Arc::new(session);
        let root_id = add(&store, &session, "Root", None).await.id;

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    store
                        .add_concept(&session, CreateConceptInput::new(format!("Child {}", i), ""), Some(root_id))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let idea = session.current().unwrap();
        assert_eq!(idea.concepts[0].children.len(), 10);
        assert!(tree::integrity_issues(&idea).is_empty());

        assert_ok!(store.flush().await);
        let stored = storage.get(idea.id).await.unwrap().unwrap();
        assert_eq!(stored.concept_count(), 11);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn parallel_adds_leave_the_latest_snapshot_stored() {
        let (store, storage, session) = setup().await;
        let session = Arc::new(session);
        let id = session.current_id().unwrap();

        for round in 0..50 {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let store = store.clone();
                    let session = session.clone();
                    tokio::spawn(async move {
                        store
                            .add_concept(&session, CreateConceptInput::new(format!("R{} C{}", round, i), ""), None)
                            .await
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let stored = storage.get(id).await.unwrap().unwrap();
            assert_eq!(
                stored.concept_count(),
                session.current().unwrap().concept_count(),
                "stale snapshot stored after round {}",
                round
            );
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Add { parent: Option<usize> },
    Complete(usize, bool),
    Delete(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => prop::option::of(any::<usize>()).prop_map(|parent| Op::Add { parent }),
        1 => (any::<usize>(), any::<bool>()).prop_map(|(at, done)| Op::Complete(at, done)),
        1 => any::<usize>().prop_map(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tree_stays_sound_across_mixed_operations(ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (store, _, session) = setup().await;
            let mut ids: Vec<Uuid> = Vec::new();

            for (step, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Add { parent } => {
                        let parent = parent.filter(|_| !ids.is_empty()).map(|at| ids[at % ids.len()]);
                        match store
                            .add_concept(&session, CreateConceptInput::new(format!("C{}", step), ""), parent)
                            .await
                        {
                            Ok(concept) => ids.push(concept.id),
                            // The parent went away with an earlier cascade.
                            Err(err) => assert!(err.is_not_found()),
                        }
                    }
                    Op::Complete(at, done) if !ids.is_empty() => {
                        let id = ids[at % ids.len()];
                        store
                            .update_concept(&session, id, UpdateConceptInput::completed(done))
                            .await
                            .unwrap();
                    }
                    Op::Delete(at) if !ids.is_empty() => {
                        let id = ids.remove(at % ids.len());
                        store.delete_concept(&session, id).await.unwrap();
                    }
                    _ => {}
                }

                let idea = session.current().unwrap();
                assert!(tree::integrity_issues(&idea).is_empty(), "broken after step {}", step);
                let live: Vec<Uuid> = tree::flatten(&idea.concepts).iter().map(|c| c.id).collect();
                for id in &live {
                    assert_eq!(
                        store.get_concept_depth(&session, *id),
                        Some(store.get_parent_chain(&session, *id).len())
                    );
                }
            }

            assert_eq!(session.integrity_repairs(), 0);
        });
    }
}

mod persistence {
    use super::*;

    #[tokio::test]
    async fn stored_copy_does_not_follow_later_mutations() {
        let (store, storage, session) = setup().await;
        let concept = add(&store, &session, "Frontend", None).await;
        let id = session.current_id().unwrap();
        let stored_before = storage.get(id).await.unwrap().unwrap();

        session_rename(&store, &session, concept.id, "Changed").await;

        assert_eq!(stored_before.concepts[0].title, "Frontend");
        assert_eq!(storage.get(id).await.unwrap().unwrap().concepts[0].title, "Changed");
    }

    async fn session_rename(store: &TreeStore, session: &Session, id: Uuid, title: &str) {
        store
            .update_concept(
                session,
                id,
                UpdateConceptInput {
                    title: Some(title.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn a_failed_save_is_reported_only_to_its_caller() {
        let storage = Arc::new(FlakyStorage {
            inner: MemoryStorage::new(),
            saves: AtomicUsize::new(0),
            failing: vec![2],
        });
        let store = TreeStore::new(storage.clone());
        let session = Session::new();
        store.create_idea(&session, "Proto", "Build a web app").await.unwrap();

        let err = store
            .add_concept(&session, CreateConceptInput::new("A", ""), None)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Storage("disk full on save 2".to_string()));

        add(&store, &session, "B", None).await;

        let stored = storage
            .get(session.current_id().unwrap())
            .await
            .unwrap()
            .unwrap();
        let titles: Vec<&str> = stored.concepts.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }
}

mod ideas {
    use super::*;

    #[tokio::test]
    async fn create_makes_the_idea_current_and_stores_it() {
        let (_store, storage, session) = setup().await;
        let idea = session.current().unwrap();

        assert_eq!(idea.name, "Proto");
        assert_eq!(idea.root_idea, "Build a web app");
        assert!(idea.concepts.is_empty());
        assert!(idea.token_usage.is_empty());
        assert!(storage.get(idea.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn load_replaces_the_current_idea() {
        let (store, _, session) = setup().await;
        let first = session.current_id().unwrap();
        store.create_idea(&session, "Second", "Another").await.unwrap();
        assert_ne!(session.current_id(), Some(first));

        let loaded = store.load_idea(&session, first).await.unwrap();
        assert_eq!(loaded.name, "Proto");
        assert_eq!(session.current_id(), Some(first));
    }

    #[tokio::test]
    async fn load_of_unknown_idea_fails() {
        let (store, _, session) = setup().await;
        let missing = Uuid::new_v4();
        assert_eq!(
            store.load_idea(&session, missing).await.unwrap_err(),
            EngineError::IdeaNotFound(missing)
        );
        assert!(session.is_loaded());
    }

    #[tokio::test]
    async fn list_summarizes_every_idea() {
        let (store, _, session) = setup().await;
        add(&store, &session, "Frontend", None).await;
        store.create_idea(&session, "Second", "Another").await.unwrap();

        let summaries = store.list_ideas().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "Second");
        assert_eq!(summaries[1].concept_count, 1);
    }

    #[tokio::test]
    async fn delete_clears_the_current_slot() {
        let (store, storage, session) = setup().await;
        let id = session.current_id().unwrap();

        assert!(store.delete_idea(&session, id).await.unwrap());
        assert!(!session.is_loaded());
        assert!(storage.is_empty().await);
        assert!(!store.delete_idea(&session, id).await.unwrap());
    }

    #[tokio::test]
    async fn reset_unloads_without_touching_storage() {
        let (store, storage, session) = setup().await;
        let reset = store.reset_idea(&session).unwrap();

        assert!(!session.is_loaded());
        assert!(storage.get(reset.id).await.unwrap().is_some());
        assert!(store.get_all_concepts(&session).is_empty());
        assert!(!store.is_idea_complete(&session));
    }
}
