//! The caller-owned working state: at most one loaded idea.
//!
//! A [`Session`] replaces any notion of a global "current idea". It is handed
//! to every tree store and breakdown call. The lock is only ever held for a
//! synchronous step; nothing awaits while holding it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use uuid::Uuid;

use crate::models::Idea;

#[derive(Debug, Default)]
pub struct Session {
    idea: Mutex<Option<Idea>>,
    integrity_repairs: AtomicUsize,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idea(idea: Idea) -> Self {
        Self {
            idea: Mutex::new(Some(idea)),
            integrity_repairs: AtomicUsize::new(0),
        }
    }

    /// Snapshot of the loaded idea.
    pub fn current(&self) -> Option<Idea> {
        self.idea.lock().expect("session lock poisoned").clone()
    }

    pub fn current_id(&self) -> Option<Uuid> {
        self.read(|idea| idea.id)
    }

    pub fn is_loaded(&self) -> bool {
        self.idea.lock().expect("session lock poisoned").is_some()
    }

    /// How many misplaced root nodes the pre-save integrity check has removed.
    /// Stays at zero under correct usage.
    pub fn integrity_repairs(&self) -> usize {
        self.integrity_repairs.load(Ordering::SeqCst)
    }

    pub(crate) fn record_repairs(&self, count: usize) {
        self.integrity_repairs.fetch_add(count, Ordering::SeqCst);
    }

    /// Replace the loaded idea, returning the previous one.
    pub(crate) fn replace(&self, idea: Option<Idea>) -> Option<Idea> {
        std::mem::replace(&mut *self.idea.lock().expect("session lock poisoned"), idea)
    }

    /// Run `f` against the loaded idea. `None` when nothing is loaded.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Idea) -> R) -> Option<R> {
        self.idea.lock().expect("session lock poisoned").as_ref().map(f)
    }

    /// Mutable variant of [`Session::read`].
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Idea) -> R) -> Option<R> {
        self.idea.lock().expect("session lock poisoned").as_mut().map(f)
    }
}
