//! breakitdown: grow an idea into a tree of concepts.
//!
//! An [`models::Idea`] holds a forest of [`models::Concept`]s. The
//! [`store::TreeStore`] mutates it and persists every change through a FIFO
//! [`save_queue::SaveQueue`]; the [`breakdown::BreakdownCoordinator`] asks a
//! [`generation::Generator`] for sub-concepts and grafts them in. The loaded
//! idea lives in a caller-owned [`session::Session`].

pub mod breakdown;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod generation;
pub mod models;
pub mod save_queue;
pub mod session;
pub mod storage;
pub mod store;
pub mod toon;
pub mod tree;

pub use breakdown::{BreakdownCoordinator, BreakdownOutcome};
pub use error::{EngineError, StorageError};
pub use session::Session;
pub use store::TreeStore;
