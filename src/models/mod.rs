//! Domain models for breakitdown.
//!
//! - [`Idea`]: the root container, holding the user's original prompt and a
//!   forest of concepts.
//! - [`Concept`]: one node of the decomposition tree. Children are owned
//!   exclusively; `parent_id` is present iff the node is not a root.
//! - [`TokenUsage`]: append-only cost record of a generation call.
//! - [`BreakdownRequest`] / [`BreakdownResponse`]: the generation
//!   collaborator's input and output.

mod breakdown;
mod concept;
mod idea;
mod usage;

pub use breakdown::*;
pub use concept::*;
pub use idea::*;
pub use usage::*;
