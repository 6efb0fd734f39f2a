//! Durable order and scene state.
//!
//! Orders hold scenes; each scene walks the [`SceneStatus`] lifecycle and an
//! order completes once all of its scenes are finished. The store enforces
//! the transition table in SQL so concurrent writers cannot skip edges.

mod error;
mod sqlite_store;
mod store;
mod types;

pub use error::StatusError;
pub use sqlite_store::SqliteStatusStore;
pub use store::StatusStore;
pub use types::*;
