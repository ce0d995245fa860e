//! Memory module
//!
//! Purpose:
//! - Stage, commit and recall short textual memory records.
//! - Keep the committed store authoritative and the index a rebuildable cache.
//!
//! Structure:
//! - types.rs: ids, records, queries and scored results
//! - error.rs: MemoryError and its coarse kinds
//! - persist.rs: atomic snapshot writes and JSONL journal helpers
//! - stage.rs: durable staging area (snapshot + patch journal)
//! - store.rs: durable committed store (snapshot + record journal)
//! - index.rs: keyword index, hashed semantic vectors and ranking
//! - facade.rs: MemoryService, the public entry point
//!
//! Testing strategy:
//! - Unit tests colocated in each file for the specific component
//! - Integration tests placed under /tests for end-to-end flows

pub mod error;
pub mod facade;
pub mod index;
pub(crate) mod persist;
pub mod stage;
pub mod store;
pub mod types;

pub use error::{MemoryError, MemoryErrorKind};
pub use facade::MemoryService;
pub use index::{MemoryIndex, SEMANTIC_DIMENSIONS};
pub use stage::{StagePatch, StagingArea, StagingState};
pub use store::{CommittedState, CommittedStore};
pub use types::{MemoryId, MemoryQuery, MemoryRecord, MemoryResult};
