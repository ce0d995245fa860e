// Mnemo Library
// Durable staging, committed storage and ranked recall for memory records

pub mod clock;
pub mod config;
pub mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{MemoryConfig, ScoringWeights};
pub use memory::{
    MemoryError, MemoryErrorKind, MemoryId, MemoryQuery, MemoryRecord, MemoryResult,
    MemoryService,
};
