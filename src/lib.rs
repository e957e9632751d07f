//! Review engine for missed quiz items: mastery tracking, priority
//! ranking, spaced-repetition scheduling, tiered read caching and
//! bounded-concurrency batch sync against a remote store.

pub mod cache;
pub mod config;
pub mod engine;
pub mod logging;
pub mod mastery;
pub mod model;
pub mod ranking;
pub mod remote;
pub mod schedule;
pub mod sync;

pub use cache::{CacheEntry, CacheStore, JsonFileStore, MemoryStore, TieredCache};
pub use config::EngineConfig;
pub use engine::ReviewEngine;
pub use model::{MasteryState, ReviewItem, ReviewOutcome};
pub use ranking::RankWeights;
pub use remote::{MemoryRemote, RemoteError, RemoteStore};
pub use sync::{
    BatchJob, BatchOutcome, BatchSyncCoordinator, Mutation, MutationFailure, MutationOp,
    MutationStatus,
};
