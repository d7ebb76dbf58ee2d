//! Monoplan-State: execution-state persistence for monoplan
//!
//! This crate owns every read and write of cross-run job state. Concurrent
//! pipeline runs coordinate only through the conditional writes offered by
//! [`StateStore`]; there is no in-process locking.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: conditional writes, TTL expiry, partition queries.
//!
//! ## Key Components
//!
//! - `StateStore`: conditional put/delete contract implemented by every backend
//! - `SurrealStateStore`: SurrealDB backend (memory, SurrealKV or remote)
//! - `MemoryStateStore`: in-memory fake for tests and dry runs
//! - `ExecutionStateStore`: acquire / skip-set / terminal protocol for jobs

pub mod clock;
mod error;
pub mod execution;
pub mod fakes;
mod handle;
mod migrations;
pub mod record;
pub mod storage_traits;
pub mod surreal_store;
pub mod ttl;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{StateError, StorageError};
pub use execution::{
    AcquireOutcome, ExecutionStateStore, SkipSet, TerminalOutcome, TerminalReport, Tracked,
};
pub use fakes::MemoryStateStore;
pub use handle::{AuthScope, CloudConfig, StoreConfig};
pub use migrations::STATE_TABLE;
pub use record::{partition_key, JobStatus, StateKey, StateRecord, TrackedJob};
pub use storage_traits::{DeleteOutcome, PutOutcome, StateStore, StorageResult};
pub use surreal_store::SurrealStateStore;
pub use ttl::{parse_duration, TtlPolicy};

/// Result type for monoplan-state connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
