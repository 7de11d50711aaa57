//! # infra_store: Product Store for the Rates Pipeline
//!
//! Persistence behind the [`ProductStore`] seam:
//! - [`PgProductStore`]: Postgres via sqlx, with a transactional upsert and
//!   the comparison procedure called through `to_jsonb`
//! - [`MemoryStore`]: the same semantics held in process memory, used by
//!   tests and dry runs
//!
//! Errors are classified into authorisation, reachability, statement and
//! decoding failures so the pipeline can report which one stopped a run.

#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use memory::{CallCounts, InjectedFailure, MemoryStore};
pub use postgres::{PgProductStore, StoreSettings};
pub use traits::ProductStore;
