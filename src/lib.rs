//! Cache-first access to published orbital element sets.
//!
//! The [`app::repository::Repository`] serves element records from a durable
//! local cache, revalidating against the remote source when entries go stale.
//! [`app::scheduler::decision`] tells a host when to arm a background refresh.

pub mod app;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod infra;
pub mod observability;
pub mod parser;

pub use app::repository::{Repository, RepositorySettings};
pub use app::scheduler::{decision as scheduling_decision, RefreshPolicy};
pub use app::staleness::StalenessPolicy;
pub use domain::{ElementRecord, LoadState, Provenance, RepositoryResult, SchedulingDecision};
pub use error::{Result, TleError};
