//! The caching engine (spec.md §4.0, §4.6–§4.10): binds the lower crates
//! (`buildcache-scan`'s fingerprinting, `buildcache-store`'s blob storage)
//! into the lookup/restore/save protocol, the per-step execution decision,
//! and post-build reconciliation.
//!
//! `CacheSession` is the only entry point; there is no process-wide mutable
//! state anywhere in this crate (spec.md §9's "no container-scope session
//! singleton" redesign flag).

pub mod execution;
pub mod reconciler;
pub mod repository;
pub mod reporter;
pub mod restore_decider;
pub mod session;

pub use execution::{ExecutionController, ModuleLifecycle, ModuleState, StepDecision};
pub use reconciler::Reconciler;
pub use repository::{CacheRepository, RestoreOutcome, SaveOutcome};
pub use reporter::Reporter;
pub use restore_decider::{RestoreDecider, RestoreDecision};
pub use session::{CacheSession, InitOutcome};
