//! Core types and error definitions for the Echelon dispatch engine.
//!
//! This crate provides the foundational types shared across all Echelon
//! crates: the error taxonomy, the task model, hierarchy levels, and engine
//! configuration. It deliberately carries no async machinery.
//!
//! # Main types
//!
//! - [`EchelonError`] — Unified error enum for all engine subsystems.
//! - [`EchelonResult`] — Convenience alias for `Result<T, EchelonError>`.
//! - [`Task`] — A submitted unit of work.
//! - [`Complexity`] — Declared task complexity, drives routing.
//! - [`TierLevel`] — Hierarchy rank of an execution tier.
//! - [`Strategy`] — The dispatch algorithm chosen per task.
//! - [`OrchestratorConfig`] — Tunable engine parameters.

/// Engine configuration.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Tier hierarchy levels.
pub mod level;
/// Task model and lifecycle states.
pub mod task;

pub use config::OrchestratorConfig;
pub use error::{EchelonError, EchelonResult};
pub use level::{TierLevel, CASCADE_ORDER};
pub use task::{
    Complexity, Strategy, Task, TaskState, CTX_PREVIOUS_RESULT, REQ_CONSENSUS, REQ_SPECIALIZED,
};
