//! The error taxonomy for the engine command surface.
//!
//! Structural errors (a malformed call, an unknown tenant, an unrecoverable
//! resource limit) are returned as `Err(EngineError)` from command entry
//! points. Execution-level errors raised while running a production's
//! actions are *not* returned this way — they are collected into the
//! calling command's [`crate::engine::Outputs`] so one bad action does not
//! abort the rest of the agenda. `EngineError` is the vocabulary for both;
//! which path a given variant takes is documented per-variant below.

use rete_fact::FactId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Missing id or type, or a duplicate id within the same `assert`
    /// batch. Returned as `Err`; the whole batch is rejected.
    #[error("invalid fact: {0}")]
    InvalidFact(String),

    /// A command was addressed to a tenant key with no running engine.
    /// Returned as `Err`.
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    /// Usage remained over the configured memory limit after eviction.
    /// Returned as `Err`; the engine's state is left as of the last
    /// successful operation.
    #[error("memory limit exceeded")]
    MemoryLimitExceeded,

    /// `step()` found nothing to fire. Informational, not a failure —
    /// surfaced as `Ok(StepOutcome::AgendaEmpty)`, never as an `Err`, but
    /// kept in this enum so it can also appear in a trace event.
    #[error("agenda is empty")]
    AgendaEmpty,

    /// A `call` action's callback failed or exceeded its deadline.
    /// Attached to outputs; does not halt the remaining actions.
    #[error("callback error in production {production_id}: {message}")]
    CallbackError {
        production_id: String,
        message: String,
    },

    /// An action kind the executor doesn't recognize. Attached to outputs;
    /// does not halt the remaining actions.
    #[error("unknown action kind `{kind}` in production {production_id}")]
    UnknownAction {
        production_id: String,
        kind: String,
    },

    /// An activation referenced a production id absent from the network.
    /// Should be impossible for a network built through [`crate::network::NetworkBuilder`];
    /// attached to outputs rather than treated as a panic-worthy invariant
    /// violation, since it can only happen via a malformed externally-supplied network.
    #[error("missing production: {0}")]
    MissingProduction(String),

    /// A policy tag had no registered implementation; the engine fell back
    /// to the default policy of that kind. Attached to outputs as a warning.
    #[error("unknown {kind} policy tag `{tag}`, falling back to default")]
    UnknownPolicy { kind: &'static str, tag: String },

    /// An action's own code raised an unhandled exception. The activation
    /// is still considered fired for refraction purposes.
    #[error("action exception in production {production_id}: {message}")]
    ActionException {
        production_id: String,
        message: String,
    },
}

impl EngineError {
    pub fn invalid_fact(detail: impl Into<String>) -> Self {
        EngineError::InvalidFact(detail.into())
    }

    pub fn duplicate_id(id: &FactId) -> Self {
        EngineError::InvalidFact(format!("duplicate fact id `{id}`"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
