use serde::{Deserialize, Serialize};
use std::future::Future;

/// Effect classification for operations.
/// Ordered by increasing severity of side effects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// No side effects. Safe to retry, reorder, cache.
    Pure,
    /// Reads external state. Idempotent but results may differ.
    Observe,
    /// Changes external state. Can be undone via compensation.
    Mutate,
    /// Cannot be undone. Commitment point.
    Irreversible,
}

impl Effect {
    /// Derive recovery strategy from effect type.
    pub fn recovery(&self) -> Recovery {
        match self {
            Effect::Pure | Effect::Observe => Recovery::Retry,
            Effect::Mutate => Recovery::CheckAndRetry,
            Effect::Irreversible => Recovery::ManualReview,
        }
    }

    /// Can a failed activation safely be re-fired past this effect?
    pub fn backtrackable(&self) -> bool {
        matches!(self, Effect::Pure | Effect::Observe | Effect::Mutate)
    }

    /// Cost weight, for callers that want to bias conflict resolution
    /// toward activations with fewer severe effects.
    pub fn cost_weight(&self) -> u32 {
        match self {
            Effect::Pure => 1,
            Effect::Observe => 2,
            Effect::Mutate => 10,
            Effect::Irreversible => 100,
        }
    }
}

/// Recovery strategy after failure, derived from Effect type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recovery {
    /// Safe to re-execute.
    Retry,
    /// Must verify external state before retrying.
    CheckAndRetry,
    /// Requires human review.
    ManualReview,
}

/// Any operation that has a classified effect.
pub trait Effectful {
    fn effect(&self) -> Effect;
}

/// An operation that can be undone.
/// Only meaningful for `Effect::Mutate` — Pure/Observe don't need it,
/// Irreversible can't do it.
pub trait Compensable: Effectful {
    /// State captured before execution, needed to undo later.
    type Snapshot: Clone + Send + Sync;
    /// Error type.
    type Error: std::error::Error + Send + Sync;

    /// Capture state before execution.
    fn snapshot(&self) -> impl Future<Output = Result<Self::Snapshot, Self::Error>> + Send;

    /// Undo the effect using captured state.
    fn compensate(
        &self,
        snapshot: Self::Snapshot,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Metadata for a named action schema.
/// Wraps any action with its effect classification and a human-readable name.
#[derive(Clone, Debug)]
pub struct ActionMeta<A> {
    pub action: A,
    pub effect: Effect,
    pub name: String,
    pub description: String,
}
