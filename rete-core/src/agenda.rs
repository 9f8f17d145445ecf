//! The agenda: a priority-ordered multiset of activations awaiting
//! selection, under a pluggable, total-order comparator.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::refraction::RefractionKey;
use crate::registry::Registries;
use crate::token::Token;
use rete_fact::FactId;

/// A production whose left-hand side is fully satisfied under `token`,
/// awaiting agenda selection.
#[derive(Debug, Clone)]
pub struct Activation {
    pub production_id: String,
    pub token: Token,
    pub salience: i64,
    /// Defaults to the number of facts in the token; used as a tie-breaker.
    pub specificity: usize,
    pub inserted_at: DateTime<Utc>,
}

impl Activation {
    pub fn new(production_id: impl Into<String>, token: Token, salience: i64, inserted_at: DateTime<Utc>) -> Self {
        let specificity = token.specificity();
        Activation {
            production_id: production_id.into(),
            token,
            salience,
            specificity,
            inserted_at,
        }
    }

    pub fn refraction_key(&self) -> RefractionKey {
        RefractionKey::new(self.production_id.clone(), self.token.signature().clone())
    }

    pub fn contains_fact(&self, id: &FactId) -> bool {
        self.token.contains(id)
    }
}

/// A total-order comparator over activations. `compare(a, b) == Greater`
/// means `a` fires before `b`. Custom policies must define a total order
/// so agenda behavior stays deterministic.
pub trait AgendaPolicy: std::fmt::Debug + Send + Sync {
    fn compare(&self, a: &Activation, b: &Activation) -> Ordering;
}

#[derive(Debug, Default)]
struct DefaultPolicy;

impl AgendaPolicy for DefaultPolicy {
    fn compare(&self, a: &Activation, b: &Activation) -> Ordering {
        a.salience
            .cmp(&b.salience)
            .then_with(|| a.specificity.cmp(&b.specificity))
            .then_with(|| a.inserted_at.cmp(&b.inserted_at))
    }
}

#[derive(Debug, Default)]
struct SalienceOnlyPolicy;

impl AgendaPolicy for SalienceOnlyPolicy {
    fn compare(&self, a: &Activation, b: &Activation) -> Ordering {
        // production_id asc means lexicographically smaller sorts first,
        // i.e. higher priority — so reverse the string comparison here to
        // keep `Greater == fires first` consistent across all policies.
        a.salience
            .cmp(&b.salience)
            .then_with(|| b.production_id.cmp(&a.production_id))
    }
}

#[derive(Debug, Default)]
struct FifoPolicy;

impl AgendaPolicy for FifoPolicy {
    fn compare(&self, a: &Activation, b: &Activation) -> Ordering {
        b.inserted_at.cmp(&a.inserted_at)
    }
}

#[derive(Debug, Default)]
struct LifoPolicy;

impl AgendaPolicy for LifoPolicy {
    fn compare(&self, a: &Activation, b: &Activation) -> Ordering {
        a.inserted_at.cmp(&b.inserted_at)
    }
}

#[derive(Clone)]
pub enum AgendaPolicyKind {
    Default,
    SalienceOnly,
    Fifo,
    Lifo,
    Custom(Arc<dyn AgendaPolicy>),
}

impl std::fmt::Debug for AgendaPolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl AgendaPolicyKind {
    pub fn tag(&self) -> &'static str {
        match self {
            AgendaPolicyKind::Default => "default",
            AgendaPolicyKind::SalienceOnly => "salience_only",
            AgendaPolicyKind::Fifo => "fifo",
            AgendaPolicyKind::Lifo => "lifo",
            AgendaPolicyKind::Custom(_) => "custom",
        }
    }

    pub fn by_tag(tag: &str) -> Option<Self> {
        match tag {
            "default" => Some(AgendaPolicyKind::Default),
            "salience_only" => Some(AgendaPolicyKind::SalienceOnly),
            "fifo" => Some(AgendaPolicyKind::Fifo),
            "lifo" => Some(AgendaPolicyKind::Lifo),
            _ => None,
        }
    }

    /// Resolve a tag against the four built-ins first, then the
    /// process-wide custom registry populated by [`register_custom_policy`].
    /// An unrecognized tag falls back to `Default` and returns an
    /// `unknown_policy` error alongside it for the caller to report.
    pub fn resolve_tag(tag: &str) -> (Self, Option<EngineError>) {
        if let Some(kind) = Self::by_tag(tag) {
            return (kind, None);
        }
        if let Some(policy) = Registries::global().agenda_policies.get(tag) {
            return (AgendaPolicyKind::Custom(policy), None);
        }
        (
            AgendaPolicyKind::Default,
            Some(EngineError::UnknownPolicy {
                kind: "agenda",
                tag: tag.to_string(),
            }),
        )
    }

    fn resolve(&self) -> Arc<dyn AgendaPolicy> {
        match self {
            AgendaPolicyKind::Default => Arc::new(DefaultPolicy),
            AgendaPolicyKind::SalienceOnly => Arc::new(SalienceOnlyPolicy),
            AgendaPolicyKind::Fifo => Arc::new(FifoPolicy),
            AgendaPolicyKind::Lifo => Arc::new(LifoPolicy),
            AgendaPolicyKind::Custom(policy) => policy.clone(),
        }
    }
}

/// Register a custom agenda policy under `tag` in the process-wide
/// registry, making it resolvable by tag from [`AgendaPolicyKind::resolve_tag`]
/// (and so from [`crate::config::EngineOptions::with_agenda_policy_tag`]).
pub fn register_custom_policy(tag: impl Into<String>, policy: Arc<dyn AgendaPolicy>) {
    Registries::global().agenda_policies.register(tag, policy);
}

struct HeapEntry {
    activation: Activation,
    policy: Arc<dyn AgendaPolicy>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.policy.compare(&self.activation, &other.activation) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.policy.compare(&self.activation, &other.activation)
    }
}

/// Priority queue of activations under the tenant's selected ordering
/// policy. `add`/`pop` are `O(log n)` via a binary heap; retraction-driven
/// bulk removal rebuilds the heap in `O(n)`, which is acceptable since it
/// is far rarer than add/pop in steady state.
pub struct Agenda {
    kind: AgendaPolicyKind,
    policy: Arc<dyn AgendaPolicy>,
    heap: BinaryHeap<HeapEntry>,
    recent: Vec<Activation>,
}

impl Agenda {
    pub fn new(kind: AgendaPolicyKind) -> Self {
        let policy = kind.resolve();
        Agenda {
            kind,
            policy,
            heap: BinaryHeap::new(),
            recent: Vec::new(),
        }
    }

    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    pub fn add(&mut self, activation: Activation) {
        self.recent.push(activation.clone());
        self.heap.push(HeapEntry {
            activation,
            policy: self.policy.clone(),
        });
    }

    pub fn peek(&self) -> Option<&Activation> {
        self.heap.peek().map(|e| &e.activation)
    }

    pub fn pop(&mut self) -> Option<Activation> {
        self.heap.pop().map(|e| e.activation)
    }

    pub fn size(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Activations added since the last `clear_recent`, oldest first.
    pub fn recent(&self) -> &[Activation] {
        &self.recent
    }

    pub fn clear_recent(&mut self) {
        self.recent.clear();
    }

    /// Remove every activation matching `predicate` (used when a fact
    /// retraction invalidates tokens referencing it). Returns the removed
    /// activations.
    pub fn remove_matching(&mut self, predicate: impl Fn(&Activation) -> bool) -> Vec<Activation> {
        let mut kept = BinaryHeap::new();
        let mut removed = Vec::new();
        for entry in self.heap.drain() {
            if predicate(&entry.activation) {
                removed.push(entry.activation);
            } else {
                kept.push(entry);
            }
        }
        self.heap = kept;
        self.recent.retain(|a| !predicate(a));
        removed
    }

    pub fn snapshot(&self) -> Vec<Activation> {
        self.heap.iter().map(|e| e.activation.clone()).collect()
    }

    /// Drops all activations; preserves the policy choice. Used by `reset`.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.recent.clear();
    }
}
