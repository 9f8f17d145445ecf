//! Refraction: prevents a production from re-firing for a token it has
//! already fired for, under one of four selectable policies.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::registry::Registries;
use crate::token::TokenSignature;

/// `(production_id, token_signature)` — the unit of refraction memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefractionKey {
    pub production_id: String,
    pub token_signature: TokenSignature,
}

impl RefractionKey {
    pub fn new(production_id: impl Into<String>, token_signature: TokenSignature) -> Self {
        RefractionKey {
            production_id: production_id.into(),
            token_signature,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefractionDecision {
    Refract,
    Fire,
}

/// Capability set a refraction policy implements: a read-only peek used
/// while building new activations (so an already-refracted match never
/// reaches the agenda), and a check-and-mark used at fire time, which is
/// the only point that mutates the store.
pub trait RefractionPolicy: std::fmt::Debug + Send + Sync {
    fn peek(&self, state: &RefractionState, key: &RefractionKey, now: DateTime<Utc>) -> bool;
    fn check_and_mark(
        &self,
        state: &mut RefractionState,
        key: &RefractionKey,
        now: DateTime<Utc>,
    ) -> RefractionDecision;
    fn cleanup(&self, _state: &mut RefractionState, _now: DateTime<Utc>) {}
}

/// Opaque, policy-specific state. Variants correspond 1:1 with the
/// built-in policies; a custom policy carries its own `Custom` payload.
#[derive(Debug, Clone, Default)]
pub enum RefractionState {
    #[default]
    Empty,
    KeySet(HashSet<RefractionKey>),
    RuleSet(HashSet<String>),
    TtlMap(HashMap<RefractionKey, DateTime<Utc>>),
}

#[derive(Debug, Default)]
struct DefaultPolicy;

impl RefractionPolicy for DefaultPolicy {
    fn peek(&self, state: &RefractionState, key: &RefractionKey, _now: DateTime<Utc>) -> bool {
        matches!(state, RefractionState::KeySet(set) if set.contains(key))
    }

    fn check_and_mark(
        &self,
        state: &mut RefractionState,
        key: &RefractionKey,
        _now: DateTime<Utc>,
    ) -> RefractionDecision {
        if !matches!(state, RefractionState::KeySet(_)) {
            *state = RefractionState::KeySet(HashSet::new());
        }
        let RefractionState::KeySet(set) = state else {
            unreachable!()
        };
        if set.contains(key) {
            RefractionDecision::Refract
        } else {
            set.insert(key.clone());
            RefractionDecision::Fire
        }
    }
}

#[derive(Debug, Default)]
struct PerRulePolicy;

impl RefractionPolicy for PerRulePolicy {
    fn peek(&self, state: &RefractionState, key: &RefractionKey, _now: DateTime<Utc>) -> bool {
        matches!(state, RefractionState::RuleSet(set) if set.contains(&key.production_id))
    }

    fn check_and_mark(
        &self,
        state: &mut RefractionState,
        key: &RefractionKey,
        _now: DateTime<Utc>,
    ) -> RefractionDecision {
        if !matches!(state, RefractionState::RuleSet(_)) {
            *state = RefractionState::RuleSet(HashSet::new());
        }
        let RefractionState::RuleSet(set) = state else {
            unreachable!()
        };
        if set.contains(&key.production_id) {
            RefractionDecision::Refract
        } else {
            set.insert(key.production_id.clone());
            RefractionDecision::Fire
        }
    }
}

#[derive(Debug)]
struct TtlPolicy {
    ttl_seconds: i64,
}

impl RefractionPolicy for TtlPolicy {
    fn peek(&self, state: &RefractionState, key: &RefractionKey, now: DateTime<Utc>) -> bool {
        match state {
            RefractionState::TtlMap(map) => match map.get(key) {
                Some(fired_at) => (now - *fired_at).num_seconds() < self.ttl_seconds,
                None => false,
            },
            _ => false,
        }
    }

    fn check_and_mark(
        &self,
        state: &mut RefractionState,
        key: &RefractionKey,
        now: DateTime<Utc>,
    ) -> RefractionDecision {
        if !matches!(state, RefractionState::TtlMap(_)) {
            *state = RefractionState::TtlMap(HashMap::new());
        }
        let RefractionState::TtlMap(map) = state else {
            unreachable!()
        };
        let refracted = match map.get(key) {
            Some(fired_at) => (now - *fired_at).num_seconds() < self.ttl_seconds,
            None => false,
        };
        if refracted {
            RefractionDecision::Refract
        } else {
            map.insert(key.clone(), now);
            RefractionDecision::Fire
        }
    }

    fn cleanup(&self, state: &mut RefractionState, now: DateTime<Utc>) {
        if let RefractionState::TtlMap(map) = state {
            map.retain(|_, fired_at| (now - *fired_at).num_seconds() < self.ttl_seconds);
        }
    }
}

#[derive(Debug, Default)]
struct NonePolicy;

impl RefractionPolicy for NonePolicy {
    fn peek(&self, _state: &RefractionState, _key: &RefractionKey, _now: DateTime<Utc>) -> bool {
        false
    }

    fn check_and_mark(
        &self,
        _state: &mut RefractionState,
        _key: &RefractionKey,
        _now: DateTime<Utc>,
    ) -> RefractionDecision {
        RefractionDecision::Fire
    }
}

/// Built-in policy selector, or a user-supplied implementation.
#[derive(Clone)]
pub enum RefractionPolicyKind {
    Default,
    PerRule,
    Ttl { ttl_seconds: i64 },
    None,
    Custom(Arc<dyn RefractionPolicy>),
}

impl std::fmt::Debug for RefractionPolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefractionPolicyKind::Default => write!(f, "RefractionPolicyKind::Default"),
            RefractionPolicyKind::PerRule => write!(f, "RefractionPolicyKind::PerRule"),
            RefractionPolicyKind::Ttl { ttl_seconds } => {
                write!(f, "RefractionPolicyKind::Ttl({ttl_seconds})")
            }
            RefractionPolicyKind::None => write!(f, "RefractionPolicyKind::None"),
            RefractionPolicyKind::Custom(_) => write!(f, "RefractionPolicyKind::Custom(..)"),
        }
    }
}

impl RefractionPolicyKind {
    pub fn tag(&self) -> &'static str {
        match self {
            RefractionPolicyKind::Default => "default",
            RefractionPolicyKind::PerRule => "per_rule",
            RefractionPolicyKind::Ttl { .. } => "ttl",
            RefractionPolicyKind::None => "none",
            RefractionPolicyKind::Custom(_) => "custom",
        }
    }

    pub fn by_tag(tag: &str) -> Option<Self> {
        match tag {
            "default" => Some(RefractionPolicyKind::Default),
            "per_rule" => Some(RefractionPolicyKind::PerRule),
            "ttl" => Some(RefractionPolicyKind::Ttl { ttl_seconds: 300 }),
            "none" => Some(RefractionPolicyKind::None),
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
        if let Some(policy) = Registries::global().refraction_policies.get(tag) {
            return (RefractionPolicyKind::Custom(policy), None);
        }
        (
            RefractionPolicyKind::Default,
            Some(EngineError::UnknownPolicy {
                kind: "refraction",
                tag: tag.to_string(),
            }),
        )
    }

    fn policy(&self) -> Box<dyn RefractionPolicy> {
        match self {
            RefractionPolicyKind::Default => Box::new(DefaultPolicy),
            RefractionPolicyKind::PerRule => Box::new(PerRulePolicy),
            RefractionPolicyKind::Ttl { ttl_seconds } => Box::new(TtlPolicy {
                ttl_seconds: *ttl_seconds,
            }),
            RefractionPolicyKind::None => Box::new(NonePolicy),
            RefractionPolicyKind::Custom(policy) => {
                // Custom policies are already trait objects; wrap a clone
                // of the Arc in an adapter so the call sites below can
                // treat every kind uniformly.
                struct ArcAdapter(Arc<dyn RefractionPolicy>);
                impl RefractionPolicy for ArcAdapter {
                    fn peek(&self, s: &RefractionState, k: &RefractionKey, now: DateTime<Utc>) -> bool {
                        self.0.peek(s, k, now)
                    }
                    fn check_and_mark(
                        &self,
                        s: &mut RefractionState,
                        k: &RefractionKey,
                        now: DateTime<Utc>,
                    ) -> RefractionDecision {
                        self.0.check_and_mark(s, k, now)
                    }
                    fn cleanup(&self, s: &mut RefractionState, now: DateTime<Utc>) {
                        self.0.cleanup(s, now)
                    }
                }
                Box::new(ArcAdapter(policy.clone()))
            }
        }
    }
}

/// Register a custom refraction policy under `tag` in the process-wide
/// registry, making it resolvable by tag from [`RefractionPolicyKind::resolve_tag`]
/// (and so from [`crate::config::EngineOptions::with_refraction_policy_tag`]).
pub fn register_custom_policy(tag: impl Into<String>, policy: Arc<dyn RefractionPolicy>) {
    Registries::global().refraction_policies.register(tag, policy);
}

/// Owns the policy choice and its opaque state for one engine instance.
#[derive(Debug, Clone)]
pub struct RefractionStore {
    kind: RefractionPolicyKind,
    state: RefractionState,
}

impl RefractionStore {
    pub fn new(kind: RefractionPolicyKind) -> Self {
        RefractionStore {
            kind,
            state: RefractionState::Empty,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    /// Non-mutating check used while building new activations, so an
    /// already-refracted match is never added to the agenda.
    pub fn would_refract(&self, key: &RefractionKey, now: DateTime<Utc>) -> bool {
        self.kind.policy().peek(&self.state, key, now)
    }

    /// Mutating check performed inside `fire_activation`, after the
    /// activation has been popped from the agenda.
    pub fn check_and_mark(&mut self, key: &RefractionKey, now: DateTime<Utc>) -> RefractionDecision {
        self.kind.policy().check_and_mark(&mut self.state, key, now)
    }

    pub fn cleanup(&mut self, now: DateTime<Utc>) {
        self.kind.policy().cleanup(&mut self.state, now);
    }

    /// Clears all state. Called by `reset()`; preserves the policy choice.
    pub fn clear(&mut self) {
        self.state = RefractionState::Empty;
    }
}

impl std::fmt::Debug for dyn RefractionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<refraction policy>")
    }
}
