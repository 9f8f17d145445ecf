//! The fact data model for the rete-core production rule engine.
//!
//! A [`Fact`] is the atomic unit of working memory: an opaque, comparable
//! identifier, a type tag, and a bag of named [`FactValue`]s. Facts are
//! immutable once asserted — updates are expressed as retract-then-assert
//! by the engine, never as in-place mutation here.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── FactId ───────────────────────────────────────────────────────────────────

/// Opaque, comparable, hashable fact identifier.
///
/// `Ord` is used by the `oldest` eviction policy (ascending id) and by
/// canonical token-signature sorting; it is lexicographic over the
/// underlying string, not semantic.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct FactId(String);

impl FactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A fresh, globally-unique id: a random 128-bit value, base16-encoded.
    /// Used by the action executor to name derived facts.
    pub fn fresh() -> Self {
        let hi: u64 = fastrand::u64(..);
        let lo: u64 = fastrand::u64(..);
        Self(format!("{hi:016x}{lo:016x}"))
    }
}

impl fmt::Debug for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactId({})", self.0)
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FactId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FactId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ── FactValue ────────────────────────────────────────────────────────────────

/// A field value. Lists are homogeneous by convention; the engine does not
/// enforce this, since it has no schema layer (that lives in the out-of-scope
/// DSL compiler).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum FactValue {
    Int(i64),
    /// Fixed-precision decimals are represented as `f64`. Equality and
    /// hashing compare bit patterns (`to_bits`), so `NaN != NaN` holds but
    /// two identically-constructed decimals always hash to the same bucket.
    Decimal(f64),
    Str(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    List(Vec<FactValue>),
}

impl PartialEq for FactValue {
    fn eq(&self, other: &Self) -> bool {
        use FactValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a == b,
            (Decimal(a), Decimal(b)) => a.to_bits() == b.to_bits(),
            (Str(a), Str(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (List(a), List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FactValue {}

impl Hash for FactValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FactValue::Int(i) => i.hash(state),
            FactValue::Decimal(d) => d.to_bits().hash(state),
            FactValue::Str(s) => s.hash(state),
            FactValue::Bool(b) => b.hash(state),
            FactValue::Timestamp(t) => t.hash(state),
            FactValue::List(items) => items.hash(state),
        }
    }
}

impl From<i64> for FactValue {
    fn from(v: i64) -> Self {
        FactValue::Int(v)
    }
}

impl From<f64> for FactValue {
    fn from(v: f64) -> Self {
        FactValue::Decimal(v)
    }
}

impl From<&str> for FactValue {
    fn from(v: &str) -> Self {
        FactValue::Str(v.to_string())
    }
}

impl From<String> for FactValue {
    fn from(v: String) -> Self {
        FactValue::Str(v)
    }
}

impl From<bool> for FactValue {
    fn from(v: bool) -> Self {
        FactValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for FactValue {
    fn from(v: DateTime<Utc>) -> Self {
        FactValue::Timestamp(v)
    }
}

impl From<Vec<FactValue>> for FactValue {
    fn from(v: Vec<FactValue>) -> Self {
        FactValue::List(v)
    }
}

impl FactValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FactValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            FactValue::Decimal(d) => Some(*d),
            FactValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FactValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FactValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

// ── Fact ─────────────────────────────────────────────────────────────────────

/// A type that can be asserted into working memory.
///
/// The engine itself only ever operates on the schema-less [`Record`] —
/// this trait is a conversion seam so callers can define their own typed
/// fact structs and hand them to the engine without hand-writing the
/// conversion. `#[derive(Fact)]` (from `rete-core-derive`) generates an
/// impl of this trait for a struct annotated with `#[fact(id)]` on its id
/// field and `#[fact(type = "...")]` on the struct itself.
pub trait Fact: Clone + fmt::Debug + Send + Sync + 'static {
    fn id(&self) -> FactId;
    fn fact_type(&self) -> &'static str;
    /// Flatten this value into the schema-less representation the engine
    /// actually indexes and joins on.
    fn to_record(&self) -> Record;
}

/// A generic, schema-less fact record. Most callers use this directly
/// rather than implementing [`Fact`] on their own type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    id: FactId,
    fact_type: String,
    fields: BTreeMap<String, FactValue>,
}

impl Record {
    pub fn new(id: impl Into<FactId>, fact_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fact_type: fact_type.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FactValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn id(&self) -> &FactId {
        &self.id
    }

    pub fn fact_type(&self) -> &str {
        &self.fact_type
    }

    pub fn field(&self, name: &str) -> Option<&FactValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, FactValue> {
        &self.fields
    }
}

// ── Provenance ───────────────────────────────────────────────────────────────

/// Derivation lineage attached to a fact produced by a production's `emit`
/// action. This is a lookup relation, not ownership: retracting a parent
/// fact never walks or invalidates a descendant's provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Provenance {
    pub production_id: String,
    /// The canonical signature of the token that produced this fact.
    /// Opaque here; `rete-core::Token::signature` is the producer.
    pub token_signature: String,
    /// Ordered ids of the facts that participated in the triggering match.
    pub parent_ids: Vec<FactId>,
    pub derived_at: DateTime<Utc>,
}

/// A fact together with the provenance that produced it, if any. The
/// working memory stores plain `Record`s; this pairing is what the action
/// executor hands back to callers as `derived` output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DerivedRecord {
    pub record: Record,
    pub provenance: Provenance,
}

// ── Validation ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FactError {
    #[error("fact id is required")]
    MissingId,
    #[error("fact type is required")]
    MissingType,
}

/// Validate the two attributes every fact must carry: a non-empty id and a
/// non-empty type tag. This is the only schema-independent check the
/// engine performs; richer validation (field shape, enums) belongs to the
/// out-of-scope DSL compiler.
pub fn validate_required(id: &str, fact_type: &str) -> Result<(), FactError> {
    if id.trim().is_empty() {
        return Err(FactError::MissingId);
    }
    if fact_type.trim().is_empty() {
        return Err(FactError::MissingType);
    }
    Ok(())
}
