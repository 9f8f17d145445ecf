//! The right-hand-side action kinds a production node can carry. Per
//! design, this is intentionally a closed enum rather than an open
//! trait-object list: the runtime only ever needs to execute a small,
//! known vocabulary of actions. `Unknown` is part of that closed set too —
//! it is what a network compiled against a newer action vocabulary than
//! this runtime understands turns into, so the executor's `unknown_action`
//! path has a real, reachable source instead of being dead defensive code.

use std::collections::BTreeMap;

use rete_effects::Effect;
use serde::Serialize;

use rete_fact::FactValue;

/// A value inside an action's parameters: a literal, a sentinel referring
/// to a token binding, or a calculator-registry invocation, all resolved
/// at fire time.
#[derive(Debug, Clone, Serialize)]
pub enum TemplateValue {
    Literal(FactValue),
    /// `{:binding, name}` in the source representation.
    Binding(String),
    /// A named function from the calculator registry applied to nested
    /// template values (which may themselves be bindings or further calc
    /// expressions), e.g. `subtract(H, 40)`.
    Calc { function: String, args: Vec<TemplateValue> },
}

impl From<FactValue> for TemplateValue {
    fn from(v: FactValue) -> Self {
        TemplateValue::Literal(v)
    }
}

/// The shape of a fact to emit: its type tag and a field map whose values
/// may reference token bindings.
#[derive(Debug, Clone, Serialize)]
pub struct FactTemplate {
    pub fact_type: String,
    pub fields: BTreeMap<String, TemplateValue>,
}

impl FactTemplate {
    pub fn new(fact_type: impl Into<String>) -> Self {
        FactTemplate {
            fact_type: fact_type.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum Action {
    /// Substitute bindings into `template`, assign a fresh id, attach
    /// provenance, and enqueue the result for assertion once the firing
    /// activation's whole action list has run.
    Emit { template: FactTemplate },
    /// Invoke an external callback with the activation's bindings and
    /// facts prepended to `args`. Exceptions are isolated into the
    /// outputs as `callback_error`, not propagated.
    Call {
        module: String,
        function: String,
        args: Vec<TemplateValue>,
    },
    /// A structured log entry, treated purely as a side-effect record.
    Log { level: String, message: String },
    /// An action kind this runtime build does not recognize, carrying
    /// whatever tag the network declared for it. A compiler is expected to
    /// reject these before handing a network to [`crate::network::NetworkBuilder`];
    /// this variant exists for the network that was compiled against a
    /// newer action vocabulary and shipped to an older runtime anyway, so
    /// that one unrecognized action fails softly instead of the whole
    /// network failing to build.
    Unknown { kind: String },
}

impl Action {
    /// Effect classification for this RHS action, used to decide whether a
    /// failure can be retried automatically or needs a human. `log` never
    /// touches working memory or the outside world so it is `Pure`; `emit`
    /// can be compensated by retracting the fact it produced, so it is
    /// `Mutate`; `call` defaults to `Mutate` since the engine cannot see
    /// what the external callback actually did, unless the callback itself
    /// is known to be irreversible. `unknown` never runs, so it is `Pure`.
    pub fn effect(&self) -> Effect {
        match self {
            Action::Log { .. } => Effect::Pure,
            Action::Emit { .. } => Effect::Mutate,
            Action::Call { .. } => Effect::Mutate,
            Action::Unknown { .. } => Effect::Pure,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Action::Emit { .. } => "emit",
            Action::Call { .. } => "call",
            Action::Log { .. } => "log",
            Action::Unknown { kind } => kind,
        }
    }
}
