//! The engine: owns one tenant's working memory, compiled network,
//! alpha/beta memories, agenda, and refraction store, and exposes the
//! command surface (`assert`/`modify`/`retract`/`run`/`step`/`reset`/
//! `snapshot`) that every other module in this crate exists to serve.
//!
//! Engine state is owned exclusively by the engine instance — there is no
//! shared mutable state between tenants beyond the read-mostly registries
//! in [`crate::registry`], which an engine clones from at construction
//! time rather than locking on every fact.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use rete_fact::{DerivedRecord, FactId, FactValue, Provenance, Record};

use crate::action::{Action, FactTemplate, TemplateValue};
use crate::agenda::{Activation, Agenda};
use crate::alpha::{self, AlphaMemory};
use crate::beta::BetaMemory;
use crate::calculator::{CalculatorFn, CalculatorRegistry, ReturnType};
use crate::config::EngineOptions;
use crate::error::{EngineError, Result};
use crate::memory_manager::{self, EvictionPolicy, UsageEstimate};
use crate::network::{Network, Node, NodeId, ProductionNode};
use crate::predicate::{PredicateFn, PredicateRegistry};
use crate::refraction::{RefractionDecision, RefractionStore};
use crate::registry::{RegistryError, Registries};
use crate::token::Token;
use crate::tracer::{TraceEventKind, Tracer};
use crate::working_memory::WorkingMemory;

/// A registered `call` action target: the activation's bindings plus its
/// rendered argument list in, a value list or an error message out.
/// Mirrors the function-pointer shape of [`crate::predicate::PredicateFn`]
/// and [`crate::calculator::CalculatorFn`] rather than a boxed closure,
/// since callbacks are registered once at startup and never capture
/// per-call state.
pub type CallbackFn = fn(&BTreeMap<String, FactValue>, &[FactValue]) -> std::result::Result<Vec<FactValue>, String>;

/// A fired or refracted activation, trimmed to what a caller needs without
/// handing back the full token.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationSummary {
    pub production_id: String,
    pub salience: i64,
    pub specificity: usize,
    pub fact_ids: Vec<FactId>,
    pub token_signature: String,
}

impl From<&Activation> for ActivationSummary {
    fn from(activation: &Activation) -> Self {
        ActivationSummary {
            production_id: activation.production_id.clone(),
            salience: activation.salience,
            specificity: activation.specificity,
            fact_ids: activation.token.fact_ids().to_vec(),
            token_signature: activation.token.signature().as_str().to_string(),
        }
    }
}

/// Controls how much of [`Outputs`] a command actually populates, so a
/// high-throughput caller that only wants the fired-activation count is
/// not forced to pay for cloning every derived record on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnFilter {
    All,
    SummaryOnly,
    None,
}

impl Default for ReturnFilter {
    fn default() -> Self {
        ReturnFilter::All
    }
}

/// Options accepted by `assert`/`modify`/`retract`.
#[derive(Debug, Clone)]
pub struct AssertOptions {
    /// When true (the default), propagation stops after updating working
    /// memory and the agenda; the caller must call `run`/`step`
    /// separately. When false, the command also runs the agenda inline.
    pub batch: bool,
    pub fire_limit: Option<usize>,
    pub return_filter: ReturnFilter,
    pub deadline: Option<DateTime<Utc>>,
}

impl Default for AssertOptions {
    fn default() -> Self {
        AssertOptions {
            batch: true,
            fire_limit: None,
            return_filter: ReturnFilter::All,
            deadline: None,
        }
    }
}

/// Options accepted by `run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub fire_limit: Option<usize>,
    pub return_filter: ReturnFilter,
    pub deadline: Option<DateTime<Utc>>,
}

/// The result of a single `step()` call.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Fired(ActivationSummary, Outputs),
    Refracted(ActivationSummary),
    AgendaEmpty,
}

/// The shape every command that touches working memory or the agenda
/// returns. Execution-level errors (a bad callback, an unknown action
/// kind) are collected here rather than aborting the call — see
/// [`crate::error::EngineError`]'s module doc for the split between
/// structural and execution errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Outputs {
    pub asserted: Vec<Record>,
    pub modified: Vec<Record>,
    pub retracted: Vec<Record>,
    pub derived: Vec<DerivedRecord>,
    pub activations: Vec<ActivationSummary>,
    pub fired: Vec<ActivationSummary>,
    pub refracted: Vec<ActivationSummary>,
    #[serde(skip)]
    pub errors: Vec<EngineError>,
}

impl Outputs {
    fn apply_filter(&mut self, filter: ReturnFilter) {
        match filter {
            ReturnFilter::All => {}
            ReturnFilter::SummaryOnly => {
                self.asserted.clear();
                self.modified.clear();
                self.retracted.clear();
                self.derived.clear();
            }
            ReturnFilter::None => {
                *self = Outputs {
                    errors: std::mem::take(&mut self.errors),
                    ..Outputs::default()
                };
            }
        }
    }
}

/// A point-in-time, serializable view of an engine's state. `network_version`
/// must match the engine's compiled network before [`Engine::restore`] will
/// accept it — a snapshot from one network topology is meaningless against
/// another. The refraction store's internal state is deliberately not
/// carried verbatim (policy-specific, and not all variants are
/// serializable); only its policy tag is, and `restore` re-derives the
/// rest by replaying assertion through the ordinary propagation path.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub tenant_key: String,
    pub network_version: String,
    pub working_memory: Vec<Record>,
    pub agenda: Vec<ActivationSummary>,
    pub refraction_policy_tag: String,
    pub created_at: DateTime<Utc>,
}

/// Per-tenant engine state: working memory, the node memories computed
/// from it, the agenda, the refraction store, and a private clone of the
/// pluggable registries seeded from [`Registries::global`] at
/// construction time.
pub struct Engine {
    tenant_key: String,
    network: Arc<Network>,
    options: EngineOptions,
    working_memory: WorkingMemory,
    alpha_memories: HashMap<NodeId, AlphaMemory>,
    beta_memories: HashMap<NodeId, BetaMemory>,
    /// Join-key combinations each beta memory must index, precomputed once
    /// so `new()` and `reset()` register them identically and in an order
    /// that never depends on token insertion order.
    beta_combo_requirements: HashMap<NodeId, Vec<Vec<String>>>,
    agenda: Agenda,
    refraction: RefractionStore,
    tracer: Tracer,
    predicates: PredicateRegistry,
    calculators: CalculatorRegistry,
    callbacks: HashMap<(String, String), CallbackFn>,
    ops_since_memory_check: u64,
    total_fired: u64,
    /// `unknown_policy` warnings raised while resolving a policy tag at
    /// construction time; drained into the first command's outputs.
    startup_warnings: Vec<EngineError>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tenant_key", &self.tenant_key)
            .field("network_version", &self.network.version())
            .field("working_memory_len", &self.working_memory.len())
            .field("agenda_size", &self.agenda.size())
            .field("total_fired", &self.total_fired)
            .finish()
    }
}

const ESTIMATED_ACTIVATION_BYTES: usize = 128;

impl Engine {
    pub fn new(tenant_key: impl Into<String>, network: Arc<Network>, mut options: EngineOptions) -> Self {
        let tenant_key = tenant_key.into();
        let startup_warnings = std::mem::take(&mut options.pending_warnings);
        let registries = Registries::global();
        let predicates = registries.predicates.read().expect("predicate registry lock poisoned").clone();
        let calculators = registries.calculators.read().expect("calculator registry lock poisoned").clone();

        let beta_combo_requirements = compute_beta_combo_requirements(&network);

        let mut alpha_memories = HashMap::new();
        for id in network.alpha_node_ids() {
            alpha_memories.insert(id, AlphaMemory::new());
        }

        let mut beta_memories = HashMap::new();
        for beta in network.beta_nodes() {
            beta_memories.insert(beta.id, BetaMemory::new());
        }
        for (id, combos) in &beta_combo_requirements {
            if let Some(mem) = beta_memories.get_mut(id) {
                for combo in combos {
                    mem.register_combo(combo.clone());
                }
            }
        }

        let tracer = if options.tracer_enabled {
            Tracer::enabled(options.tracer_max_events)
        } else {
            Tracer::disabled()
        };

        info!("engine constructed for tenant `{tenant_key}`, network version `{}`", network.version());

        Engine {
            agenda: Agenda::new(options.agenda_policy.clone()),
            refraction: RefractionStore::new(options.refraction_policy.clone()),
            tenant_key,
            network,
            options,
            working_memory: WorkingMemory::new(),
            alpha_memories,
            beta_memories,
            beta_combo_requirements,
            tracer,
            predicates,
            calculators,
            callbacks: HashMap::new(),
            ops_since_memory_check: 0,
            total_fired: 0,
            startup_warnings,
        }
    }

    /// Move any pending `unknown_policy` startup warnings into `outputs`.
    /// A no-op after the first call, since the source vec is drained.
    fn drain_startup_warnings(&mut self, outputs: &mut Outputs) {
        if !self.startup_warnings.is_empty() {
            outputs.errors.append(&mut self.startup_warnings);
        }
    }

    pub fn tenant_key(&self) -> &str {
        &self.tenant_key
    }

    pub fn network_version(&self) -> &str {
        self.network.version()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn agenda_size(&self) -> usize {
        self.agenda.size()
    }

    pub fn is_agenda_empty(&self) -> bool {
        self.agenda.is_empty()
    }

    pub fn working_memory_len(&self) -> usize {
        self.working_memory.len()
    }

    pub fn is_working_memory_empty(&self) -> bool {
        self.working_memory.is_empty()
    }

    pub fn total_fired(&self) -> u64 {
        self.total_fired
    }

    pub fn register_callback(&mut self, module: impl Into<String>, function: impl Into<String>, f: CallbackFn) {
        self.callbacks.insert((module.into(), function.into()), f);
    }

    pub fn register_predicate(&mut self, symbol: impl Into<String>, f: PredicateFn) {
        self.predicates.register(symbol, f);
    }

    pub fn register_calculator(&mut self, name: impl Into<String>, arity: usize, return_type: ReturnType, f: CalculatorFn) {
        self.calculators.register(name, arity, return_type, f);
    }

    /// Assert a batch of new facts. The whole batch is rejected (no
    /// partial effect) if any record carries a blank id/type or an id
    /// already present in working memory or elsewhere in the batch.
    pub fn assert(&mut self, records: Vec<Record>, opts: &AssertOptions) -> Result<Outputs> {
        self.validate_batch(&records)?;
        let mut outputs = Outputs::default();
        for record in &records {
            self.working_memory.insert(record.clone());
            self.tracer.record(
                TraceEventKind::Assert,
                record.id().as_str().to_string(),
                serde_json::json!({"fact_type": record.fact_type()}),
                None,
            );
            self.on_fact_asserted(record);
        }
        debug!("asserted {} fact(s) into tenant `{}`", records.len(), self.tenant_key);
        outputs.asserted = records;
        self.after_propagation(opts, &mut outputs)?;
        Ok(outputs)
    }

    /// Modify existing facts: each is retracted (cascading through any
    /// dependent tokens and activations) then re-asserted under the same
    /// id. Modifying an id with no current fact behaves as a plain assert.
    pub fn modify(&mut self, records: Vec<Record>, opts: &AssertOptions) -> Result<Outputs> {
        let mut outputs = Outputs::default();
        for record in &records {
            if let Some(old) = self.retract_one(record.id()) {
                outputs.retracted.push(old);
            }
        }
        for record in &records {
            self.working_memory.insert(record.clone());
            self.tracer.record(
                TraceEventKind::Assert,
                record.id().as_str().to_string(),
                serde_json::json!({"fact_type": record.fact_type(), "modified": true}),
                None,
            );
            self.on_fact_asserted(record);
        }
        outputs.modified = records;
        self.after_propagation(opts, &mut outputs)?;
        Ok(outputs)
    }

    /// Retract facts by id, cascading the removal through every alpha
    /// memory, every beta memory's token table, and any agenda activation
    /// whose token references the retracted fact. Unknown ids are ignored.
    pub fn retract(&mut self, ids: &[FactId], opts: &AssertOptions) -> Result<Outputs> {
        let mut outputs = Outputs::default();
        for id in ids {
            if let Some(record) = self.retract_one(id) {
                outputs.retracted.push(record);
            }
        }
        self.after_propagation(opts, &mut outputs)?;
        Ok(outputs)
    }

    /// Drain the agenda under `opts.fire_limit` (defaulting to the
    /// engine's configured `default_fire_limit`), firing activations in
    /// priority order. Stops early at the deadline if one is given.
    pub fn run(&mut self, opts: &RunOptions) -> Result<Outputs> {
        let mut outputs = Outputs::default();
        self.drain_startup_warnings(&mut outputs);
        let fire_limit = opts.fire_limit.unwrap_or(self.options.default_fire_limit);
        self.run_internal(fire_limit, opts.deadline, &mut outputs)?;
        outputs.activations = self.agenda.recent().iter().map(ActivationSummary::from).collect();
        self.agenda.clear_recent();
        outputs.apply_filter(opts.return_filter);
        Ok(outputs)
    }

    /// Pop and fire (or refract) exactly one activation. Refraction is
    /// checked here, after the pop, and does not consume any fire-limit
    /// counter — only `run`'s per-call limit is decremented by an actual
    /// fire.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let Some(activation) = self.agenda.pop() else {
            return Ok(StepOutcome::AgendaEmpty);
        };
        let now = Utc::now();
        let key = activation.refraction_key();
        match self.refraction.check_and_mark(&key, now) {
            RefractionDecision::Refract => {
                self.tracer.record(
                    TraceEventKind::Refraction,
                    activation.production_id.clone(),
                    serde_json::json!({"decision": "refract", "phase": "step"}),
                    None,
                );
                Ok(StepOutcome::Refracted(ActivationSummary::from(&activation)))
            }
            RefractionDecision::Fire => {
                let summary = ActivationSummary::from(&activation);
                let mut outputs = Outputs::default();
                self.drain_startup_warnings(&mut outputs);
                self.fire(&activation, &mut outputs)?;
                self.total_fired += 1;
                Ok(StepOutcome::Fired(summary, outputs))
            }
        }
    }

    /// Clear working memory, all node memories, the agenda, the
    /// refraction store, and the tracer's ring buffer. The compiled
    /// network and configured options are untouched.
    pub fn reset(&mut self) {
        self.working_memory.clear();
        for id in self.network.alpha_node_ids() {
            self.alpha_memories.insert(id, AlphaMemory::new());
        }
        let beta_ids: Vec<NodeId> = self.network.beta_nodes().iter().map(|b| b.id).collect();
        for beta_id in beta_ids {
            self.beta_memories.insert(beta_id, BetaMemory::new());
        }
        for (id, combos) in &self.beta_combo_requirements {
            if let Some(mem) = self.beta_memories.get_mut(id) {
                for combo in combos {
                    mem.register_combo(combo.clone());
                }
            }
        }
        self.agenda.clear();
        self.refraction.clear();
        self.tracer.clear();
        self.ops_since_memory_check = 0;
        info!("engine reset for tenant `{}`", self.tenant_key);
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            tenant_key: self.tenant_key.clone(),
            network_version: self.network.version().to_string(),
            working_memory: self.working_memory.facts().cloned().collect(),
            agenda: self.agenda.snapshot().iter().map(ActivationSummary::from).collect(),
            refraction_policy_tag: self.refraction.tag().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Rebuild working memory, node memories, and the agenda from a
    /// snapshot taken against the same network version. The refraction
    /// store is reset rather than restored verbatim (its internal state
    /// is policy-specific and not all variants are serializable), so a
    /// production already refracted before the snapshot may re-fire once
    /// after a restore — an accepted simplification, not a data loss bug.
    pub fn restore(&mut self, snapshot: &EngineSnapshot) -> Result<()> {
        if snapshot.network_version != self.network.version() {
            return Err(EngineError::invalid_fact(format!(
                "snapshot network version `{}` does not match engine network version `{}`",
                snapshot.network_version,
                self.network.version()
            )));
        }
        self.reset();
        for record in &snapshot.working_memory {
            self.working_memory.insert(record.clone());
            self.on_fact_asserted(record);
        }
        self.agenda.clear_recent();
        info!("engine restored from snapshot for tenant `{}`", self.tenant_key);
        Ok(())
    }

    fn validate_batch(&self, records: &[Record]) -> Result<()> {
        let mut seen: HashSet<FactId> = HashSet::new();
        for record in records {
            rete_fact::validate_required(record.id().as_str(), record.fact_type())
                .map_err(|e| EngineError::invalid_fact(e.to_string()))?;
            if !seen.insert(record.id().clone()) {
                return Err(EngineError::duplicate_id(record.id()));
            }
            if self.working_memory.contains(record.id()) {
                return Err(EngineError::duplicate_id(record.id()));
            }
        }
        Ok(())
    }

    fn after_propagation(&mut self, opts: &AssertOptions, outputs: &mut Outputs) -> Result<()> {
        self.drain_startup_warnings(outputs);
        self.maybe_evict()?;
        if !opts.batch {
            let fire_limit = opts.fire_limit.unwrap_or(self.options.default_fire_limit);
            self.run_internal(fire_limit, opts.deadline, outputs)?;
        }
        outputs.activations = self.agenda.recent().iter().map(ActivationSummary::from).collect();
        self.agenda.clear_recent();
        outputs.apply_filter(opts.return_filter);
        Ok(())
    }

    fn run_internal(&mut self, fire_limit: usize, deadline: Option<DateTime<Utc>>, outputs: &mut Outputs) -> Result<()> {
        let mut fired_this_call = 0usize;
        loop {
            if fired_this_call >= fire_limit {
                break;
            }
            if let Some(deadline) = deadline {
                if Utc::now() >= deadline {
                    break;
                }
            }
            let Some(activation) = self.agenda.pop() else { break };
            let now = Utc::now();
            let key = activation.refraction_key();
            match self.refraction.check_and_mark(&key, now) {
                RefractionDecision::Refract => {
                    self.tracer.record(
                        TraceEventKind::Refraction,
                        activation.production_id.clone(),
                        serde_json::json!({"decision": "refract", "phase": "fire"}),
                        None,
                    );
                    outputs.refracted.push(ActivationSummary::from(&activation));
                    continue;
                }
                RefractionDecision::Fire => {}
            }
            let summary = ActivationSummary::from(&activation);
            self.fire(&activation, outputs)?;
            outputs.fired.push(summary);
            fired_this_call += 1;
            self.total_fired += 1;
        }
        info!(
            "run finished for tenant `{}`: fired {fired_this_call} activation(s), {} remaining on agenda",
            self.tenant_key,
            self.agenda.size()
        );
        Ok(())
    }

    /// Execute every action on the activation's production in order, then
    /// assert the sub-batch of derived facts once all actions have run.
    /// Returns `Err` only for `memory_limit_exceeded`, which terminates
    /// the enclosing `run`; every other action-level failure is collected
    /// into `outputs.errors`.
    fn fire(&mut self, activation: &Activation, outputs: &mut Outputs) -> Result<()> {
        let Some(prod) = self.network.production_node_by_production_id(&activation.production_id).cloned() else {
            outputs.errors.push(EngineError::MissingProduction(activation.production_id.clone()));
            return Ok(());
        };

        self.tracer.record(
            TraceEventKind::Fire,
            prod.production_id.clone(),
            serde_json::json!({"token_signature": activation.token.signature().as_str()}),
            None,
        );

        let mut derived_batch: Vec<DerivedRecord> = Vec::new();
        for action in &prod.actions {
            match action {
                Action::Log { level, message } => {
                    self.execute_log(&prod.production_id, level, message, activation);
                }
                Action::Emit { template } => {
                    derived_batch.push(self.instantiate_template(template, activation, &prod.production_id));
                }
                Action::Call { module, function, args } => {
                    if let Err(message) = self.invoke_call(module, function, args, activation) {
                        warn!("callback error in production `{}`: {message}", prod.production_id);
                        outputs.errors.push(EngineError::CallbackError {
                            production_id: prod.production_id.clone(),
                            message,
                        });
                    }
                }
                Action::Unknown { kind } => {
                    warn!("unknown action kind `{kind}` in production `{}`", prod.production_id);
                    outputs.errors.push(EngineError::UnknownAction {
                        production_id: prod.production_id.clone(),
                        kind: kind.clone(),
                    });
                }
            }
        }

        for derived in derived_batch {
            if self.working_memory.contains(derived.record.id()) {
                outputs.errors.push(EngineError::invalid_fact(format!(
                    "derived fact id `{}` collided with an existing fact",
                    derived.record.id()
                )));
                continue;
            }
            self.working_memory.insert(derived.record.clone());
            self.tracer.record(
                TraceEventKind::Derive,
                derived.record.id().as_str().to_string(),
                serde_json::json!({"production_id": derived.provenance.production_id}),
                None,
            );
            self.on_fact_asserted(&derived.record);
            outputs.derived.push(derived);
        }

        self.maybe_evict()
    }

    fn execute_log(&self, production_id: &str, level: &str, message: &str, activation: &Activation) {
        let bindings = activation.token.bindings();
        let tenant = &self.tenant_key;
        match level {
            "error" => {
                log::error!(target: "rete_core::action", "[{production_id}] {message} (tenant={tenant}, bindings={bindings:?})")
            }
            "warn" => {
                log::warn!(target: "rete_core::action", "[{production_id}] {message} (tenant={tenant}, bindings={bindings:?})")
            }
            "debug" => {
                log::debug!(target: "rete_core::action", "[{production_id}] {message} (tenant={tenant}, bindings={bindings:?})")
            }
            _ => {
                log::info!(target: "rete_core::action", "[{production_id}] {message} (tenant={tenant}, bindings={bindings:?})")
            }
        }
    }

    fn instantiate_template(&self, template: &FactTemplate, activation: &Activation, production_id: &str) -> DerivedRecord {
        let id = FactId::fresh();
        let mut record = Record::new(id, template.fact_type.clone());
        for (field, value) in &template.fields {
            record.set_field(field.clone(), self.substitute_value(value, activation.token.bindings()));
        }
        let provenance = Provenance {
            production_id: production_id.to_string(),
            token_signature: activation.token.signature().as_str().to_string(),
            parent_ids: activation.token.fact_ids().to_vec(),
            derived_at: Utc::now(),
        };
        DerivedRecord { record, provenance }
    }

    fn substitute_value(&self, value: &TemplateValue, bindings: &BTreeMap<String, FactValue>) -> FactValue {
        match value {
            TemplateValue::Literal(v) => v.clone(),
            TemplateValue::Binding(name) => bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| FactValue::Str(format!("<unbound:{name}>"))),
            TemplateValue::Calc { function, args } => {
                let evaluated: Vec<FactValue> = args.iter().map(|a| self.substitute_value(a, bindings)).collect();
                self.calculators
                    .evaluate(function, &evaluated)
                    .unwrap_or_else(|| FactValue::Str(format!("<calc_error:{function}>")))
            }
        }
    }

    fn invoke_call(
        &mut self,
        module: &str,
        function: &str,
        args: &[TemplateValue],
        activation: &Activation,
    ) -> std::result::Result<(), String> {
        let key = (module.to_string(), function.to_string());
        let Some(callback) = self.callbacks.get(&key).copied() else {
            return Err(format!("no callback registered for `{module}.{function}`"));
        };
        let bindings = activation.token.bindings().clone();
        let rendered_args: Vec<FactValue> = args.iter().map(|v| self.substitute_value(v, &bindings)).collect();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(&bindings, &rendered_args)));
        match outcome {
            Ok(Ok(values)) => {
                self.tracer.record(
                    TraceEventKind::Fire,
                    format!("{module}.{function}"),
                    serde_json::json!({"call_result": values.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>()}),
                    None,
                );
                Ok(())
            }
            Ok(Err(message)) => Err(message),
            Err(_) => Err(format!("callback `{module}.{function}` panicked")),
        }
    }

    /// Propagate a newly-asserted (or re-asserted) fact into every alpha
    /// node whose test chain it passes, then recursively into downstream
    /// beta joins and production nodes.
    fn on_fact_asserted(&mut self, record: &Record) {
        let alpha_ids: Vec<NodeId> = self.network.alpha_entry_points(record.fact_type()).to_vec();
        for alpha_id in alpha_ids {
            let Some(alpha_node) = self.network.get_alpha_node(alpha_id).cloned() else { continue };
            if alpha::passes(&alpha_node, record, &self.predicates) {
                self.alpha_memories
                    .get_mut(&alpha_id)
                    .expect("alpha memory must exist for every compiled alpha node")
                    .insert(record);
                self.tracer.record(
                    TraceEventKind::AlphaMatch,
                    format!("{}", alpha_id.0),
                    serde_json::json!({"fact_id": record.id().as_str()}),
                    None,
                );
                let bindings = alpha::extract_bindings(&alpha_node, record);
                let token = Token::root(record.id().clone(), bindings);
                self.propagate_from_alpha(alpha_id, record.id().clone(), &token);
            }
        }
    }

    fn propagate_from_alpha(&mut self, alpha_id: NodeId, fact_id: FactId, token: &Token) {
        let children: Vec<NodeId> = self.network.children(alpha_id).to_vec();
        for child_id in children {
            let Some(node) = self.network.node(child_id).cloned() else { continue };
            match node {
                Node::Production(prod) => self.build_activation(&prod, token.clone()),
                Node::Beta(beta) if beta.left_parent == alpha_id => {
                    for candidate_id in self.join_candidates(beta.right_alpha, &beta.join_keys, token.bindings()) {
                        let Some(record) = self.working_memory.get(&candidate_id).cloned() else { continue };
                        let Some(right_alpha) = self.network.get_alpha_node(beta.right_alpha).cloned() else { continue };
                        let right_bindings = alpha::extract_bindings(&right_alpha, &record);
                        if join_compatible(token.bindings(), &right_bindings, &beta.join_keys) {
                            let new_token = token.extend(right_bindings, candidate_id);
                            self.insert_beta_token(beta.id, new_token.clone());
                            self.propagate_from_beta(beta.id, &new_token);
                        }
                    }
                }
                Node::Beta(beta) => {
                    for left_token in self.left_input_tokens(beta.left_parent, &beta.join_keys, token.bindings()) {
                        if join_compatible(left_token.bindings(), token.bindings(), &beta.join_keys) {
                            let new_token = left_token.extend(token.bindings().clone(), fact_id.clone());
                            self.insert_beta_token(beta.id, new_token.clone());
                            self.propagate_from_beta(beta.id, &new_token);
                        }
                    }
                }
                Node::Alpha(_) => {}
            }
        }
    }

    fn propagate_from_beta(&mut self, beta_id: NodeId, token: &Token) {
        let children: Vec<NodeId> = self.network.children(beta_id).to_vec();
        for child_id in children {
            let Some(node) = self.network.node(child_id).cloned() else { continue };
            match node {
                Node::Production(prod) => self.build_activation(&prod, token.clone()),
                Node::Beta(beta) => {
                    for candidate_id in self.join_candidates(beta.right_alpha, &beta.join_keys, token.bindings()) {
                        let Some(record) = self.working_memory.get(&candidate_id).cloned() else { continue };
                        let Some(right_alpha) = self.network.get_alpha_node(beta.right_alpha).cloned() else { continue };
                        let right_bindings = alpha::extract_bindings(&right_alpha, &record);
                        if join_compatible(token.bindings(), &right_bindings, &beta.join_keys) {
                            let new_token = token.extend(right_bindings, candidate_id);
                            self.insert_beta_token(beta.id, new_token.clone());
                            self.propagate_from_beta(beta.id, &new_token);
                        }
                    }
                }
                Node::Alpha(_) => {}
            }
        }
    }

    fn build_activation(&mut self, prod: &ProductionNode, token: Token) {
        let now = Utc::now();
        let activation = Activation::new(prod.production_id.clone(), token, prod.salience, now);
        let key = activation.refraction_key();
        if self.refraction.would_refract(&key, now) {
            self.tracer.record(
                TraceEventKind::Refraction,
                prod.production_id.clone(),
                serde_json::json!({"decision": "refract", "phase": "activation"}),
                None,
            );
            return;
        }
        self.tracer.record(
            TraceEventKind::Activation,
            prod.production_id.clone(),
            serde_json::json!({"token_signature": activation.token.signature().as_str()}),
            None,
        );
        self.agenda.add(activation);
    }

    /// Tokens available on a join's left input, restricted (where an
    /// index exists) to ones compatible with `right_bindings` on
    /// `join_keys`. Used when a fact on the *right* side of a join
    /// arrives and the left side (an alpha or a deeper beta memory) has
    /// to be searched for matches.
    fn left_input_tokens(&self, node_id: NodeId, join_keys: &[String], right_bindings: &BTreeMap<String, FactValue>) -> Vec<Token> {
        match self.network.node(node_id) {
            Some(Node::Alpha(alpha_node)) => {
                let Some(mem) = self.alpha_memories.get(&node_id) else { return Vec::new() };
                mem.ids()
                    .filter_map(|id| {
                        self.working_memory.get(id).map(|record| {
                            let bindings = alpha::extract_bindings(alpha_node, record);
                            Token::root(id.clone(), bindings)
                        })
                    })
                    .collect()
            }
            Some(Node::Beta(_)) => self
                .beta_memories
                .get(&node_id)
                .map(|mem| mem.matching(join_keys, right_bindings).into_iter().cloned().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Candidate fact ids on a join's right alpha memory. When every join
    /// key resolves to an indexed field on the right alpha node, uses the
    /// field index and intersects; otherwise falls back to a full scan
    /// filtered by [`join_compatible`].
    fn join_candidates(&self, right_alpha_id: NodeId, join_keys: &[String], left_bindings: &BTreeMap<String, FactValue>) -> Vec<FactId> {
        let Some(alpha_node) = self.network.get_alpha_node(right_alpha_id) else { return Vec::new() };
        let Some(mem) = self.alpha_memories.get(&right_alpha_id) else { return Vec::new() };

        if join_keys.is_empty() {
            return mem.ids().cloned().collect();
        }

        let mut indexed_sets: Vec<&HashSet<FactId>> = Vec::with_capacity(join_keys.len());
        let mut indexable = true;
        for key in join_keys {
            match (alpha_node.field_for_binding(key), left_bindings.get(key)) {
                (Some(field), Some(value)) => match mem.ids_with_field_value(field, value) {
                    Some(set) => indexed_sets.push(set),
                    None => return Vec::new(),
                },
                _ => {
                    indexable = false;
                    break;
                }
            }
        }

        if indexable && !indexed_sets.is_empty() {
            let mut sets = indexed_sets.into_iter();
            let first: HashSet<FactId> = sets.next().cloned().unwrap_or_default();
            return sets.fold(first, |acc, set| acc.intersection(set).cloned().collect()).into_iter().collect();
        }

        mem.ids()
            .filter(|id| {
                self.working_memory
                    .get(id)
                    .map(|record| {
                        let right_bindings = alpha::extract_bindings(alpha_node, record);
                        join_compatible(left_bindings, &right_bindings, join_keys)
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn insert_beta_token(&mut self, beta_id: NodeId, token: Token) {
        let fact_ids: Vec<String> = token.fact_ids().iter().map(|f| f.as_str().to_string()).collect();
        if let Some(mem) = self.beta_memories.get_mut(&beta_id) {
            mem.insert(token);
            self.tracer.record(
                TraceEventKind::BetaJoin,
                format!("{}", beta_id.0),
                serde_json::json!({"fact_ids": fact_ids}),
                None,
            );
        }
    }

    fn retract_one(&mut self, id: &FactId) -> Option<Record> {
        let record = self.working_memory.remove(id)?;
        for mem in self.alpha_memories.values_mut() {
            mem.remove(&record);
        }
        for mem in self.beta_memories.values_mut() {
            mem.remove_containing(id);
        }
        let removed = self.agenda.remove_matching(|a| a.contains_fact(id));
        for activation in &removed {
            self.tracer.record(
                TraceEventKind::Retract,
                activation.production_id.clone(),
                serde_json::json!({"fact_id": id.as_str(), "reason": "dependency_retracted"}),
                None,
            );
        }
        self.tracer.record(
            TraceEventKind::Retract,
            id.as_str().to_string(),
            serde_json::json!({"cancelled_activations": removed.len()}),
            None,
        );
        Some(record)
    }

    fn maybe_evict(&mut self) -> Result<()> {
        self.ops_since_memory_check += 1;
        let Some(limit) = self.options.memory_limit else {
            return Ok(());
        };
        if !memory_manager::should_check(self.ops_since_memory_check, &limit) {
            return Ok(());
        }
        self.ops_since_memory_check = 0;

        let usage = UsageEstimate {
            working_memory_bytes: self.working_memory.estimated_bytes(),
            agenda_bytes: self.agenda.size() * ESTIMATED_ACTIVATION_BYTES,
            refraction_bytes: 0,
        };
        let fact_count = self.working_memory.len();
        let count = memory_manager::suggested_eviction_count(&usage, &limit, fact_count);
        if count == 0 {
            return Ok(());
        }

        let candidates = match limit.policy {
            EvictionPolicy::Lru => self.working_memory.ids_by_insertion_order().to_vec(),
            EvictionPolicy::Oldest | EvictionPolicy::Random => self.working_memory.ids_sorted(),
        };
        let victims = memory_manager::select_victims(limit.policy, candidates, count);
        let evicted = victims.len();
        for id in &victims {
            self.retract_one(id);
        }

        info!(
            "memory eviction for tenant `{}`: removed {evicted} fact(s) under `{:?}` policy",
            self.tenant_key, limit.policy
        );

        let usage_after = UsageEstimate {
            working_memory_bytes: self.working_memory.estimated_bytes(),
            agenda_bytes: self.agenda.size() * ESTIMATED_ACTIVATION_BYTES,
            refraction_bytes: 0,
        };
        if usage_after.total() > limit.bytes {
            return Err(EngineError::MemoryLimitExceeded);
        }
        Ok(())
    }
}

/// Two sets of bindings agree on every name in `join_keys` (and both
/// actually carry every key — a missing key fails the join rather than
/// vacuously passing it).
fn join_compatible(left: &BTreeMap<String, FactValue>, right: &BTreeMap<String, FactValue>, join_keys: &[String]) -> bool {
    join_keys.iter().all(|key| match (left.get(key), right.get(key)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    })
}

/// For every beta node, whether its left input is itself a beta node
/// (rather than an alpha node) and, if so, which join-key combination it
/// will be queried by. Computed once from the immutable network so
/// `Engine::new` and `Engine::reset` register the same indexes in the
/// same way.
fn compute_beta_combo_requirements(network: &Network) -> HashMap<NodeId, Vec<Vec<String>>> {
    let mut requirements: HashMap<NodeId, Vec<Vec<String>>> = HashMap::new();
    for beta in network.beta_nodes() {
        if let Some(Node::Beta(_)) = network.node(beta.left_parent) {
            requirements.entry(beta.left_parent).or_default().push(beta.join_keys.clone());
        }
    }
    requirements
}

/// Start a tenant: construct an engine against `network` and register it
/// under `key` in the process-wide tenant registry. Errors if `key` is
/// already running.
pub fn start_tenant(
    key: impl Into<String>,
    network: Arc<Network>,
    options: EngineOptions,
) -> std::result::Result<Arc<std::sync::Mutex<Engine>>, RegistryError> {
    let key = key.into();
    let engine = Engine::new(key.clone(), network, options);
    Registries::global().tenants.start(key, engine)
}

pub fn stop_tenant(key: &str) -> std::result::Result<(), RegistryError> {
    Registries::global().tenants.stop(key)
}

pub fn tenant_handle(key: &str) -> Option<Arc<std::sync::Mutex<Engine>>> {
    Registries::global().tenants.get(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::ReturnType;
    use crate::memory_manager::EvictionPolicy;
    use crate::network::{AlphaTest, NetworkBuilder};
    use crate::predicate::Operator;

    fn threshold_network() -> Arc<Network> {
        let mut builder = NetworkBuilder::new();
        let alpha = builder.add_alpha(
            "Employee",
            vec![AlphaTest { field: "hours".into(), op: Operator::Gt, literal: FactValue::Int(40) }],
            vec![("id".into(), "E".into()), ("hours".into(), "H".into())],
        );
        builder.add_production(
            alpha,
            "overtime_rule",
            0,
            vec![Action::Emit {
                template: FactTemplate::new("Overtime")
                    .with_field("employee_id", TemplateValue::Binding("E".into()))
                    .with_field(
                        "extra_hours",
                        TemplateValue::Calc {
                            function: "subtract".into(),
                            args: vec![TemplateValue::Binding("H".into()), TemplateValue::Literal(FactValue::Int(40))],
                        },
                    ),
            }],
        );
        Arc::new(builder.build())
    }

    #[test]
    fn threshold_rule_fires_once_and_refracts_on_second_run() {
        let mut engine = Engine::new("acme", threshold_network(), EngineOptions::default());
        let assert_opts = AssertOptions::default();
        engine
            .assert(vec![Record::new("e1", "Employee").with_field("hours", 45i64)], &assert_opts)
            .unwrap();

        let run_opts = RunOptions { fire_limit: Some(10), ..Default::default() };
        let outputs = engine.run(&run_opts).unwrap();
        assert_eq!(outputs.fired.len(), 1);
        assert_eq!(outputs.derived.len(), 1);
        assert_eq!(outputs.derived[0].record.fact_type(), "Overtime");
        assert_eq!(outputs.derived[0].record.field("extra_hours"), Some(&FactValue::Decimal(5.0)));
        assert_eq!(outputs.derived[0].provenance.production_id, "overtime_rule");

        let second = engine.run(&run_opts).unwrap();
        assert_eq!(second.fired.len(), 0);
    }

    #[test]
    fn retract_before_run_cancels_activation() {
        let mut engine = Engine::new("acme", threshold_network(), EngineOptions::default());
        let assert_opts = AssertOptions::default();
        engine
            .assert(vec![Record::new("e2", "Employee").with_field("hours", 50i64)], &assert_opts)
            .unwrap();
        engine.retract(&[FactId::new("e2")], &assert_opts).unwrap();

        let outputs = engine.run(&RunOptions::default()).unwrap();
        assert_eq!(outputs.fired.len(), 0);
        assert!(outputs.derived.is_empty());
    }

    #[test]
    fn duplicate_assertion_is_rejected() {
        let mut engine = Engine::new("acme", threshold_network(), EngineOptions::default());
        let opts = AssertOptions::default();
        engine.assert(vec![Record::new("e1", "Employee").with_field("hours", 10i64)], &opts).unwrap();
        let err = engine
            .assert(vec![Record::new("e1", "Employee").with_field("hours", 10i64)], &opts)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidFact(_)));
    }

    #[test]
    fn modify_of_unknown_id_behaves_as_assert() {
        let mut engine = Engine::new("acme", threshold_network(), EngineOptions::default());
        let opts = AssertOptions::default();
        let outputs = engine
            .modify(vec![Record::new("e9", "Employee").with_field("hours", 50i64)], &opts)
            .unwrap();
        assert!(outputs.retracted.is_empty());
        assert_eq!(engine.agenda_size(), 1);
    }

    fn join_network() -> Arc<Network> {
        let mut builder = NetworkBuilder::new();
        let manager_alpha = builder.add_alpha(
            "Employee",
            vec![AlphaTest { field: "tier".into(), op: Operator::Eq, literal: FactValue::Str("exec".into()) }],
            vec![("id".into(), "M".into())],
        );
        let employee_alpha = builder.add_alpha(
            "Employee",
            vec![],
            vec![("manager_id".into(), "M".into()), ("id".into(), "E".into())],
        );
        let join = builder.add_beta(manager_alpha, employee_alpha, vec!["M".into()]);
        builder.add_production(join, "reports_to_exec", 0, vec![Action::Log { level: "info".into(), message: "match".into() }]);
        Arc::new(builder.build())
    }

    #[test]
    fn join_produces_one_activation_regardless_of_assertion_order() {
        let mut engine = Engine::new("acme", join_network(), EngineOptions::default());
        let opts = AssertOptions::default();
        engine.assert(vec![Record::new("m1", "Employee").with_field("tier", "exec")], &opts).unwrap();
        engine
            .assert(vec![Record::new("e1", "Employee").with_field("manager_id", "m1")], &opts)
            .unwrap();

        assert_eq!(engine.agenda_size(), 1);
    }

    #[test]
    fn join_is_order_independent() {
        let opts = AssertOptions::default();

        let mut forward = Engine::new("acme", join_network(), EngineOptions::default());
        forward.assert(vec![Record::new("m1", "Employee").with_field("tier", "exec")], &opts).unwrap();
        forward
            .assert(vec![Record::new("e1", "Employee").with_field("manager_id", "m1")], &opts)
            .unwrap();

        let mut reverse = Engine::new("acme", join_network(), EngineOptions::default());
        reverse
            .assert(vec![Record::new("e1", "Employee").with_field("manager_id", "m1")], &opts)
            .unwrap();
        reverse.assert(vec![Record::new("m1", "Employee").with_field("tier", "exec")], &opts).unwrap();

        assert_eq!(forward.agenda_size(), reverse.agenda_size());
        assert_eq!(forward.agenda_size(), 1);
    }

    #[test]
    fn reset_clears_all_state_but_keeps_network() {
        let network = threshold_network();
        let mut engine = Engine::new("acme", network.clone(), EngineOptions::default());
        engine
            .assert(vec![Record::new("e1", "Employee").with_field("hours", 45i64)], &AssertOptions::default())
            .unwrap();
        engine.reset();
        assert!(engine.is_working_memory_empty());
        assert!(engine.is_agenda_empty());
        assert_eq!(engine.network_version(), network.version());
    }

    #[test]
    fn snapshot_then_restore_replays_working_memory() {
        let mut engine = Engine::new("acme", threshold_network(), EngineOptions::default());
        engine
            .assert(vec![Record::new("e1", "Employee").with_field("hours", 45i64)], &AssertOptions::default())
            .unwrap();
        let snapshot = engine.snapshot();

        let mut fresh = Engine::new("acme", threshold_network(), EngineOptions::default());
        fresh.restore(&snapshot).unwrap();
        assert_eq!(fresh.working_memory_len(), 1);
        assert_eq!(fresh.agenda_size(), 1);
    }

    #[test]
    fn restore_rejects_a_snapshot_from_a_different_network() {
        let mut engine = Engine::new("acme", threshold_network(), EngineOptions::default());
        let snapshot = engine.snapshot();
        let mut other = Engine::new("acme", join_network(), EngineOptions::default());
        assert!(other.restore(&snapshot).is_err());
        let _ = &mut engine;
    }

    #[test]
    fn call_action_invokes_registered_callback() {
        fn echo(_bindings: &BTreeMap<String, FactValue>, args: &[FactValue]) -> std::result::Result<Vec<FactValue>, String> {
            Ok(args.to_vec())
        }

        let mut builder = NetworkBuilder::new();
        let alpha = builder.add_alpha("Alert", vec![], vec![("id".into(), "A".into())]);
        builder.add_production(
            alpha,
            "notify",
            0,
            vec![Action::Call {
                module: "notifier".into(),
                function: "send".into(),
                args: vec![TemplateValue::Binding("A".into())],
            }],
        );
        let network = Arc::new(builder.build());

        let mut engine = Engine::new("acme", network, EngineOptions::default());
        engine.register_callback("notifier", "send", echo);
        engine.assert(vec![Record::new("a1", "Alert")], &AssertOptions::default()).unwrap();
        let outputs = engine.run(&RunOptions::default()).unwrap();
        assert_eq!(outputs.fired.len(), 1);
        assert!(outputs.errors.is_empty());
    }

    #[test]
    fn call_action_without_a_registered_callback_is_collected_as_an_error() {
        let mut builder = NetworkBuilder::new();
        let alpha = builder.add_alpha("Alert", vec![], vec![]);
        builder.add_production(
            alpha,
            "notify",
            0,
            vec![Action::Call { module: "notifier".into(), function: "send".into(), args: vec![] }],
        );
        let network = Arc::new(builder.build());

        let mut engine = Engine::new("acme", network, EngineOptions::default());
        engine.assert(vec![Record::new("a1", "Alert")], &AssertOptions::default()).unwrap();
        let outputs = engine.run(&RunOptions::default()).unwrap();
        assert_eq!(outputs.fired.len(), 1);
        assert_eq!(outputs.errors.len(), 1);
    }

    #[test]
    fn unknown_action_kind_is_collected_as_an_error_without_halting_siblings() {
        let mut builder = NetworkBuilder::new();
        let alpha = builder.add_alpha("Alert", vec![], vec![]);
        builder.add_production(
            alpha,
            "notify",
            0,
            vec![
                Action::Unknown { kind: "page_oncall".into() },
                Action::Log { level: "info".into(), message: "still ran".into() },
            ],
        );
        let network = Arc::new(builder.build());

        let mut engine = Engine::new("acme", network, EngineOptions::default());
        engine.assert(vec![Record::new("a1", "Alert")], &AssertOptions::default()).unwrap();
        let outputs = engine.run(&RunOptions::default()).unwrap();
        assert_eq!(outputs.fired.len(), 1);
        assert_eq!(outputs.errors.len(), 1);
        assert!(matches!(
            &outputs.errors[0],
            EngineError::UnknownAction { kind, .. } if kind == "page_oncall"
        ));
    }

    #[test]
    fn unrecognized_policy_tag_falls_back_to_default_and_warns_via_first_output() {
        let opts = EngineOptions::new().with_agenda_policy_tag("not_a_real_policy");
        let mut engine = Engine::new("acme", threshold_network(), opts);
        let outputs = engine.assert(vec![Record::new("e1", "Employee").with_field("hours", FactValue::Int(10))], &AssertOptions::default()).unwrap();
        assert_eq!(outputs.errors.len(), 1);
        assert!(matches!(
            &outputs.errors[0],
            EngineError::UnknownPolicy { kind: "agenda", .. }
        ));

        // The warning fires only once, on the first command.
        let outputs = engine.assert(vec![Record::new("e2", "Employee").with_field("hours", FactValue::Int(10))], &AssertOptions::default()).unwrap();
        assert!(outputs.errors.is_empty());
    }

    #[test]
    fn memory_eviction_reduces_working_set_under_limit() {
        let opts = EngineOptions::new().with_memory_limit(500, 1, EvictionPolicy::Lru);
        let mut engine = Engine::new("acme", threshold_network(), opts);
        for i in 0..50 {
            let _ = engine.assert(
                vec![Record::new(format!("e{i}"), "Employee").with_field("hours", 10i64)],
                &AssertOptions::default(),
            );
        }
        assert!(engine.working_memory_len() < 50);
    }

    #[test]
    fn unknown_calculator_function_in_an_emit_template_is_a_sentinel_not_a_panic() {
        let mut builder = NetworkBuilder::new();
        let alpha = builder.add_alpha("Alert", vec![], vec![("id".into(), "A".into())]);
        builder.add_production(
            alpha,
            "bad_calc",
            0,
            vec![Action::Emit {
                template: FactTemplate::new("Derived").with_field(
                    "value",
                    TemplateValue::Calc { function: "frobnicate".into(), args: vec![TemplateValue::Binding("A".into())] },
                ),
            }],
        );
        let network = Arc::new(builder.build());

        let mut engine = Engine::new("acme", network, EngineOptions::default());
        engine.assert(vec![Record::new("a1", "Alert")], &AssertOptions::default()).unwrap();
        let outputs = engine.run(&RunOptions::default()).unwrap();
        assert_eq!(outputs.derived.len(), 1);
        assert_eq!(outputs.derived[0].record.field("value"), Some(&FactValue::Str("<calc_error:frobnicate>".into())));
    }

    #[test]
    fn register_calculator_is_usable_from_an_emit_template() {
        let mut builder = NetworkBuilder::new();
        let alpha = builder.add_alpha("Alert", vec![], vec![("id".into(), "A".into())]);
        builder.add_production(
            alpha,
            "custom_calc",
            0,
            vec![Action::Emit {
                template: FactTemplate::new("Derived").with_field(
                    "doubled",
                    TemplateValue::Calc { function: "double".into(), args: vec![TemplateValue::Literal(FactValue::Int(21))] },
                ),
            }],
        );
        let network = Arc::new(builder.build());

        let mut engine = Engine::new("acme", network, EngineOptions::default());
        engine.register_calculator("double", 1, ReturnType::Decimal, |args| Some(FactValue::Decimal(args[0].as_decimal()? * 2.0)));
        engine.assert(vec![Record::new("a1", "Alert")], &AssertOptions::default()).unwrap();
        let outputs = engine.run(&RunOptions::default()).unwrap();
        assert_eq!(outputs.derived[0].record.field("doubled"), Some(&FactValue::Decimal(42.0)));
    }
}
