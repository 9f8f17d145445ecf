//! Per-tenant engine configuration. There is no external config-file
//! format in scope — front-ends (CLI, wire protocols) are out of scope —
//! so this is a plain, programmatically constructed, builder-style
//! struct, matching the rest of this workspace's configuration surface.

use log::warn;

use crate::agenda::AgendaPolicyKind;
use crate::error::EngineError;
use crate::memory_manager::{EvictionPolicy, MemoryLimit};
use crate::refraction::RefractionPolicyKind;

/// Options supplied to `Engine::start_tenant`. Cloned into the engine at
/// construction; `reset()` preserves these untouched.
#[derive(Clone)]
pub struct EngineOptions {
    pub default_fire_limit: usize,
    pub memory_limit: Option<MemoryLimit>,
    pub agenda_policy: AgendaPolicyKind,
    pub refraction_policy: RefractionPolicyKind,
    pub tracer_max_events: usize,
    pub tracer_enabled: bool,
    /// `unknown_policy` warnings raised by `with_agenda_policy_tag`/
    /// `with_refraction_policy_tag` at build time. Drained into the first
    /// command's outputs once the engine is constructed; see
    /// `Engine::drain_startup_warnings`.
    pub(crate) pending_warnings: Vec<EngineError>,
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptions")
            .field("default_fire_limit", &self.default_fire_limit)
            .field("memory_limit", &self.memory_limit.map(|l| l.bytes))
            .field("agenda_policy", &self.agenda_policy.tag())
            .field("refraction_policy", &self.refraction_policy.tag())
            .field("tracer_max_events", &self.tracer_max_events)
            .field("tracer_enabled", &self.tracer_enabled)
            .field("pending_warnings", &self.pending_warnings.len())
            .finish()
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            default_fire_limit: 1000,
            memory_limit: None,
            agenda_policy: AgendaPolicyKind::Default,
            refraction_policy: RefractionPolicyKind::Default,
            tracer_max_events: 1000,
            tracer_enabled: false,
            pending_warnings: Vec::new(),
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fire_limit(mut self, fire_limit: usize) -> Self {
        self.default_fire_limit = fire_limit;
        self
    }

    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize, check_interval: u64, policy: EvictionPolicy) -> Self {
        self.memory_limit = Some(MemoryLimit { bytes, check_interval, policy });
        self
    }

    #[must_use]
    pub fn with_agenda_policy(mut self, policy: AgendaPolicyKind) -> Self {
        self.agenda_policy = policy;
        self
    }

    #[must_use]
    pub fn with_refraction_policy(mut self, policy: RefractionPolicyKind) -> Self {
        self.refraction_policy = policy;
        self
    }

    /// Select the agenda policy by tag, consulting the four built-ins and
    /// then the process-wide custom-policy registry (populated via
    /// [`crate::agenda::register_custom_policy`]). An unrecognized tag falls
    /// back to [`AgendaPolicyKind::Default`]; the resulting `unknown_policy`
    /// warning is surfaced on the first command issued against the engine
    /// built from these options.
    #[must_use]
    pub fn with_agenda_policy_tag(mut self, tag: impl AsRef<str>) -> Self {
        let (kind, warning) = AgendaPolicyKind::resolve_tag(tag.as_ref());
        self.agenda_policy = kind;
        if let Some(warning) = warning {
            warn!("{warning}");
            self.pending_warnings.push(warning);
        }
        self
    }

    /// Select the refraction policy by tag; see
    /// [`EngineOptions::with_agenda_policy_tag`] for the fallback behavior.
    #[must_use]
    pub fn with_refraction_policy_tag(mut self, tag: impl AsRef<str>) -> Self {
        let (kind, warning) = RefractionPolicyKind::resolve_tag(tag.as_ref());
        self.refraction_policy = kind;
        if let Some(warning) = warning {
            warn!("{warning}");
            self.pending_warnings.push(warning);
        }
        self
    }

    #[must_use]
    pub fn with_tracer(mut self, max_events: usize) -> Self {
        self.tracer_enabled = true;
        self.tracer_max_events = max_events;
        self
    }
}
