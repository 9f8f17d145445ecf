//! Process-wide, read-mostly registries: the tenant registry (tenant key
//! to running engine handle) and the pluggable-policy registries for
//! agenda ordering, refraction, predicates, and calculators.
//!
//! All four are shared across tenants and must be safe for concurrent
//! readers; registration (starting a tenant, adding a custom predicate)
//! is comparatively rare, so each is guarded by a plain `RwLock` rather
//! than anything lock-free.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::Lazy;

use crate::agenda::AgendaPolicy;
use crate::calculator::CalculatorRegistry;
use crate::engine::Engine;
use crate::predicate::PredicateRegistry;
use crate::refraction::RefractionPolicy;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("tenant `{0}` is already running")]
    TenantAlreadyStarted(String),
    #[error("tenant `{0}` not found")]
    TenantNotFound(String),
}

/// Maps a user-supplied tenant key to its running engine handle. Lookup is
/// O(1); starting a tenant under a key that is already running is an
/// error rather than a silent replace, since that would orphan whatever
/// state the previous engine held.
#[derive(Default)]
pub struct TenantRegistry {
    tenants: RwLock<HashMap<String, Arc<Mutex<Engine>>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, key: impl Into<String>, engine: Engine) -> Result<Arc<Mutex<Engine>>, RegistryError> {
        let key = key.into();
        let mut tenants = self.tenants.write().expect("tenant registry lock poisoned");
        if tenants.contains_key(&key) {
            return Err(RegistryError::TenantAlreadyStarted(key));
        }
        let handle = Arc::new(Mutex::new(engine));
        tenants.insert(key, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, key: &str) -> Option<Arc<Mutex<Engine>>> {
        self.tenants.read().expect("tenant registry lock poisoned").get(key).cloned()
    }

    pub fn stop(&self, key: &str) -> Result<(), RegistryError> {
        let mut tenants = self.tenants.write().expect("tenant registry lock poisoned");
        tenants.remove(key).map(|_| ()).ok_or_else(|| RegistryError::TenantNotFound(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tenants.read().expect("tenant registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tag to custom-policy mapping, for agenda/refraction policies supplied
/// beyond the four built-in tags of each kind.
#[derive(Default)]
pub struct CustomPolicyRegistry<P: ?Sized> {
    entries: RwLock<HashMap<String, Arc<P>>>,
}

impl<P: ?Sized> CustomPolicyRegistry<P> {
    pub fn new() -> Self {
        CustomPolicyRegistry { entries: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, tag: impl Into<String>, policy: Arc<P>) {
        self.entries.write().expect("policy registry lock poisoned").insert(tag.into(), policy);
    }

    pub fn get(&self, tag: &str) -> Option<Arc<P>> {
        self.entries.read().expect("policy registry lock poisoned").get(tag).cloned()
    }
}

/// Bundles the four process-wide registries behind a single
/// lazily-initialized static, matching how read-mostly global state is
/// conventionally exposed in this ecosystem.
pub struct Registries {
    pub tenants: TenantRegistry,
    pub predicates: RwLock<PredicateRegistry>,
    pub calculators: RwLock<CalculatorRegistry>,
    pub agenda_policies: CustomPolicyRegistry<dyn AgendaPolicy>,
    pub refraction_policies: CustomPolicyRegistry<dyn RefractionPolicy>,
}

impl Registries {
    fn new() -> Self {
        Registries {
            tenants: TenantRegistry::new(),
            predicates: RwLock::new(PredicateRegistry::new()),
            calculators: RwLock::new(CalculatorRegistry::new()),
            agenda_policies: CustomPolicyRegistry::new(),
            refraction_policies: CustomPolicyRegistry::new(),
        }
    }

    pub fn global() -> &'static Registries {
        static INSTANCE: Lazy<Registries> = Lazy::new(Registries::new);
        &INSTANCE
    }
}
