//! A multi-tenant forward-chaining production-rule engine built on the
//! RETE algorithm.
//!
//! Each tenant owns an independent [`engine::Engine`] instance: its own
//! working memory, alpha/beta node memories, agenda, and refraction
//! store, compiled once against an immutable [`network::Network`] and
//! shared only through the process-wide, read-mostly registries in
//! [`registry`]. There is no cross-tenant state beyond those registries.
//!
//! A typical embedding:
//!
//! ```ignore
//! use rete_core::{config::EngineOptions, engine, network::NetworkBuilder};
//!
//! let network = std::sync::Arc::new(NetworkBuilder::new().build());
//! let handle = engine::start_tenant("acme", network, EngineOptions::default())?;
//! let mut acme = handle.lock().unwrap();
//! acme.assert(vec![/* facts */], &Default::default())?;
//! acme.run(&Default::default())?;
//! ```

pub mod action;
pub mod agenda;
pub mod alpha;
pub mod beta;
pub mod calculator;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory_manager;
pub mod network;
pub mod predicate;
pub mod refraction;
pub mod registry;
pub mod token;
pub mod tracer;
pub mod working_memory;

pub use action::{Action, FactTemplate, TemplateValue};
pub use config::EngineOptions;
pub use engine::{ActivationSummary, AssertOptions, CallbackFn, Engine, EngineSnapshot, Outputs, ReturnFilter, RunOptions, StepOutcome};
pub use error::{EngineError, Result};
pub use network::{Network, NetworkBuilder, NodeId};
pub use registry::Registries;

#[cfg(feature = "derive")]
pub use rete_core_derive::Fact;
