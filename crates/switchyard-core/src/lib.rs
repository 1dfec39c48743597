//! Orchestration logic for Switchyard.
//!
//! This crate defines the `ProviderAdapter` port that the infrastructure layer
//! implements, plus everything that decides where a generation request goes:
//! health tracking, cost accounting, response caching, context fusion,
//! routing and the orchestrator facade. It depends only on `switchyard-types`
//! -- never on `switchyard-infra` or any HTTP crate.

pub mod cache;
pub mod context;
pub mod ledger;
pub mod llm;
pub mod orchestrator;

pub use orchestrator::{GenerationStream, Orchestrator, OrchestratorBuilder};
