//! Shared domain types for Switchyard.
//!
//! This crate contains the data shapes exchanged between the orchestration
//! core, its provider adapters, and its callers: generation requests and
//! responses, provider configuration, health and cost snapshots, and the
//! error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod cost;
pub mod error;
pub mod health;
pub mod provider;
pub mod request;
