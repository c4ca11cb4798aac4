//! Shared types, adapter traits, and core utilities for the fleetsched engine.
//!
//! This crate holds everything the engine and its adapters must agree on: the
//! error taxonomy, identifiers, the collaborator traits (tenant directory,
//! settings store, work-queue backend), domain events and the tenant context.
//! Adapter crates depend only on this crate, never on the engine itself.

pub mod context;
pub mod error;
pub mod events;
pub mod prelude;
pub mod queue_adapter;
pub mod settings_adapter;
pub mod tenant_adapter;
pub mod types;

// vim: ts=4
