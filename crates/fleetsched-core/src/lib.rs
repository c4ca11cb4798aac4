//! Tenant-aware scheduling engine.
//!
//! Resolves effective per-tenant job configuration from layered overrides and
//! keeps a work-queue backend's repeatable jobs consistent with it.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod app;
pub mod bus;
pub mod config;
pub mod listener;
pub mod memory;
pub mod prelude;
pub mod registry;
pub mod resolver;
pub mod schedule;
pub mod settings;

pub use app::{Engine, EngineBuilder, EngineState};

// vim: ts=4
