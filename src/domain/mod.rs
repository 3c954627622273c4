//! Core domain types and logic.

pub mod error;
pub mod diagnostics;
pub mod observation;
pub mod price_panel;
pub mod stats;
pub mod ic;
pub mod walk_forward;
pub mod combiner;
pub mod selector;
pub mod portfolio;
pub mod execution;
pub mod simulator;
pub mod performance;
pub mod engine_config;
pub mod cache;
pub mod orchestrator;
