//! factorwalk: walk-forward evaluation of multi-factor stock selection.
//!
//! Factor signals are scored by rank information coefficient and combined
//! under several weighting policies. Each combined ranking drives a
//! cost-aware portfolio simulation over rolling train/test periods.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
