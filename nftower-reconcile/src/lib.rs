#![recursion_limit = "256"]
//! Reconciliation of a Tower organization against the desired projects.
//!
//! Every entity module exposes idempotent `ensure`/`reconcile` operations
//! over a [`nftower_gateway::Gateway`]; the [`Engine`] sequences them per
//! project and collects a [`RunReport`].

pub mod compute_env;
pub mod credentials;
pub mod engine;
pub mod labels;
pub mod members;
pub mod organization;
pub mod participants;
pub mod policy;
pub mod report;
pub mod teams;
pub mod wire;
pub mod workspace;

pub use engine::Engine;
pub use policy::{compute_env_name, ComputeEnvironmentPolicy, EnvironmentInputs, PricingModel};
pub use report::{ProjectOutcome, RunReport, Tally};
