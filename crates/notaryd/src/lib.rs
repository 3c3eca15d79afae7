//! Cross-coordinator buyer reputation notary daemon.
//!
//! See [`config`] for the environment-sourced configuration surface and
//! [`service::Supervisor`] for the entry point that wires every component
//! together.

pub mod badge;
pub mod classifier;
pub mod config;
pub mod kinds;
pub mod link;
pub mod receipt;
pub mod report;
pub mod service;
pub mod stats;
pub mod store;
