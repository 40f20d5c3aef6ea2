//! Configuration types for the withdraw service.
//!
//! This crate provides:
//! - Ledger, chain, polling and metrics sections
//! - Defaults matching the production poll cadence
//! - Loading from TOML and validation

pub mod service;

pub use service::{
    ChainConfig, ConfigError, LedgerConfig, MetricsConfig, PollConfig, ServiceConfig,
};
