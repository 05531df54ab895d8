//! # zktier
//!
//! Test-harness building blocks for zkEVM rollups. The `zktier-core` crate resolves networks to
//! their protocol parameters and follows submitted transactions through the rollup finality tiers
//! (pooled, mined, virtualized, consolidated). Refer to the `zktier` crate for the command line
//! front-end.

/// Error types.
pub mod errors;
pub use errors::{Error, InitializationError, Result};

/// Embedded and dynamically loaded network descriptors.
pub mod network;

/// Signer and node client abstractions, plus a JSON-RPC client.
pub mod ledger;

/// Confirmation tiers and per-transaction tier progress.
pub mod tier;

/// Generic deadline-bounded, cancellable polling.
pub mod wait;

/// Sequential transaction submission.
pub mod submitter;

/// Tracking of submitted transactions up to a requested tier.
pub mod tracker;

/// Harness configuration.
pub mod config;

pub use alloy_primitives::{B256, TxHash};
