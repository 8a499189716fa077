//! Vaultbind - device-bound software license server
//!
//! This library provides the core functionality for the Vaultbind license
//! server: license key generation, the per-call validation state machine,
//! audit recording, admin operations, and the deferred reactivation
//! scheduler used by device resets.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod keys;
pub mod middleware;
pub mod models;
pub mod scheduler;
pub mod util;
