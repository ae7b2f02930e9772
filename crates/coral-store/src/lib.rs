//! CORAL Store - Replicated per-role state
//!
//! This crate implements the convergence pattern shared by every stateful
//! role:
//! - one-shot snapshot adoption at cold start (first snapshot wins)
//! - origin-validated, idempotent incremental mutation application
//! - local-apply-then-broadcast for locally originated writes
//! - persistence hooks around every mutation

pub mod persist;
pub mod store;

pub use persist::*;
pub use store::*;
