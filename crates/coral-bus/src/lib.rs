//! CORAL Bus - Transport seam between fleet instances
//!
//! This crate provides:
//! - Per-purpose broadcast channels (at-least-once, per-publisher order)
//! - Request/reply invocation with a distinguished unreachable failure
//! - The in-process reference implementation used by tests and simulations
//!
//! Real networking is a deployment concern outside the coordination layer;
//! everything above this crate talks only to [`MessageBus`] handles.

pub mod bus;
pub mod rpc;

pub use bus::*;
pub use rpc::*;
