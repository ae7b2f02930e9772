//! CORAL Directory - Known peers and the per-instance context
//!
//! This crate provides:
//! - [`PeerDirectory`]: the per-process table of known peer instances
//! - [`Context`]: the explicit handle bundle (instance identity, bus,
//!   directory) passed to every component constructor

pub mod context;
pub mod directory;

pub use context::*;
pub use directory::*;
