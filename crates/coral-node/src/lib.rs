//! CORAL Node - Assembly of one fleet member
//!
//! A node bundles the pieces every role shares (context, announcer,
//! listener) with one role service, wires the discovery hooks that drive
//! cold-start synchronization, and exposes a single `step` the runtime
//! driver calls with a monotone timestamp.

pub mod node;
pub mod persist;
pub mod registry;
pub mod telemetry;

pub use node::*;
pub use persist::*;
pub use registry::*;
