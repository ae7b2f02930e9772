//! CORAL Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the CORAL fleet:
//! - Identifiers (InstanceId, Endpoint, MediaId, Token, Digest)
//! - Role capability descriptors
//! - Time primitives and the deadline scheduler
//! - Broadcast channels, events and request/reply messages
//! - The error taxonomy

pub mod error;
pub mod event;
pub mod id;
pub mod role;
pub mod rpc;
pub mod time;

pub use error::*;
pub use event::*;
pub use id::*;
pub use role::*;
pub use rpc::*;
pub use time::*;
