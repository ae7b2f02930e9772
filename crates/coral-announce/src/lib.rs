//! CORAL Announce - Peer discovery over the shared announcements channel
//!
//! This crate implements:
//! - [`Announcer`]: one new-service event at start, then periodic
//!   heartbeats
//! - [`Listener`]: passive classification of announcing peers into the
//!   directory, with observer hooks for same-role bootstrap and other
//!   first-sight reactions

pub mod announcer;
pub mod listener;

pub use announcer::*;
pub use listener::*;
