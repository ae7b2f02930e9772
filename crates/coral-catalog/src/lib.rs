//! CORAL Catalog - Replicated media catalog
//!
//! Catalog instances replicate titles and per-user tags through the
//! catalog-updates channel, and track which provider currently serves
//! each media id from availability broadcasts. Lookups that touch a
//! provider probe it first; a dead provider makes the media temporarily
//! unavailable rather than silently absent.

pub mod service;
pub mod state;

pub use service::*;
pub use state::*;
