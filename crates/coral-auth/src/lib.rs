//! CORAL Auth - Credential state and the token lifecycle
//!
//! The auth role replicates `users` (username -> password digest) and
//! `tokens` (username -> current token) across its instances. Token
//! expiry is enforced only by the issuing instance; peers learn of a
//! token's death through the revocation broadcast, never from their own
//! clocks.

pub mod service;
pub mod state;

pub use service::*;
pub use state::*;
