//! Persistence seam
//!
//! Storage format and location are outside the coordination layer; the
//! store only promises to call these hooks around every mutation.

/// Boundary to on-disk state
pub trait Persistence<S>: Send + Sync {
    /// State from a previous process life, if any
    fn load_initial(&self) -> Option<S>;

    /// Write-through after a mutation; best-effort, failures are the
    /// implementation's problem to log
    fn persist(&self, state: &S);
}

/// Keep everything in memory only
pub struct NoPersistence;

impl<S> Persistence<S> for NoPersistence {
    fn load_initial(&self) -> Option<S> {
        None
    }

    fn persist(&self, _state: &S) {}
}
