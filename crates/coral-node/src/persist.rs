//! JSON file persistence
//!
//! Write-through snapshot of the full role state after every mutation,
//! written to a sibling temp file and renamed into place. Failures are
//! logged and swallowed; replication, not the disk, is the availability
//! story.

use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use coral_store::Persistence;

pub struct JsonFilePersistence<S> {
    path: PathBuf,
    _state: PhantomData<fn() -> S>,
}

impl<S> JsonFilePersistence<S> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFilePersistence {
            path: path.into(),
            _state: PhantomData,
        }
    }
}

impl<S> Persistence<S> for JsonFilePersistence<S>
where
    S: Serialize + DeserializeOwned + Send + 'static,
{
    fn load_initial(&self) -> Option<S> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "state file unreadable");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "state file corrupt, starting empty");
                None
            }
        }
    }

    fn persist(&self, state: &S) {
        let bytes = match serde_json::to_vec_pretty(state) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(%err, "state encode failed");
                return;
            }
        };
        let tmp = self.path.with_extension("tmp");
        let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(err) = result {
            tracing::warn!(path = %self.path.display(), %err, "state write failed");
        }
    }
}
