//! Typed repository over the metadata store
//!
//! [`SolidStore`] turns domain values into key-space reads and writes. It is
//! cheap to clone and holds no state besides the store handle and the
//! transaction retry budget.

mod artifact;
mod metric;
mod registry;
mod run;

use std::sync::Arc;

use crate::kv::{KvStore, DEFAULT_TRANSACTION_MAX_RETRIES};

/// Repository for runs, experiments, metrics, artifacts and model registries
#[derive(Clone)]
pub struct SolidStore {
    kv: Arc<dyn KvStore>,
    max_retries: usize,
}

impl SolidStore {
    /// Create a repository with the default transaction retry budget
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            max_retries: DEFAULT_TRANSACTION_MAX_RETRIES,
        }
    }

    /// Override the transaction retry budget
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }
}

impl std::fmt::Debug for SolidStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolidStore")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
