//! Aggregate persistence and the single-owner mutation handle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use shopbot_core::{read_json_document_or_default, write_json_document};

use crate::model::Aggregate;

/// Load/save contract for the persisted aggregate.
///
/// `load` never fails: a missing or unparsable backing file yields the default
/// (empty) aggregate, and an unparsable file is kept aside as
/// `*.corrupt-<ms>`. `save` overwrites the whole aggregate; last write wins.
pub trait AggregateStore: Send + Sync {
    fn load(&self) -> Aggregate;

    fn save(&self, aggregate: &Aggregate) -> Result<()>;
}

#[derive(Debug, Clone)]
/// Aggregate stored as pretty-printed JSON in a single file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AggregateStore for JsonFileStore {
    fn load(&self) -> Aggregate {
        read_json_document_or_default(&self.path)
    }

    fn save(&self, aggregate: &Aggregate) -> Result<()> {
        write_json_document(&self.path, aggregate)
            .context("failed to persist stats aggregate")
    }
}

#[derive(Debug, Default)]
/// Process-local store, used by tests and dry runs.
pub struct MemoryStore {
    state: Mutex<Aggregate>,
}

impl MemoryStore {
    pub fn new(initial: Aggregate) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }
}

impl AggregateStore for MemoryStore {
    fn load(&self) -> Aggregate {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn save(&self, aggregate: &Aggregate) -> Result<()> {
        match self.state.lock() {
            Ok(mut guard) => *guard = aggregate.clone(),
            Err(poisoned) => *poisoned.into_inner() = aggregate.clone(),
        }
        Ok(())
    }
}

#[derive(Clone)]
/// Sole owner of aggregate mutation.
///
/// Each `mutate` call re-reads the backing store, applies the closure, and
/// saves, all while holding one async mutex. Unchanged aggregates are not
/// written back.
pub struct StoreHandle {
    backend: Arc<dyn AggregateStore>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl StoreHandle {
    pub fn new(backend: Arc<dyn AggregateStore>) -> Self {
        Self {
            backend,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn in_memory(initial: Aggregate) -> Self {
        Self::new(Arc::new(MemoryStore::new(initial)))
    }

    /// Fresh read of the aggregate. Not authoritative after the call returns.
    pub async fn snapshot(&self) -> Aggregate {
        let _guard = self.gate.lock().await;
        self.backend.load()
    }

    pub async fn mutate<R>(&self, apply: impl FnOnce(&mut Aggregate) -> R) -> Result<R> {
        let _guard = self.gate.lock().await;
        let before = self.backend.load();
        let mut aggregate = before.clone();
        let outcome = apply(&mut aggregate);
        if aggregate != before {
            self.backend.save(&aggregate)?;
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle").finish_non_exhaustive()
    }
}
