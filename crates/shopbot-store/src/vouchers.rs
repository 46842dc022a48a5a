//! Append-only ledger of submitted voucher codes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shopbot_core::{read_json_document_or_default, write_json_document};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherProvider {
    Amazon,
    Paysafe,
}

impl VoucherProvider {
    pub const ALL: [VoucherProvider; 2] = [VoucherProvider::Amazon, VoucherProvider::Paysafe];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
            Self::Paysafe => "paysafe",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Amazon => "Amazon",
            Self::Paysafe => "Paysafe",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "amazon" => Some(Self::Amazon),
            "paysafe" => Some(Self::Paysafe),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherLedger {
    #[serde(default)]
    pub amazon: Vec<String>,
    #[serde(default)]
    pub paysafe: Vec<String>,
}

impl VoucherLedger {
    pub fn codes(&self, provider: VoucherProvider) -> &[String] {
        match provider {
            VoucherProvider::Amazon => &self.amazon,
            VoucherProvider::Paysafe => &self.paysafe,
        }
    }

    pub fn push(&mut self, provider: VoucherProvider, code: impl Into<String>) {
        let code = code.into();
        match provider {
            VoucherProvider::Amazon => self.amazon.push(code),
            VoucherProvider::Paysafe => self.paysafe.push(code),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amazon.is_empty() && self.paysafe.is_empty()
    }
}

/// Load/save contract for the voucher ledger, mirroring
/// [`AggregateStore`](crate::store::AggregateStore).
pub trait VoucherLedgerStore: Send + Sync {
    fn load(&self) -> VoucherLedger;

    fn save(&self, ledger: &VoucherLedger) -> Result<()>;
}

#[derive(Debug, Clone)]
/// Ledger stored as pretty-printed JSON, usually `vouchers.json`.
pub struct JsonVoucherFile {
    path: PathBuf,
}

impl JsonVoucherFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VoucherLedgerStore for JsonVoucherFile {
    fn load(&self) -> VoucherLedger {
        read_json_document_or_default(&self.path)
    }

    fn save(&self, ledger: &VoucherLedger) -> Result<()> {
        write_json_document(&self.path, ledger).context("failed to persist voucher ledger")
    }
}

#[derive(Debug, Default)]
pub struct MemoryVoucherLedger {
    state: Mutex<VoucherLedger>,
}

impl VoucherLedgerStore for MemoryVoucherLedger {
    fn load(&self) -> VoucherLedger {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn save(&self, ledger: &VoucherLedger) -> Result<()> {
        match self.state.lock() {
            Ok(mut guard) => *guard = ledger.clone(),
            Err(poisoned) => *poisoned.into_inner() = ledger.clone(),
        }
        Ok(())
    }
}

#[derive(Clone)]
/// Append-only access to a [`VoucherLedgerStore`]. Appends are serialized so
/// two submissions never drop each other's code.
pub struct VoucherStore {
    backend: Arc<dyn VoucherLedgerStore>,
    gate: Arc<Mutex<()>>,
}

impl VoucherStore {
    pub fn with_backend(backend: Arc<dyn VoucherLedgerStore>) -> Self {
        Self {
            backend,
            gate: Arc::default(),
        }
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(Arc::new(JsonVoucherFile::new(path)))
    }

    /// Ledger that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryVoucherLedger::default()))
    }

    pub fn load(&self) -> VoucherLedger {
        self.backend.load()
    }

    pub fn append(&self, provider: VoucherProvider, code: &str) -> Result<()> {
        let _guard = self
            .gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut ledger = self.backend.load();
        ledger.push(provider, code.trim());
        self.backend.save(&ledger)?;
        info!(
            "voucher recorded: provider={} stored={}",
            provider.as_str(),
            ledger.codes(provider).len()
        );
        Ok(())
    }
}

impl std::fmt::Debug for VoucherStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoucherStore").finish_non_exhaustive()
    }
}
