//! Record of which feature-discovery cards the user has already seen.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::card::Discovery;

pub trait DiscoveryLedger: Send + Sync {
    fn discovered(&self) -> BTreeSet<Discovery>;
    fn mark(&self, discovery: Discovery);
}

fn locked(set: &Mutex<BTreeSet<Discovery>>) -> MutexGuard<'_, BTreeSet<Discovery>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    seen: Mutex<BTreeSet<Discovery>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiscoveryLedger for InMemoryLedger {
    fn discovered(&self) -> BTreeSet<Discovery> {
        locked(&self.seen).clone()
    }

    fn mark(&self, discovery: Discovery) {
        locked(&self.seen).insert(discovery);
    }
}

/// Ledger persisted as a JSON array. A missing or unreadable file starts empty.
#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    seen: Mutex<BTreeSet<Discovery>>,
}

impl JsonFileLedger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seen = Self::read(&path);
        tracing::debug!(path = %path.display(), count = seen.len(), "Loaded discovery ledger");
        Self {
            path,
            seen: Mutex::new(seen),
        }
    }

    fn read(path: &Path) -> BTreeSet<Discovery> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeSet::new(),
            Err(e) => {
                tracing::warn!("Failed to read discovery ledger {}: {}", path.display(), e);
                return BTreeSet::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(seen) => seen,
            Err(e) => {
                tracing::warn!("Ignoring malformed discovery ledger {}: {}", path.display(), e);
                BTreeSet::new()
            }
        }
    }

    fn write(&self, seen: &BTreeSet<Discovery>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(seen)?)?;
        Ok(())
    }
}

impl DiscoveryLedger for JsonFileLedger {
    fn discovered(&self) -> BTreeSet<Discovery> {
        locked(&self.seen).clone()
    }

    fn mark(&self, discovery: Discovery) {
        let mut seen = locked(&self.seen);
        if !seen.insert(discovery) {
            return;
        }
        if let Err(e) = self.write(&seen) {
            tracing::warn!("Failed to persist discovery ledger {}: {}", self.path.display(), e);
        }
    }
}
