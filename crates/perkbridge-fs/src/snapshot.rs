use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use perkbridge_core::StockEntry;
use tracing::{info, warn};

use crate::atomic::write_atomic;

/// The published stock snapshot (`shop_stock.json`).
#[derive(Clone, Debug)]
pub struct SnapshotFile {
    pub path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `entries` and atomically replace the snapshot with them.
    pub fn write(&self, entries: &[StockEntry]) -> Result<()> {
        let bytes = serde_json::to_vec(entries).context("serialize stock snapshot")?;
        write_atomic(&self.path, &bytes).with_context(|| format!("publish snapshot {}", self.path.display()))
    }

    /// Strict read of the current snapshot. `None` until the first publish.
    pub fn load(&self) -> Result<Option<Vec<StockEntry>>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let entries = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parse snapshot {}", self.path.display()))?;
                Ok(Some(entries))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read snapshot {}", self.path.display())),
        }
    }
}

/// Reader-side lookup table over a snapshot: `(shop_uuid, item_type) -> stock`.
#[derive(Clone, Debug, Default)]
pub struct StockIndex {
    stock: HashMap<(String, String), u64>,
}

impl StockIndex {
    /// Build the index the way an external reader would.
    ///
    /// A missing file gives an empty index. Entries lacking a shop, an item
    /// type or a count are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "stock file not found");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("read stock file {}", path.display())),
        };
        let rows: Vec<serde_json::Value> =
            serde_json::from_slice(&bytes).with_context(|| format!("parse stock file {}", path.display()))?;

        let mut stock = HashMap::with_capacity(rows.len());
        for row in rows {
            let shop = row.get("shop_uuid").and_then(|v| v.as_str()).unwrap_or_default();
            let item = row.get("item_type").and_then(|v| v.as_str()).unwrap_or_default();
            let Some(count) = row.get("stock_remaining").and_then(|v| v.as_u64()) else {
                continue;
            };
            if shop.is_empty() || item.is_empty() {
                continue;
            }
            stock.insert((shop.to_string(), item.to_string()), count);
        }
        info!(entries = stock.len(), path = %path.display(), "loaded stock entries");
        Ok(Self { stock })
    }

    pub fn get(&self, shop_uuid: &str, item_type: &str) -> Option<u64> {
        self.stock.get(&(shop_uuid.to_string(), item_type.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.stock.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stock.is_empty()
    }

    /// Entries sorted by shop then item, for display.
    pub fn sorted(&self) -> Vec<(&str, &str, u64)> {
        let mut rows: Vec<_> = self.stock.iter().map(|((s, i), n)| (s.as_str(), i.as_str(), *n)).collect();
        rows.sort();
        rows
    }
}
