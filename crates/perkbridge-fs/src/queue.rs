use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use perkbridge_core::{CommandId, QueuedCommand};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::atomic::write_atomic;

/// How a drain cycle went at the file level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrainStatus {
    /// No queue file, or a zero-length one. Nothing was touched.
    Idle,
    /// The file decoded into a (possibly empty) batch.
    Parsed,
    /// The file was read but did not decode; the batch is empty.
    Malformed(String),
    /// The file could not be read; it was left in place for the next cycle.
    ReadFailed(String),
}

/// Result of one read-and-clear pass over the queue file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Drain {
    pub status: DrainStatus,
    pub commands: Vec<QueuedCommand>,
    /// Array elements that were not command objects. Already logged with their id.
    pub undecodable: usize,
    /// Whether the queue file is gone after this pass.
    pub cleared: bool,
}

impl Drain {
    fn idle() -> Self {
        Self { status: DrainStatus::Idle, commands: vec![], undecodable: 0, cleared: false }
    }

    fn read_failed(msg: String) -> Self {
        Self { status: DrainStatus::ReadFailed(msg), commands: vec![], undecodable: 0, cleared: false }
    }
}

/// Decode each array element on its own so one broken entry only loses itself.
fn decode_entries(entries: Vec<Value>) -> (Vec<QueuedCommand>, usize) {
    let mut commands = Vec::with_capacity(entries.len());
    let mut undecodable = 0;
    for (index, entry) in entries.into_iter().enumerate() {
        let id = match entry.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("#{index}"),
        };
        match serde_json::from_value::<QueuedCommand>(entry) {
            Ok(cmd) => commands.push(cmd),
            Err(e) => {
                error!(id = %id, error = %e, "rejecting queued command: entry does not decode");
                undecodable += 1;
            }
        }
    }
    (commands, undecodable)
}

/// The JSON mailbox the web backend appends commands to.
#[derive(Clone, Debug)]
pub struct QueueFile {
    pub path: PathBuf,
}

impl QueueFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole queue, then delete it before anything gets executed.
    ///
    /// Never fails: I/O and decode problems are logged and reported through
    /// [`DrainStatus`]. A file that decoded badly is still deleted so it
    /// cannot wedge every later cycle; a file that could not be read is kept.
    pub fn drain(&self) -> Drain {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() == 0 => return Drain::idle(),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Drain::idle(),
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to stat command queue file");
                return Drain::read_failed(e.to_string());
            }
        }

        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            // Removed between the stat and the read.
            Err(e) if e.kind() == ErrorKind::NotFound => return Drain::idle(),
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to read command queue file");
                return Drain::read_failed(e.to_string());
            }
        };

        let (status, commands, undecodable) = match serde_json::from_slice::<Option<Vec<Value>>>(&bytes) {
            Ok(entries) => {
                let (commands, undecodable) = decode_entries(entries.unwrap_or_default());
                (DrainStatus::Parsed, commands, undecodable)
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to deserialize command queue");
                (DrainStatus::Malformed(e.to_string()), vec![], 0)
            }
        };

        let cleared = match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to clear command queue file after reading");
                false
            }
        };

        debug!(count = commands.len(), undecodable, cleared, "drained command queue");
        Drain { status, commands, undecodable, cleared }
    }

    /// Producer side: append one command to the queue and atomically rewrite it.
    ///
    /// Existing entries are carried over verbatim. Fails without touching the
    /// file when the current contents do not decode.
    pub fn append(&self, command: &str) -> Result<QueuedCommand> {
        let mut entries: Vec<Value> = match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(|b| b.is_ascii_whitespace()) => vec![],
            Ok(bytes) => serde_json::from_slice::<Option<Vec<Value>>>(&bytes)
                .with_context(|| format!("parse queue file {}", self.path.display()))?
                .unwrap_or_default(),
            Err(e) if e.kind() == ErrorKind::NotFound => vec![],
            Err(e) => return Err(e).with_context(|| format!("read queue file {}", self.path.display())),
        };

        let queued = QueuedCommand {
            id: CommandId::short(),
            command: command.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        entries.push(serde_json::to_value(&queued)?);

        let bytes = serde_json::to_vec_pretty(&entries)?;
        write_atomic(&self.path, &bytes)?;
        if entries.len() > 1 {
            warn!(pending = entries.len(), "command queue already had undrained entries");
        }
        Ok(queued)
    }
}
