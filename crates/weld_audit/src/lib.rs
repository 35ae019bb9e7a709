//! Append-only audit ledger.
//!
//! Every successful content patch and every bulk sync appends one JSON line
//! to the ledger file. Lines are never rewritten or removed; a failed append
//! is reported to the caller but must never roll back the mutation it
//! describes (that policy lives with the caller).

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum AuditError {
    Io(String),
    Json(String),
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::Io(err) => write!(f, "audit ledger io error: {}", err),
            AuditError::Json(err) => write!(f, "audit ledger json error: {}", err),
        }
    }
}

impl std::error::Error for AuditError {}

/// href/target pair carried for anchor elements. Absent attributes read as
/// empty strings so the audit trail is self-describing for every anchor edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorAttributes {
    pub href: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChanges {
    pub previous: AnchorAttributes,
    pub new: AnchorAttributes,
}

/// Immutable record of one element mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub filename: String,
    pub element_id: String,
    pub element_type: String,
    pub previous_content: String,
    pub new_content: String,
    pub admin_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_changes: Option<AttributeChanges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub timestamp: String,
}

/// Record of one bulk sync between the section directory and the mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEntry {
    pub direction: SyncDirection,
    pub filenames: Vec<String>,
    pub admin_name: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Push,
    Pull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    ContentPatch(AuditEntry),
    SectionSync(SyncEntry),
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// JSONL ledger on disk.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    path: PathBuf,
}

impl AuditLedger {
    pub fn new(path: impl Into<PathBuf>) -> AuditLedger {
        AuditLedger { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_patch(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.append_event(&LedgerEvent::ContentPatch(entry.clone()))
    }

    pub fn append_sync(&self, entry: &SyncEntry) -> Result<(), AuditError> {
        self.append_event(&LedgerEvent::SectionSync(entry.clone()))
    }

    fn append_event(&self, event: &LedgerEvent) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|err| AuditError::Io(err.to_string()))?;
            }
        }
        let line = serde_json::to_string(event).map_err(|err| AuditError::Json(err.to_string()))?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line))
            .map_err(|err| AuditError::Io(err.to_string()))?;
        Ok(())
    }

    /// All events in append order. A ledger file that does not exist yet
    /// reads as empty.
    pub fn read_events(&self) -> Result<Vec<LedgerEvent>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents =
            fs::read_to_string(&self.path).map_err(|err| AuditError::Io(err.to_string()))?;
        let mut events = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event: LedgerEvent =
                serde_json::from_str(line).map_err(|err| AuditError::Json(err.to_string()))?;
            events.push(event);
        }
        Ok(events)
    }

    /// Most recent patch entries, newest first.
    pub fn recent_patches(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let mut patches: Vec<AuditEntry> = self
            .read_events()?
            .into_iter()
            .filter_map(|event| match event {
                LedgerEvent::ContentPatch(entry) => Some(entry),
                LedgerEvent::SectionSync(_) => None,
            })
            .collect();
        patches.reverse();
        patches.truncate(limit);
        Ok(patches)
    }

    pub fn event_count(&self) -> Result<usize, AuditError> {
        Ok(self.read_events()?.len())
    }
}
