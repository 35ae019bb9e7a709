use serde::{Deserialize, Serialize};

use weld_audit::AuditEntry;

/// One mirrored section row, keyed by filename with last-writer-wins
/// semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSection {
    pub filename: String,
    pub content: String,
    pub content_sha256: String,
    pub updated_at: String,
    pub updated_by: String,
}

/// Best-effort secondary persistence for sections and audit rows. The
/// filesystem stays authoritative: callers catch every error from this
/// trait and degrade to filesystem-only operation.
pub trait MirrorStore {
    fn is_ready(&self) -> Result<bool, String>;

    fn upsert_section(&self, filename: &str, content: &str, actor: &str) -> Result<(), String>;

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), String>;

    /// All mirrored sections, for the pull direction of sync.
    fn list_sections(&self) -> Result<Vec<MirrorSection>, String>;
}
