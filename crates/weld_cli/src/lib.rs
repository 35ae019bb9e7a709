//! Library side of the `weld` binary: bulk sync between the section
//! directory and the mirror, and mirror resolution for the CLI's
//! off/auto/on modes. Kept out of main.rs so integration tests can drive
//! the same code paths the binary does.

use weld_audit::{now_rfc3339, AuditLedger, SyncDirection, SyncEntry};
use weld_store::{sha256_hex, MirrorStore, SectionStore};

/// Outcome of one bulk sync. `failed` carries per-file reasons; a failure
/// on one file never stops the rest.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub synced: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

/// Push every section file into the mirror. Sections whose content hash
/// already matches the mirrored row are skipped. The mirror being
/// unreachable is fatal here, unlike during patching: a sync exists only
/// to talk to the mirror.
pub fn sync_push(
    store: &SectionStore,
    ledger: &AuditLedger,
    mirror: &dyn MirrorStore,
    actor: &str,
) -> Result<SyncReport, String> {
    let existing = mirror.list_sections()?;
    let mut report = SyncReport::default();

    for filename in store.list().map_err(|err| err.to_string())? {
        let content = match store.read(&filename) {
            Ok(content) => content,
            Err(err) => {
                report.failed.push((filename, err.to_string()));
                continue;
            }
        };
        let hash = sha256_hex(&content);
        let unchanged = existing
            .iter()
            .any(|row| row.filename == filename && row.content_sha256 == hash);
        if unchanged {
            report.skipped.push(filename);
            continue;
        }
        match mirror.upsert_section(&filename, &content, actor) {
            Ok(()) => report.synced.push(filename),
            Err(err) => report.failed.push((filename, err)),
        }
    }

    record_sync(ledger, SyncDirection::Push, actor, &mut report);
    Ok(report)
}

/// Write every mirrored section back into the section directory, creating
/// it when absent. Used at bootstrap to restore a working tree from the
/// mirror.
pub fn sync_pull(
    store: &SectionStore,
    ledger: &AuditLedger,
    mirror: &dyn MirrorStore,
    actor: &str,
) -> Result<SyncReport, String> {
    let rows = mirror.list_sections()?;
    let mut report = SyncReport::default();
    if rows.is_empty() {
        return Ok(report);
    }
    store.ensure_dir().map_err(|err| err.to_string())?;
    for row in rows {
        match store.write(&row.filename, &row.content) {
            Ok(()) => report.synced.push(row.filename),
            Err(err) => report.failed.push((row.filename, err.to_string())),
        }
    }
    record_sync(ledger, SyncDirection::Pull, actor, &mut report);
    Ok(report)
}

fn record_sync(
    ledger: &AuditLedger,
    direction: SyncDirection,
    actor: &str,
    report: &mut SyncReport,
) {
    if report.synced.is_empty() {
        return;
    }
    let entry = SyncEntry {
        direction,
        filenames: report.synced.clone(),
        admin_name: actor.to_string(),
        timestamp: now_rfc3339(),
    };
    if let Err(err) = ledger.append_sync(&entry) {
        report.warnings.push(format!("audit append failed: {}", err));
    }
}
