//! The element-locate-and-patch engine.
//!
//! Given an opaque element identifier and replacement HTML, scan the section
//! store in lexicographic filename order, find the single element tagged
//! `data-id="<identifier>"`, replace its inner content, persist the whole
//! section file, then best-effort mirror the section and append an audit
//! entry. Identifier uniqueness across the store is an authoring invariant,
//! not enforced here; if it is ever violated the first match in scan order
//! wins and later sections are never touched.

use std::fmt;

use serde::Serialize;

use weld_audit::{
    now_rfc3339, AnchorAttributes, AttributeChanges, AuditEntry, AuditLedger,
};
use weld_html::Document;
use weld_store::{MirrorStore, SectionStore, StoreError};

/// Attribute carrying the element identifier.
pub const ID_ATTR: &str = "data-id";

#[derive(Debug)]
pub enum PatchError {
    Store(StoreError),
    /// The replacement fragment itself failed to parse. Nothing was written.
    Content(String),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::Store(err) => write!(f, "patch store error: {}", err),
            PatchError::Content(err) => write!(f, "patch content error: {}", err),
        }
    }
}

impl std::error::Error for PatchError {}

impl From<StoreError> for PatchError {
    fn from(err: StoreError) -> Self {
        PatchError::Store(err)
    }
}

/// href/target updates for anchor elements. `Some("")` for target removes
/// the attribute; non-anchor elements ignore the whole payload.
#[derive(Debug, Clone, Default)]
pub struct AttributeUpdate {
    pub href: Option<String>,
    pub target: Option<String>,
}

impl AttributeUpdate {
    pub fn is_empty(&self) -> bool {
        self.href.is_none() && self.target.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PatchRequest {
    pub element_id: String,
    pub content: String,
    pub admin_name: String,
    pub attributes: AttributeUpdate,
    pub client: ClientInfo,
}

impl PatchRequest {
    pub fn new(element_id: &str, content: &str, admin_name: &str) -> PatchRequest {
        PatchRequest {
            element_id: element_id.to_string(),
            content: content.to_string(),
            admin_name: admin_name.to_string(),
            attributes: AttributeUpdate::default(),
            client: ClientInfo::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    pub filename: String,
    pub element_type: String,
    pub previous_content: String,
    pub mirror_synced: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PatchOutcome {
    Updated(PatchReport),
    NotFound { warnings: Vec<String> },
}

/// Apply one patch. The filesystem write is authoritative; mirror and audit
/// failures are demoted to warnings on the outcome and never roll it back.
pub fn apply_patch(
    store: &SectionStore,
    ledger: &AuditLedger,
    mirror: Option<&dyn MirrorStore>,
    request: &PatchRequest,
) -> Result<PatchOutcome, PatchError> {
    let mut warnings: Vec<String> = Vec::new();

    for filename in store.list()? {
        let content = match store.read(&filename) {
            Ok(content) => content,
            Err(err) => {
                warnings.push(format!("skipping {}: {}", filename, err));
                continue;
            }
        };
        let mut doc = match Document::parse(&content) {
            Ok(doc) => doc,
            Err(err) => {
                warnings.push(format!("skipping {}: {}", filename, err));
                continue;
            }
        };
        let Some(element) = doc.find_by_attr(ID_ATTR, &request.element_id) else {
            continue;
        };

        let element_type = doc
            .tag_name(element)
            .unwrap_or_else(|| "unknown".to_string());
        let previous_content = doc.inner_html(element);
        let is_anchor = element_type == "a";

        // Anchors always get an attribute-change block, even when no
        // attribute update was requested: the "new" side echoes the current
        // values so every anchor edit is self-describing in the audit trail.
        let previous_attributes = is_anchor.then(|| AnchorAttributes {
            href: doc.attr(element, "href").unwrap_or("").to_string(),
            target: doc.attr(element, "target").unwrap_or("").to_string(),
        });

        doc.set_inner_html(element, &request.content)
            .map_err(|err| PatchError::Content(err.to_string()))?;

        if is_anchor && !request.attributes.is_empty() {
            if let Some(href) = &request.attributes.href {
                doc.set_attr(element, "href", href);
            }
            if let Some(target) = &request.attributes.target {
                if target.is_empty() {
                    doc.remove_attr(element, "target");
                } else {
                    doc.set_attr(element, "target", target);
                }
            }
        }

        let updated = doc.serialize();
        store.write(&filename, &updated)?;

        let mirror_synced = match mirror {
            Some(sink) => match sink.upsert_section(&filename, &updated, &request.admin_name) {
                Ok(()) => true,
                Err(err) => {
                    warnings.push(format!("mirror upsert failed for {}: {}", filename, err));
                    false
                }
            },
            None => false,
        };

        let attribute_changes = previous_attributes.map(|previous| AttributeChanges {
            new: AnchorAttributes {
                href: request
                    .attributes
                    .href
                    .clone()
                    .unwrap_or_else(|| previous.href.clone()),
                target: request
                    .attributes
                    .target
                    .clone()
                    .unwrap_or_else(|| previous.target.clone()),
            },
            previous,
        });

        let entry = AuditEntry {
            filename: filename.clone(),
            element_id: request.element_id.clone(),
            element_type: element_type.clone(),
            previous_content: previous_content.clone(),
            new_content: request.content.clone(),
            admin_name: request.admin_name.clone(),
            attribute_changes,
            ip_address: request.client.ip_address.clone(),
            user_agent: request.client.user_agent.clone(),
            timestamp: now_rfc3339(),
        };
        if let Err(err) = ledger.append_patch(&entry) {
            warnings.push(format!("audit append failed: {}", err));
        }
        if let Some(sink) = mirror {
            if let Err(err) = sink.append_audit(&entry) {
                warnings.push(format!("mirror audit failed: {}", err));
            }
        }

        return Ok(PatchOutcome::Updated(PatchReport {
            filename,
            element_type,
            previous_content,
            mirror_synced,
            warnings,
        }));
    }

    Ok(PatchOutcome::NotFound { warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    use weld_audit::LedgerEvent;
    use weld_store::MirrorSection;

    struct Fixture {
        store: SectionStore,
        ledger: AuditLedger,
        #[allow(dead_code)]
        root: PathBuf,
    }

    fn fixture(label: &str) -> Fixture {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("weld-patch-{}-{}", label, nanos));
        let store = SectionStore::new(root.join("sections"));
        store.ensure_dir().expect("store dir");
        let ledger = AuditLedger::new(root.join("audit.jsonl"));
        Fixture { store, ledger, root }
    }

    /// Mirror double that records upserts or fails on demand.
    struct FakeMirror {
        fail: bool,
        upserts: RefCell<Vec<(String, String)>>,
        audits: RefCell<Vec<AuditEntry>>,
    }

    impl FakeMirror {
        fn new(fail: bool) -> FakeMirror {
            FakeMirror {
                fail,
                upserts: RefCell::new(Vec::new()),
                audits: RefCell::new(Vec::new()),
            }
        }
    }

    impl MirrorStore for FakeMirror {
        fn is_ready(&self) -> Result<bool, String> {
            Ok(!self.fail)
        }

        fn upsert_section(
            &self,
            filename: &str,
            content: &str,
            _actor: &str,
        ) -> Result<(), String> {
            if self.fail {
                return Err("mirror unavailable".to_string());
            }
            self.upserts
                .borrow_mut()
                .push((filename.to_string(), content.to_string()));
            Ok(())
        }

        fn append_audit(&self, entry: &AuditEntry) -> Result<(), String> {
            if self.fail {
                return Err("mirror unavailable".to_string());
            }
            self.audits.borrow_mut().push(entry.clone());
            Ok(())
        }

        fn list_sections(&self) -> Result<Vec<MirrorSection>, String> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn end_to_end_hero_patch() {
        let fx = fixture("hero");
        fx.store
            .write("hero.html", "<h1 data-id=\"hero-title\">Old</h1>")
            .expect("seed");
        let mirror = FakeMirror::new(false);
        let outcome = apply_patch(
            &fx.store,
            &fx.ledger,
            Some(&mirror),
            &PatchRequest::new("hero-title", "New", "alice"),
        )
        .expect("patch");
        let PatchOutcome::Updated(report) = outcome else {
            panic!("expected update");
        };
        assert_eq!(report.filename, "hero.html");
        assert_eq!(report.element_type, "h1");
        assert_eq!(report.previous_content, "Old");
        assert!(report.mirror_synced);
        assert!(report.warnings.is_empty());
        assert_eq!(
            fx.store.read("hero.html").expect("read"),
            "<h1 data-id=\"hero-title\">New</h1>"
        );
        let events = fx.ledger.read_events().expect("events");
        assert_eq!(events.len(), 1);
        let LedgerEvent::ContentPatch(entry) = &events[0] else {
            panic!("expected patch event");
        };
        assert_eq!(entry.previous_content, "Old");
        assert_eq!(entry.new_content, "New");
        assert_eq!(entry.admin_name, "alice");
        assert_eq!(mirror.upserts.borrow().len(), 1);
        assert_eq!(mirror.audits.borrow().len(), 1);
    }

    #[test]
    fn not_found_leaves_sections_byte_identical() {
        let fx = fixture("not-found");
        let before = "<div data-id=\"present\">x</div>";
        fx.store.write("only.html", before).expect("seed");
        let outcome = apply_patch(
            &fx.store,
            &fx.ledger,
            None,
            &PatchRequest::new("absent", "y", "alice"),
        )
        .expect("patch");
        assert!(matches!(outcome, PatchOutcome::NotFound { .. }));
        assert_eq!(fx.store.read("only.html").expect("read"), before);
        assert!(fx.ledger.read_events().expect("events").is_empty());
    }

    #[test]
    fn anchor_without_attribute_update_echoes_current_values() {
        let fx = fixture("anchor-echo");
        fx.store
            .write(
                "links.html",
                "<a data-id=\"cta\" href=\"/join\" target=\"_blank\">Join</a>",
            )
            .expect("seed");
        let outcome = apply_patch(
            &fx.store,
            &fx.ledger,
            None,
            &PatchRequest::new("cta", "Join us", "bob"),
        )
        .expect("patch");
        assert!(matches!(outcome, PatchOutcome::Updated(_)));
        let events = fx.ledger.read_events().expect("events");
        let LedgerEvent::ContentPatch(entry) = &events[0] else {
            panic!("expected patch event");
        };
        let changes = entry.attribute_changes.as_ref().expect("anchor block");
        assert_eq!(changes.previous, changes.new);
        assert_eq!(changes.previous.href, "/join");
        assert_eq!(changes.previous.target, "_blank");
    }

    #[test]
    fn empty_target_removes_attribute_and_href_is_set() {
        let fx = fixture("anchor-update");
        fx.store
            .write(
                "links.html",
                "<a data-id=\"cta\" href=\"/old\" target=\"_blank\">Go</a>",
            )
            .expect("seed");
        let request = PatchRequest {
            attributes: AttributeUpdate {
                href: Some("/new".to_string()),
                target: Some(String::new()),
            },
            ..PatchRequest::new("cta", "Go", "bob")
        };
        apply_patch(&fx.store, &fx.ledger, None, &request).expect("patch");
        assert_eq!(
            fx.store.read("links.html").expect("read"),
            "<a data-id=\"cta\" href=\"/new\">Go</a>"
        );
        let events = fx.ledger.read_events().expect("events");
        let LedgerEvent::ContentPatch(entry) = &events[0] else {
            panic!("expected patch event");
        };
        let changes = entry.attribute_changes.as_ref().expect("anchor block");
        assert_eq!(changes.previous.href, "/old");
        assert_eq!(changes.new.href, "/new");
        assert_eq!(changes.new.target, "");
    }

    #[test]
    fn non_anchor_ignores_attribute_payload() {
        let fx = fixture("non-anchor");
        fx.store
            .write("hero.html", "<h1 data-id=\"t\">Old</h1>")
            .expect("seed");
        let request = PatchRequest {
            attributes: AttributeUpdate {
                href: Some("/nope".to_string()),
                target: Some("_blank".to_string()),
            },
            ..PatchRequest::new("t", "New", "bob")
        };
        apply_patch(&fx.store, &fx.ledger, None, &request).expect("patch");
        assert_eq!(
            fx.store.read("hero.html").expect("read"),
            "<h1 data-id=\"t\">New</h1>"
        );
        let events = fx.ledger.read_events().expect("events");
        let LedgerEvent::ContentPatch(entry) = &events[0] else {
            panic!("expected patch event");
        };
        assert!(entry.attribute_changes.is_none());
    }

    #[test]
    fn malformed_section_is_skipped_and_scan_continues() {
        let fx = fixture("malformed");
        fx.store
            .write("aaa.html", "<p data-id=\"x\"><!-- broken")
            .expect("seed");
        fx.store
            .write("bbb.html", "<p data-id=\"x\">found</p>")
            .expect("seed");
        let outcome = apply_patch(
            &fx.store,
            &fx.ledger,
            None,
            &PatchRequest::new("x", "patched", "alice"),
        )
        .expect("patch");
        let PatchOutcome::Updated(report) = outcome else {
            panic!("expected update");
        };
        assert_eq!(report.filename, "bbb.html");
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("aaa.html"));
    }

    #[test]
    fn duplicate_identifier_first_match_wins() {
        let fx = fixture("duplicate");
        fx.store
            .write("alpha.html", "<p data-id=\"dup\">first</p>")
            .expect("seed");
        fx.store
            .write("beta.html", "<p data-id=\"dup\">second</p>")
            .expect("seed");
        apply_patch(
            &fx.store,
            &fx.ledger,
            None,
            &PatchRequest::new("dup", "patched", "alice"),
        )
        .expect("patch");
        assert_eq!(
            fx.store.read("alpha.html").expect("read"),
            "<p data-id=\"dup\">patched</p>"
        );
        assert_eq!(
            fx.store.read("beta.html").expect("read"),
            "<p data-id=\"dup\">second</p>"
        );
    }

    #[test]
    fn mirror_failure_is_a_warning_not_an_error() {
        let fx = fixture("mirror-down");
        fx.store
            .write("hero.html", "<h1 data-id=\"t\">Old</h1>")
            .expect("seed");
        let mirror = FakeMirror::new(true);
        let outcome = apply_patch(
            &fx.store,
            &fx.ledger,
            Some(&mirror),
            &PatchRequest::new("t", "New", "alice"),
        )
        .expect("patch");
        let PatchOutcome::Updated(report) = outcome else {
            panic!("expected update");
        };
        assert!(!report.mirror_synced);
        assert!(report.warnings.iter().any(|w| w.contains("mirror")));
        // Filesystem write and ledger append still happened.
        assert_eq!(
            fx.store.read("hero.html").expect("read"),
            "<h1 data-id=\"t\">New</h1>"
        );
        assert_eq!(fx.ledger.read_events().expect("events").len(), 1);
    }

    #[test]
    fn empty_content_clears_the_element() {
        let fx = fixture("clear");
        fx.store
            .write("hero.html", "<h1 data-id=\"t\">Old</h1>")
            .expect("seed");
        apply_patch(
            &fx.store,
            &fx.ledger,
            None,
            &PatchRequest::new("t", "", "alice"),
        )
        .expect("patch");
        assert_eq!(
            fx.store.read("hero.html").expect("read"),
            "<h1 data-id=\"t\"></h1>"
        );
    }
}
