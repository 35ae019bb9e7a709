//! End-to-end flow over a real site tree: patch a section, rebuild the
//! servable document, then render it with injections applied.

use weld_audit::{AuditLedger, LedgerEvent};
use weld_compile::build;
use weld_inject::{
    render_document, InjectionKind, InjectionLocation, InjectionOrigin, InjectionRegistry,
    NewInjection,
};
use weld_patch::{apply_patch, AttributeUpdate, PatchOutcome, PatchRequest};
use weld_store::{SectionStore, SitePaths};

fn seed_site() -> (tempfile::TempDir, SitePaths) {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = SitePaths::new(dir.path());
    let store = SectionStore::new(paths.sections_dir());
    store.ensure_dir().expect("sections dir");
    store
        .write(
            "index.html",
            "<!DOCTYPE html>\n<html><head><title>t</title></head><body>\n\
             <!-- Include header.html -->\n\
             <main><p data-id=\"intro\">old intro</p></main>\n\
             </body></html>\n",
        )
        .expect("seed index");
    store
        .write(
            "header.html",
            "<header><a data-id=\"cta\" href=\"/old\">Old label</a></header>",
        )
        .expect("seed header");
    (dir, paths)
}

#[test]
fn patch_then_build_then_render() {
    let (_dir, paths) = seed_site();
    let store = SectionStore::new(paths.sections_dir());
    let ledger = AuditLedger::new(paths.ledger_path());

    let request = PatchRequest {
        attributes: AttributeUpdate {
            href: Some("/new".to_string()),
            target: None,
        },
        ..PatchRequest::new("cta", "New label", "alice")
    };
    let outcome = apply_patch(&store, &ledger, None, &request).expect("patch");
    let PatchOutcome::Updated(report) = outcome else {
        panic!("expected an update");
    };
    assert_eq!(report.filename, "header.html");
    assert_eq!(report.previous_content, "Old label");
    assert!(!report.mirror_synced);

    let build_report = build(&store, &paths, "index.html").expect("build");
    assert!(build_report.warnings.is_empty());
    let output = std::fs::read_to_string(paths.output_index()).expect("read output");
    assert!(output.contains("New label"));
    assert!(output.contains("href=\"/new\""));
    assert!(!output.contains("Include header.html"));

    let registry = InjectionRegistry::new(paths.injections_path());
    registry
        .create(
            NewInjection {
                injection_id: Some("analytics".to_string()),
                name: "analytics".to_string(),
                kind: InjectionKind::Script,
                code: "console.log('hi');".to_string(),
                location: InjectionLocation::BeforeBodyClose,
                origin: InjectionOrigin::User,
                is_active: true,
            },
            "alice",
        )
        .expect("create injection");

    let head = registry
        .active_by_location(InjectionLocation::BeforeHeadClose)
        .expect("head list");
    let body = registry
        .active_by_location(InjectionLocation::BeforeBodyClose)
        .expect("body list");
    let rendered = render_document(&output, "/", &head, &body);
    assert!(rendered.applied);
    assert!(rendered.output.contains("id=\"injection-analytics\""));

    // Rendering the already-rendered document must not duplicate anything.
    let again = render_document(&rendered.output, "/", &head, &body);
    assert_eq!(again.output, rendered.output);
    assert_eq!(again.output.matches("injection-analytics").count(), 1);
}

#[test]
fn patch_records_the_attribute_change_in_the_ledger() {
    let (_dir, paths) = seed_site();
    let store = SectionStore::new(paths.sections_dir());
    let ledger = AuditLedger::new(paths.ledger_path());

    let request = PatchRequest {
        attributes: AttributeUpdate {
            href: Some("/new".to_string()),
            target: Some("_blank".to_string()),
        },
        ..PatchRequest::new("cta", "New label", "alice")
    };
    apply_patch(&store, &ledger, None, &request).expect("patch");

    let events = ledger.read_events().expect("events");
    assert_eq!(events.len(), 1);
    let LedgerEvent::ContentPatch(entry) = &events[0] else {
        panic!("expected a patch event");
    };
    assert_eq!(entry.element_id, "cta");
    assert_eq!(entry.admin_name, "alice");
    let changes = entry.attribute_changes.as_ref().expect("changes");
    assert_eq!(changes.previous.href, "/old");
    assert_eq!(changes.new.href, "/new");
    assert_eq!(changes.new.target, "_blank");
}

#[test]
fn patching_an_unknown_id_touches_nothing() {
    let (_dir, paths) = seed_site();
    let store = SectionStore::new(paths.sections_dir());
    let ledger = AuditLedger::new(paths.ledger_path());

    let request = PatchRequest::new("nope", "content", "alice");
    let outcome = apply_patch(&store, &ledger, None, &request).expect("patch");
    assert!(matches!(outcome, PatchOutcome::NotFound { .. }));
    assert_eq!(
        store.read("header.html").expect("read"),
        "<header><a data-id=\"cta\" href=\"/old\">Old label</a></header>"
    );
    assert!(ledger.read_events().expect("events").is_empty());
}
