use weld_html::{Attr, Document, QuoteStyle};

use crate::{Injection, InjectionKind, InjectionLocation};

#[derive(Debug, Clone)]
pub struct RenderReport {
    pub output: String,
    /// False when the request path or document shape made rendering a no-op.
    pub applied: bool,
    pub warnings: Vec<String>,
}

impl RenderReport {
    fn unchanged(text: &str, warnings: Vec<String>) -> RenderReport {
        RenderReport {
            output: text.to_string(),
            applied: false,
            warnings,
        }
    }
}

/// Splice active injections into a servable document. Only the site root
/// (`/`) and `.html` paths are candidates, and only documents carrying an
/// HTML doctype are touched. Rendering must never break page delivery:
/// every failure path returns the original text unchanged.
pub fn render_document(
    text: &str,
    request_path: &str,
    head_injections: &[Injection],
    body_injections: &[Injection],
) -> RenderReport {
    if request_path != "/" && !request_path.to_ascii_lowercase().ends_with(".html") {
        return RenderReport::unchanged(text, Vec::new());
    }
    if !contains_ci(text, "<!DOCTYPE html>") {
        return RenderReport::unchanged(text, Vec::new());
    }

    let mut doc = match Document::parse(text) {
        Ok(doc) => doc,
        Err(err) => {
            return RenderReport::unchanged(text, vec![format!("render parse failed: {}", err)]);
        }
    };

    let mut warnings = Vec::new();
    inject_at(
        &mut doc,
        InjectionLocation::BeforeHeadClose,
        head_injections,
        &mut warnings,
    );
    inject_at(
        &mut doc,
        InjectionLocation::BeforeBodyClose,
        body_injections,
        &mut warnings,
    );

    RenderReport {
        output: doc.serialize(),
        applied: true,
        warnings,
    }
}

/// Append each injection as the last child of the anchor element, skipping
/// ids already present. A missing anchor element skips that location
/// silently.
fn inject_at(
    doc: &mut Document,
    location: InjectionLocation,
    injections: &[Injection],
    warnings: &mut Vec<String>,
) {
    if injections.is_empty() {
        return;
    }
    let Some(anchor) = doc.find_first_tag(location.anchor_tag()) else {
        return;
    };
    for injection in injections {
        if injection.location != location {
            warnings.push(format!(
                "injection {} routed to wrong anchor {}",
                injection.injection_id,
                location.as_str()
            ));
            continue;
        }
        let element_id = injection.element_id();
        if doc.has_element_id(&element_id) {
            continue;
        }
        let tag = match injection.kind {
            InjectionKind::Script => "script",
            InjectionKind::Style => "style",
        };
        let element = doc.create_element(
            tag,
            vec![Attr {
                name: "id".to_string(),
                value: Some(element_id),
                quote: QuoteStyle::Double,
            }],
        );
        let code = doc.create_text(&injection.code);
        doc.append_child(element, code);
        doc.append_child(anchor, element);
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InjectionOrigin;

    fn injection(id: &str, kind: InjectionKind, location: InjectionLocation) -> Injection {
        Injection {
            injection_id: id.to_string(),
            name: id.to_string(),
            kind,
            code: match kind {
                InjectionKind::Script => "console.log('x');".to_string(),
                InjectionKind::Style => "body { margin: 0; }".to_string(),
            },
            location,
            origin: InjectionOrigin::User,
            is_active: true,
            created_by: "alice".to_string(),
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    const DOC: &str =
        "<!DOCTYPE html><html><head><title>t</title></head><body><p>hi</p></body></html>";

    #[test]
    fn injects_script_into_head_and_style_into_body() {
        let head = [injection("h1x", InjectionKind::Script, InjectionLocation::BeforeHeadClose)];
        let body = [injection("b1x", InjectionKind::Style, InjectionLocation::BeforeBodyClose)];
        let report = render_document(DOC, "/", &head, &body);
        assert!(report.applied);
        assert!(report
            .output
            .contains("<script id=\"injection-h1x\">console.log('x');</script></head>"));
        assert!(report
            .output
            .contains("<style id=\"injection-b1x\">body { margin: 0; }</style></body>"));
    }

    #[test]
    fn rendering_twice_is_idempotent() {
        let head = [injection("once", InjectionKind::Script, InjectionLocation::BeforeHeadClose)];
        let first = render_document(DOC, "/index.html", &head, &[]);
        let second = render_document(&first.output, "/index.html", &head, &[]);
        assert_eq!(first.output, second.output);
        assert_eq!(second.output.matches("injection-once").count(), 1);
    }

    #[test]
    fn non_html_path_is_untouched() {
        let head = [injection("x", InjectionKind::Script, InjectionLocation::BeforeHeadClose)];
        let report = render_document(DOC, "/logo.png", &head, &[]);
        assert!(!report.applied);
        assert_eq!(report.output, DOC);
    }

    #[test]
    fn document_without_doctype_is_untouched() {
        let head = [injection("x", InjectionKind::Script, InjectionLocation::BeforeHeadClose)];
        let report = render_document("<html><head></head></html>", "/", &head, &[]);
        assert!(!report.applied);
        assert_eq!(report.output, "<html><head></head></html>");
    }

    #[test]
    fn missing_body_skips_that_location_silently() {
        let text = "<!DOCTYPE html><html><head></head></html>";
        let body = [injection("b", InjectionKind::Script, InjectionLocation::BeforeBodyClose)];
        let report = render_document(text, "/", &[], &body);
        assert!(report.applied);
        assert_eq!(report.output, text);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn unparseable_document_returns_original_text() {
        let text = "<!DOCTYPE html><html><head><!-- broken";
        let head = [injection("x", InjectionKind::Script, InjectionLocation::BeforeHeadClose)];
        let report = render_document(text, "/", &head, &[]);
        assert!(!report.applied);
        assert_eq!(report.output, text);
        assert_eq!(report.warnings.len(), 1);
    }
}
