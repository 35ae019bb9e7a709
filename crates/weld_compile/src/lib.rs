//! Include expander: assembles section files into one flat servable
//! document by replacing `<!-- Include file.html -->` directives with the
//! referenced section's content, recursively.
//!
//! Resolution failures never abort a build. A missing file or a cyclic
//! include leaves the directive text in place and adds a warning to the
//! report; only an unreadable root document is fatal.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use weld_store::{atomic_write, SectionStore, SitePaths};

#[derive(Debug)]
pub enum CompileError {
    /// The root document could not be read. The only fatal condition.
    RootUnreadable(String),
    Write(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::RootUnreadable(err) => write!(f, "root document unreadable: {}", err),
            CompileError::Write(err) => write!(f, "build artifact write failed: {}", err),
        }
    }
}

impl std::error::Error for CompileError {}

/// One directive occurrence: the byte span of the whole comment and the
/// filename it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub filename: String,
    pub start: usize,
    pub end: usize,
}

/// Scan raw text for `<!-- Include file.html -->` occurrences, left to
/// right. The keyword is case-insensitive; the filename is a single token
/// ending in `.html` with nothing but whitespace allowed around it.
pub fn find_directives(text: &str) -> Vec<Directive> {
    let bytes = text.as_bytes();
    let mut directives = Vec::new();
    let mut pos = 0;
    while let Some(open) = find_sub(bytes, b"<!--", pos) {
        let Some(close) = find_sub(bytes, b"-->", open + 4) else {
            break;
        };
        let body = &text[open + 4..close];
        if let Some(filename) = parse_directive_body(body) {
            directives.push(Directive {
                filename: filename.to_string(),
                start: open,
                end: close + 3,
            });
        }
        pos = close + 3;
    }
    directives
}

fn parse_directive_body(body: &str) -> Option<&str> {
    let trimmed = body.trim();
    let keyword = trimmed.get(..7)?;
    if !keyword.eq_ignore_ascii_case("include") {
        return None;
    }
    let rest = &trimmed[7..];
    if !rest.starts_with(|c: char| c.is_ascii_whitespace()) {
        return None;
    }
    let filename = rest.trim();
    if filename.is_empty()
        || filename.contains(|c: char| c.is_ascii_whitespace())
        || filename.contains('>')
    {
        return None;
    }
    if !filename.to_ascii_lowercase().ends_with(".html") {
        return None;
    }
    Some(filename)
}

fn find_sub(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

#[derive(Debug, Clone)]
pub struct CompileReport {
    pub output: String,
    pub warnings: Vec<String>,
}

/// Expand all directives in the root section and return the flat document.
/// Does not persist anything; see [`build`].
pub fn compile(store: &SectionStore, root_section: &str) -> Result<CompileReport, CompileError> {
    let root_text = store
        .read(root_section)
        .map_err(|err| CompileError::RootUnreadable(err.to_string()))?;
    let mut warnings = Vec::new();
    let mut visited = BTreeSet::new();
    visited.insert(root_section.to_string());
    let output = expand(store, &root_text, &mut visited, &mut warnings);
    Ok(CompileReport { output, warnings })
}

/// Recursive expansion with a per-branch cycle guard: a filename already on
/// the current recursion path is a cycle and stays literal, but the same
/// filename may be included again from a sibling branch. Directive spans are
/// captured against the pre-mutation text and replaced right to left, so
/// text introduced by a replacement is never re-scanned at this level (each
/// included file's own directives were already handled during its recursive
/// expansion).
fn expand(
    store: &SectionStore,
    text: &str,
    visited: &mut BTreeSet<String>,
    warnings: &mut Vec<String>,
) -> String {
    let directives = find_directives(text);
    let mut output = text.to_string();
    for directive in directives.iter().rev() {
        if visited.contains(&directive.filename) {
            warnings.push(format!("circular include detected: {}", directive.filename));
            continue;
        }
        let included = match store.read(&directive.filename) {
            Ok(included) => included,
            Err(_) => {
                warnings.push(format!("include file not found: {}", directive.filename));
                continue;
            }
        };
        visited.insert(directive.filename.clone());
        let expanded = expand(store, &included, visited, warnings);
        visited.remove(&directive.filename);
        output.replace_range(directive.start..directive.end, &expanded);
    }
    output
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub output_path: PathBuf,
    pub warnings: Vec<String>,
    pub admin_script_copied: bool,
}

/// Compile the root section and persist the servable document, overwriting
/// any previous build artifact. Also copies the admin script asset into the
/// output scripts directory when present.
pub fn build(
    store: &SectionStore,
    paths: &SitePaths,
    root_section: &str,
) -> Result<BuildReport, CompileError> {
    let report = compile(store, root_section)?;
    let mut warnings = report.warnings;

    let output_path = paths.output_index();
    atomic_write(&output_path, &report.output)
        .map_err(|err| CompileError::Write(err.to_string()))?;

    let admin_script = paths.admin_script();
    let admin_script_copied = if admin_script.exists() {
        let target = paths.dist_scripts_dir().join("admin.js");
        copy_file(&admin_script, &target).map_err(CompileError::Write)?;
        true
    } else {
        warnings.push(format!("admin script not found: {}", admin_script.display()));
        false
    };

    Ok(BuildReport {
        output_path,
        warnings,
        admin_script_copied,
    })
}

fn copy_file(from: &std::path::Path, to: &std::path::Path) -> Result<(), String> {
    if let Some(parent) = to.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|err| err.to_string())?;
        }
    }
    fs::copy(from, to).map_err(|err| err.to_string())?;
    Ok(())
}
