//! Script/style injections: registered snippets spliced into served HTML at
//! fixed anchor points.
//!
//! The registry is a JSON file holding every registered injection; the
//! renderer post-processes a servable document, appending one `<script>` or
//! `<style>` element per active injection, deduplicated by a deterministic
//! element id so re-rendering an already-rendered document is a no-op.

mod registry;
mod render;

pub use registry::{InjectionFilter, InjectionRegistry, InjectionUpdate, NewInjection};
pub use render::{render_document, RenderReport};

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum InjectionError {
    NotFound(String),
    /// System-origin injections refuse content changes and deletion.
    SystemImmutable(String),
    DuplicateId(String),
    Io(String),
    Json(String),
}

impl fmt::Display for InjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionError::NotFound(id) => write!(f, "injection not found: {}", id),
            InjectionError::SystemImmutable(id) => {
                write!(f, "system injection is immutable: {}", id)
            }
            InjectionError::DuplicateId(id) => write!(f, "injection id already exists: {}", id),
            InjectionError::Io(err) => write!(f, "injection registry io error: {}", err),
            InjectionError::Json(err) => write!(f, "injection registry json error: {}", err),
        }
    }
}

impl std::error::Error for InjectionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionKind {
    Script,
    Style,
}

impl InjectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionKind::Script => "script",
            InjectionKind::Style => "style",
        }
    }
}

/// The two valid anchor identifiers; no others exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InjectionLocation {
    BeforeHeadClose,
    BeforeBodyClose,
}

impl InjectionLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionLocation::BeforeHeadClose => "before-head-close",
            InjectionLocation::BeforeBodyClose => "before-body-close",
        }
    }

    pub fn anchor_tag(&self) -> &'static str {
        match self {
            InjectionLocation::BeforeHeadClose => "head",
            InjectionLocation::BeforeBodyClose => "body",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionOrigin {
    User,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injection {
    pub injection_id: String,
    pub name: String,
    pub kind: InjectionKind,
    pub code: String,
    pub location: InjectionLocation,
    pub origin: InjectionOrigin,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Injection {
    /// Deterministic element id used for in-document deduplication.
    pub fn element_id(&self) -> String {
        format!("injection-{}", self.injection_id)
    }
}
