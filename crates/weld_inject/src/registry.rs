use std::path::{Path, PathBuf};

use weld_store::{atomic_write, sha256_hex};

use crate::{Injection, InjectionError, InjectionKind, InjectionLocation, InjectionOrigin};

/// JSON-file registry of injections. Every mutation is a read, an in-memory
/// edit, and an atomic full-file rewrite.
#[derive(Debug, Clone)]
pub struct InjectionRegistry {
    path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct NewInjection {
    /// Minted from the name and creation instant when not supplied.
    pub injection_id: Option<String>,
    pub name: String,
    pub kind: InjectionKind,
    pub code: String,
    pub location: InjectionLocation,
    pub origin: InjectionOrigin,
    pub is_active: bool,
}

/// Partial update. `injection_id`, `origin`, `created_by` and `created_at`
/// are never writable; `code`/`kind`/`location` are additionally rejected
/// for system-origin records.
#[derive(Debug, Clone, Default)]
pub struct InjectionUpdate {
    pub name: Option<String>,
    pub kind: Option<InjectionKind>,
    pub code: Option<String>,
    pub location: Option<InjectionLocation>,
    pub is_active: Option<bool>,
}

impl InjectionUpdate {
    fn touches_system_content(&self) -> bool {
        self.kind.is_some() || self.code.is_some() || self.location.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InjectionFilter {
    pub kind: Option<InjectionKind>,
    pub location: Option<InjectionLocation>,
    pub origin: Option<InjectionOrigin>,
    pub is_active: Option<bool>,
}

impl InjectionRegistry {
    pub fn new(path: impl Into<PathBuf>) -> InjectionRegistry {
        InjectionRegistry { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Injection>, InjectionError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|err| InjectionError::Io(err.to_string()))?;
        serde_json::from_str(&text).map_err(|err| InjectionError::Json(err.to_string()))
    }

    fn save(&self, injections: &[Injection]) -> Result<(), InjectionError> {
        let text = serde_json::to_string_pretty(injections)
            .map_err(|err| InjectionError::Json(err.to_string()))?;
        atomic_write(&self.path, &text).map_err(|err| InjectionError::Io(err.to_string()))
    }

    pub fn create(
        &self,
        new: NewInjection,
        admin_name: &str,
    ) -> Result<Injection, InjectionError> {
        let mut injections = self.load()?;
        let now = chrono::Utc::now().to_rfc3339();
        let injection_id = match new.injection_id {
            Some(id) => id,
            None => mint_injection_id(&new.name, &now),
        };
        if injections.iter().any(|i| i.injection_id == injection_id) {
            return Err(InjectionError::DuplicateId(injection_id));
        }
        let injection = Injection {
            injection_id,
            name: new.name,
            kind: new.kind,
            code: new.code,
            location: new.location,
            origin: new.origin,
            is_active: new.is_active,
            created_by: admin_name.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        injections.push(injection.clone());
        self.save(&injections)?;
        Ok(injection)
    }

    pub fn update(
        &self,
        injection_id: &str,
        update: InjectionUpdate,
    ) -> Result<Injection, InjectionError> {
        let mut injections = self.load()?;
        let Some(existing) = injections
            .iter_mut()
            .find(|i| i.injection_id == injection_id)
        else {
            return Err(InjectionError::NotFound(injection_id.to_string()));
        };
        if existing.origin == InjectionOrigin::System && update.touches_system_content() {
            return Err(InjectionError::SystemImmutable(injection_id.to_string()));
        }
        if let Some(name) = update.name {
            existing.name = name;
        }
        if let Some(kind) = update.kind {
            existing.kind = kind;
        }
        if let Some(code) = update.code {
            existing.code = code;
        }
        if let Some(location) = update.location {
            existing.location = location;
        }
        if let Some(is_active) = update.is_active {
            existing.is_active = is_active;
        }
        existing.updated_at = chrono::Utc::now().to_rfc3339();
        let updated = existing.clone();
        self.save(&injections)?;
        Ok(updated)
    }

    /// Toggling activity is always permitted, system origin included.
    pub fn set_active(&self, injection_id: &str, active: bool) -> Result<Injection, InjectionError> {
        self.update(
            injection_id,
            InjectionUpdate {
                is_active: Some(active),
                ..InjectionUpdate::default()
            },
        )
    }

    pub fn delete(&self, injection_id: &str) -> Result<(), InjectionError> {
        let mut injections = self.load()?;
        let Some(existing) = injections.iter().find(|i| i.injection_id == injection_id) else {
            return Err(InjectionError::NotFound(injection_id.to_string()));
        };
        if existing.origin == InjectionOrigin::System {
            return Err(InjectionError::SystemImmutable(injection_id.to_string()));
        }
        injections.retain(|i| i.injection_id != injection_id);
        self.save(&injections)
    }

    pub fn get(&self, injection_id: &str) -> Result<Injection, InjectionError> {
        self.load()?
            .into_iter()
            .find(|i| i.injection_id == injection_id)
            .ok_or_else(|| InjectionError::NotFound(injection_id.to_string()))
    }

    /// Filtered listing, newest first.
    pub fn list(&self, filter: &InjectionFilter) -> Result<Vec<Injection>, InjectionError> {
        let mut injections: Vec<Injection> = self
            .load()?
            .into_iter()
            .filter(|i| {
                filter.kind.is_none_or(|k| i.kind == k)
                    && filter.location.is_none_or(|l| i.location == l)
                    && filter.origin.is_none_or(|o| i.origin == o)
                    && filter.is_active.is_none_or(|a| i.is_active == a)
            })
            .collect();
        injections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(injections)
    }

    /// Active injections for one anchor, ordered by creation time ascending.
    /// This is the order the renderer appends them in.
    pub fn active_by_location(
        &self,
        location: InjectionLocation,
    ) -> Result<Vec<Injection>, InjectionError> {
        let mut injections: Vec<Injection> = self
            .load()?
            .into_iter()
            .filter(|i| i.location == location && i.is_active)
            .collect();
        injections.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(injections)
    }
}

fn mint_injection_id(name: &str, created_at: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let digest = sha256_hex(&format!("{}|{}|{}", name, created_at, nanos));
    format!("injection-{}", &digest[..12])
}
