//! Section store: a directory of independent HTML fragments, each the
//! authoritative copy of one site section. Files are the unit of storage;
//! writes are atomic (temp file + rename in the same directory) so a reader
//! sees old content or new content, never a torn mix.

mod config;
mod mirror;

pub use config::SitePaths;
pub use mirror::{MirrorSection, MirrorStore};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

#[derive(Debug)]
pub enum StoreError {
    Io(String),
    InvalidFilename(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "section store io error: {}", err),
            StoreError::InvalidFilename(name) => {
                write!(f, "invalid section filename: {}", name)
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Lowercase hex sha256 of a text payload. Used for sync change detection
/// and for minting stable ids.
pub fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Write `text` to `path` atomically via a sibling temp file and rename.
pub fn atomic_write(path: &Path, text: &str) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Io(format!("no parent directory for {}", path.display())))?;
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|err| StoreError::Io(err.to_string()))?;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|err| StoreError::Io(err.to_string()))?
        .as_nanos();
    let tmp = parent.join(format!(
        ".{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("weld"),
        nanos
    ));
    fs::write(&tmp, text).map_err(|err| StoreError::Io(err.to_string()))?;
    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        StoreError::Io(err.to_string())
    })?;
    Ok(())
}

/// The directory of section files.
#[derive(Debug, Clone)]
pub struct SectionStore {
    dir: PathBuf,
}

impl SectionStore {
    pub fn new(dir: impl Into<PathBuf>) -> SectionStore {
        SectionStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Section filenames in lexicographic order. The patch engine's scan
    /// order (and therefore its tie-breaking) depends on this being stable.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|err| StoreError::Io(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::Io(err.to_string()))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.to_ascii_lowercase().ends_with(".html") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn path_for(&self, filename: &str) -> Result<PathBuf, StoreError> {
        validate_filename(filename)?;
        Ok(self.dir.join(filename))
    }

    pub fn read(&self, filename: &str) -> Result<String, StoreError> {
        let path = self.path_for(filename)?;
        fs::read_to_string(&path)
            .map_err(|err| StoreError::Io(format!("{}: {}", path.display(), err)))
    }

    pub fn write(&self, filename: &str, text: &str) -> Result<(), StoreError> {
        let path = self.path_for(filename)?;
        atomic_write(&path, text)
    }

    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|err| StoreError::Io(err.to_string()))?;
        }
        Ok(())
    }
}

/// Section filenames are bare names inside the store, never paths.
fn validate_filename(filename: &str) -> Result<(), StoreError> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename == "."
        || filename == ".."
    {
        return Err(StoreError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(label: &str) -> SectionStore {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("weld-store-{}-{}", label, nanos));
        let store = SectionStore::new(dir);
        store.ensure_dir().expect("create store dir");
        store
    }

    #[test]
    fn list_is_lexicographic_and_html_only() {
        let store = temp_store("list");
        store.write("zeta.html", "<p>z</p>").expect("write");
        store.write("alpha.html", "<p>a</p>").expect("write");
        store.write("notes.txt", "skip").expect("write");
        assert_eq!(store.list().expect("list"), vec!["alpha.html", "zeta.html"]);
    }

    #[test]
    fn write_then_read_round_trips() {
        let store = temp_store("rw");
        store.write("hero.html", "<h1>Hi</h1>").expect("write");
        assert_eq!(store.read("hero.html").expect("read"), "<h1>Hi</h1>");
    }

    #[test]
    fn path_traversal_is_rejected() {
        let store = temp_store("traversal");
        assert!(matches!(
            store.read("../escape.html"),
            Err(StoreError::InvalidFilename(_))
        ));
        assert!(matches!(
            store.write("a/b.html", "x"),
            Err(StoreError::InvalidFilename(_))
        ));
    }

    #[test]
    fn missing_store_dir_lists_empty() {
        let store = SectionStore::new(std::env::temp_dir().join("weld-store-never-created"));
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
