use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Site directory layout. Everything hangs off one root:
///
/// ```text
/// <root>/src/sections/*.html   section files (source of truth)
/// <root>/src/scripts/admin.js  admin asset copied on build
/// <root>/dist/index.html       compiled servable document
/// <root>/out/audit.jsonl       append-only audit ledger
/// <root>/out/injections.json   injection registry
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitePaths {
    pub root: PathBuf,
}

impl Default for SitePaths {
    fn default() -> Self {
        SitePaths {
            root: PathBuf::from("."),
        }
    }
}

impl SitePaths {
    pub fn new(root: impl Into<PathBuf>) -> SitePaths {
        SitePaths { root: root.into() }
    }

    /// Root from an explicit CLI flag, falling back to `WELD_SITE_ROOT`,
    /// falling back to the current directory.
    pub fn from_cli_and_env(root: Option<PathBuf>) -> SitePaths {
        if let Some(root) = root {
            return SitePaths::new(root);
        }
        if let Ok(root) = std::env::var("WELD_SITE_ROOT") {
            if !root.is_empty() {
                return SitePaths::new(root);
            }
        }
        SitePaths::default()
    }

    pub fn sections_dir(&self) -> PathBuf {
        self.root.join("src").join("sections")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("src").join("scripts")
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.root.join("dist")
    }

    pub fn dist_scripts_dir(&self) -> PathBuf {
        self.dist_dir().join("scripts")
    }

    pub fn output_index(&self) -> PathBuf {
        self.dist_dir().join("index.html")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join("out").join("audit.jsonl")
    }

    pub fn injections_path(&self) -> PathBuf {
        self.root.join("out").join("injections.json")
    }

    pub fn admin_script(&self) -> PathBuf {
        self.scripts_dir().join("admin.js")
    }
}

impl AsRef<Path> for SitePaths {
    fn as_ref(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_root() {
        let paths = SitePaths::new("/srv/site");
        assert_eq!(paths.sections_dir(), PathBuf::from("/srv/site/src/sections"));
        assert_eq!(paths.output_index(), PathBuf::from("/srv/site/dist/index.html"));
        assert_eq!(paths.ledger_path(), PathBuf::from("/srv/site/out/audit.jsonl"));
    }

    #[test]
    fn cli_root_wins_over_default() {
        let paths = SitePaths::from_cli_and_env(Some(PathBuf::from("/tmp/x")));
        assert_eq!(paths.root, PathBuf::from("/tmp/x"));
    }
}
