//! Service catalog
//!
//! Service names arrive from model output or webhook payloads and are
//! untrusted. A name is accepted only if it is a single plain path component,
//! is on the allow-list (when one is configured), and resolves to an existing
//! directory inside the services root.

use mender_core::config::ServicesConfig;
use mender_core::{MenderError, Result, ServiceCodeBundle, SourceFile};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const MAX_SERVICE_NAME_LEN: usize = 128;

/// Check that `name` is a single, plain path component
pub fn validate_service_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_SERVICE_NAME_LEN {
        return Err(MenderError::ServiceRejected(format!(
            "invalid service name length: {:?}",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(MenderError::ServiceRejected(format!(
            "path traversal not allowed: {}",
            name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(MenderError::ServiceRejected(format!(
            "service name contains illegal characters: {:?}",
            name
        )));
    }
    Ok(())
}

/// Known service directories and the source files inside them
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    root: PathBuf,
    extensions: Vec<String>,
    allow_list: Vec<String>,
}

impl ServiceCatalog {
    pub fn new(config: &ServicesConfig) -> Self {
        Self {
            root: config.root.clone(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            allow_list: config.allow_list.clone(),
        }
    }

    /// Directory for `name`, without any validation
    pub fn service_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Validate `name` and return its existing directory
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_service_name(name)?;

        if !self.allow_list.is_empty() && !self.allow_list.iter().any(|s| s == name) {
            return Err(MenderError::ServiceRejected(format!(
                "{} is not on the service allow-list",
                name
            )));
        }

        let dir = self.service_dir(name);
        if !dir.is_dir() {
            return Err(MenderError::ServiceRejected(format!(
                "no directory {}",
                dir.display()
            )));
        }

        // Symlinks must not lead outside the services root
        let root = self.root.canonicalize()?;
        let resolved = dir.canonicalize()?;
        if !resolved.starts_with(&root) {
            return Err(MenderError::ServiceRejected(format!(
                "{} resolves outside {}",
                dir.display(),
                self.root.display()
            )));
        }

        Ok(dir)
    }

    fn is_allowed_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|allowed| allowed == &e.to_lowercase()))
            .unwrap_or(false)
    }

    /// Gather allow-listed files under `dir` in sorted walk order
    ///
    /// Unreadable or non-UTF-8 files are logged and skipped.
    pub fn collect_bundle(&self, service_name: &str, dir: &Path) -> ServiceCodeBundle {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot walk {}: {}", dir.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.is_allowed_file(entry.path()) {
                continue;
            }

            let name = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");

            match std::fs::read_to_string(entry.path()) {
                Ok(content) => files.push(SourceFile { name, content }),
                Err(e) => warn!("Cannot read {}: {}", entry.path().display(), e),
            }
        }

        debug!("Collected {} files for {}", files.len(), service_name);
        ServiceCodeBundle {
            service_name: service_name.to_string(),
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn catalog(root: &Path, allow_list: &[&str]) -> ServiceCatalog {
        ServiceCatalog::new(&ServicesConfig {
            root: root.to_path_buf(),
            allow_list: allow_list.iter().map(|s| s.to_string()).collect(),
            ..ServicesConfig::default()
        })
    }

    #[test]
    fn test_validate_service_name() {
        assert!(validate_service_name("payments-api").is_ok());
        assert!(validate_service_name("web_1.v2").is_ok());
        for bad in ["", ".", "..", "../etc", "a/b", "web;rm -rf", "we b"] {
            assert!(validate_service_name(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_resolve_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let err = catalog(root.path(), &[]).resolve("web").unwrap_err();
        assert!(matches!(err, MenderError::ServiceRejected(_)));
    }

    #[test]
    fn test_resolve_respects_allow_list() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("web")).unwrap();
        fs::create_dir(root.path().join("db")).unwrap();

        let catalog = catalog(root.path(), &["web"]);
        assert_eq!(catalog.resolve("web").unwrap(), root.path().join("web"));
        assert!(catalog.resolve("db").is_err());
    }

    #[test]
    fn test_collect_bundle_filters_and_sorts() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("web");
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("main.py"), "print('hi')").unwrap();
        fs::write(dir.join("README.md"), "docs").unwrap();
        fs::write(dir.join("src/app.TS"), "let x = 1;").unwrap();
        fs::write(dir.join("src/b.rs"), "fn main() {}").unwrap();

        let bundle = catalog(root.path(), &[]).collect_bundle("web", &dir);
        let names: Vec<&str> = bundle.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["main.py", "src/app.TS", "src/b.rs"]);
        assert!(bundle.render().starts_with("--- FILE: main.py\nprint('hi')\n"));
    }

    #[test]
    fn test_collect_bundle_empty() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("web");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("notes.txt"), "nothing to see").unwrap();

        assert!(catalog(root.path(), &[]).collect_bundle("web", &dir).is_empty());
    }
}
