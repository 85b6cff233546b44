//! package.json loading, in-place edits and guaranteed restoration
//!
//! The publish run edits `package.json` (name/version overrides, local path
//! dependencies, `npm version`). [`ManifestGuard`] snapshots the original
//! bytes before any edit and writes them back when it is restored or
//! dropped, so the working tree is clean after success, error or panic.

use crate::core::error::PublishError;
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const MANIFEST_FILE: &str = "package.json";
pub const LOCKFILE: &str = "package-lock.json";

/// Dependency sections shipped to consumers
const DEPENDENCY_SECTIONS: &[&str] = &["dependencies", "peerDependencies", "optionalDependencies"];

/// A package.json document; unknown fields are preserved in order
#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    path: PathBuf,
    document: Map<String, Value>,
}

/// A `file:` dependency rewritten to a registry version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub section: String,
    pub name: String,
    pub from: String,
    pub to: String,
}

impl PackageManifest {
    /// Load `<dir>/package.json`
    pub async fn load(dir: &Path) -> Result<Self, PublishError> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PublishError::ManifestNotFound {
                    path: path.display().to_string(),
                }
            } else {
                PublishError::Io(e)
            }
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: PathBuf, content: &str) -> Result<Self, PublishError> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| PublishError::ManifestInvalid {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        match value {
            Value::Object(document) => Ok(Self { path, document }),
            _ => Err(PublishError::ManifestInvalid {
                path: path.display().to_string(),
                message: "expected a JSON object".to_string(),
            }),
        }
    }

    fn string_field(&self, field: &str) -> Option<&str> {
        self.document
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.string_field("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.string_field("version")
    }

    pub fn description(&self) -> Option<&str> {
        self.string_field("description")
    }

    pub fn main(&self) -> Option<&str> {
        self.string_field("main")
    }

    /// Name or a `MissingField` error
    pub fn require_name(&self) -> Result<&str, PublishError> {
        self.name().ok_or_else(|| self.missing("name"))
    }

    /// Version or a `MissingField` error
    pub fn require_version(&self) -> Result<&str, PublishError> {
        self.version().ok_or_else(|| self.missing("version"))
    }

    fn missing(&self, field: &str) -> PublishError {
        PublishError::MissingField {
            path: self.path.display().to_string(),
            field: field.to_string(),
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.document
            .insert("name".to_string(), Value::String(name.to_string()));
    }

    pub fn set_version(&mut self, version: &str) {
        self.document
            .insert("version".to_string(), Value::String(version.to_string()));
    }

    /// Names of the peer dependencies (treated as externals by the library build)
    pub fn peer_dependency_names(&self) -> Vec<String> {
        self.document
            .get("peerDependencies")
            .and_then(Value::as_object)
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace `file:` dependency specs with the version of the referenced package
    ///
    /// Targets that cannot be read are left untouched and logged.
    pub async fn resolve_local_dependencies(&mut self) -> Vec<ResolvedDependency> {
        let base = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut resolved = Vec::new();

        for section in DEPENDENCY_SECTIONS {
            let Some(Value::Object(deps)) = self.document.get_mut(*section) else {
                continue;
            };

            for (name, spec) in deps.iter_mut() {
                let Some(local) = spec.as_str().and_then(|s| s.strip_prefix("file:")) else {
                    continue;
                };
                let target = base.join(local);
                match PackageManifest::load(&target).await {
                    Ok(manifest) => match manifest.version() {
                        Some(version) => {
                            resolved.push(ResolvedDependency {
                                section: section.to_string(),
                                name: name.clone(),
                                from: format!("file:{}", local),
                                to: version.to_string(),
                            });
                            *spec = Value::String(version.to_string());
                        }
                        None => log::warn!(
                            "Local dependency {} at {} has no version",
                            name,
                            target.display()
                        ),
                    },
                    Err(e) => log::warn!("Could not resolve local dependency {}: {}", name, e),
                }
            }
        }

        resolved
    }

    /// Serialize the way npm writes package.json (2 spaces, trailing newline)
    pub fn to_json_string(&self) -> Result<String, PublishError> {
        let mut text = serde_json::to_string_pretty(&self.document)?;
        text.push('\n');
        Ok(text)
    }

    pub async fn save(&self) -> Result<(), PublishError> {
        fs::write(&self.path, self.to_json_string()?).await?;
        Ok(())
    }
}

/// Restores package.json (and the lockfile) to their original bytes
///
/// Restoration happens in [`ManifestGuard::restore`] on the normal path and
/// in `Drop` on every other path.
#[derive(Debug)]
pub struct ManifestGuard {
    snapshots: Vec<(PathBuf, Option<Vec<u8>>)>,
    restored: bool,
}

impl ManifestGuard {
    /// Snapshot `<dir>/package.json` and `<dir>/package-lock.json`
    pub fn acquire(dir: &Path) -> Result<Self, PublishError> {
        let manifest = dir.join(MANIFEST_FILE);
        let original = std::fs::read(&manifest).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PublishError::ManifestNotFound {
                    path: manifest.display().to_string(),
                }
            } else {
                PublishError::Io(e)
            }
        })?;

        let lockfile = dir.join(LOCKFILE);
        let lock_original = match std::fs::read(&lockfile) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(PublishError::Io(e)),
        };

        Ok(Self {
            snapshots: vec![(manifest, Some(original)), (lockfile, lock_original)],
            restored: false,
        })
    }

    /// Write the original contents back
    pub fn restore(mut self) -> io::Result<()> {
        self.restore_all()
    }

    fn restore_all(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        let mut first_error = None;
        for (path, original) in &self.snapshots {
            let result = match original {
                Some(bytes) => match std::fs::read(path) {
                    Ok(current) if &current == bytes => Ok(()),
                    _ => std::fs::write(path, bytes),
                },
                None if path.exists() => std::fs::remove_file(path),
                None => Ok(()),
            };
            if let Err(e) = result {
                log::error!("Failed to restore {}: {}", path.display(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                log::debug!("Restored package manifest");
                Ok(())
            }
        }
    }
}

impl Drop for ManifestGuard {
    fn drop(&mut self) {
        // Errors are already logged by restore_all
        let _ = self.restore_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ORIGINAL: &str = "{\n    \"name\": \"pkg\",\n    \"version\": \"1.0.0\",\n    \"main\": \"index.ts\"\n}";

    fn write_manifest(dir: &Path, content: &str) {
        std::fs::write(dir.join(MANIFEST_FILE), content).unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let result = PackageManifest::load(dir.path()).await;
        assert!(matches!(result, Err(PublishError::ManifestNotFound { .. })));
    }

    #[tokio::test]
    async fn test_load_invalid_manifest() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "[1, 2]");
        let result = PackageManifest::load(dir.path()).await;
        assert!(matches!(result, Err(PublishError::ManifestInvalid { .. })));
    }

    #[tokio::test]
    async fn test_fields_and_overrides_preserve_order() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), ORIGINAL);

        let mut manifest = PackageManifest::load(dir.path()).await.unwrap();
        assert_eq!(manifest.name(), Some("pkg"));
        assert_eq!(manifest.version(), Some("1.0.0"));
        assert_eq!(manifest.main(), Some("index.ts"));
        assert_eq!(manifest.description(), None);

        manifest.set_name("@scope/renamed");
        manifest.set_version("2.0.0-next");
        let text = manifest.to_json_string().unwrap();
        let name_pos = text.find("\"name\"").unwrap();
        let main_pos = text.find("\"main\"").unwrap();
        assert!(name_pos < main_pos);
        assert!(text.contains("\"@scope/renamed\""));
        assert!(text.ends_with("}\n"));
    }

    #[tokio::test]
    async fn test_require_missing_version() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), r#"{"name": "pkg"}"#);
        let manifest = PackageManifest::load(dir.path()).await.unwrap();
        assert!(matches!(
            manifest.require_version(),
            Err(PublishError::MissingField { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_local_dependencies() {
        let dir = TempDir::new().unwrap();
        let sibling = dir.path().join("shared");
        std::fs::create_dir_all(&sibling).unwrap();
        write_manifest(&sibling, r#"{"name": "shared", "version": "3.1.4"}"#);

        let pkg = dir.path().join("pkg");
        std::fs::create_dir_all(&pkg).unwrap();
        write_manifest(
            &pkg,
            r#"{"name": "pkg", "version": "1.0.0",
                "dependencies": {"shared": "file:../shared", "left-pad": "^1.0.0", "gone": "file:../missing"},
                "devDependencies": {"shared": "file:../shared"}}"#,
        );

        let mut manifest = PackageManifest::load(&pkg).await.unwrap();
        let resolved = manifest.resolve_local_dependencies().await;

        assert_eq!(
            resolved,
            vec![ResolvedDependency {
                section: "dependencies".to_string(),
                name: "shared".to_string(),
                from: "file:../shared".to_string(),
                to: "3.1.4".to_string(),
            }]
        );
        let text = manifest.to_json_string().unwrap();
        assert!(text.contains("\"shared\": \"3.1.4\""));
        assert!(text.contains("\"gone\": \"file:../missing\""));
        assert!(text.contains("\"devDependencies\": {\n    \"shared\": \"file:../shared\""));
    }

    #[tokio::test]
    async fn test_guard_restores_on_explicit_restore() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), ORIGINAL);

        let guard = ManifestGuard::acquire(dir.path()).unwrap();
        let mut manifest = PackageManifest::load(dir.path()).await.unwrap();
        manifest.set_version("9.9.9");
        manifest.save().await.unwrap();
        std::fs::write(dir.path().join(LOCKFILE), "{}").unwrap();

        guard.restore().unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap(),
            ORIGINAL
        );
        assert!(!dir.path().join(LOCKFILE).exists());
    }

    #[tokio::test]
    async fn test_guard_restores_on_error_path() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), ORIGINAL);
        std::fs::write(dir.path().join(LOCKFILE), "lock-v1").unwrap();

        async fn failing_run(dir: &Path) -> Result<(), PublishError> {
            let _guard = ManifestGuard::acquire(dir)?;
            std::fs::write(dir.join(MANIFEST_FILE), "{\"version\": \"mutated\"}")?;
            std::fs::write(dir.join(LOCKFILE), "lock-v2")?;
            Err(PublishError::Config("boom".to_string()))
        }

        assert!(failing_run(dir.path()).await.is_err());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap(),
            ORIGINAL
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join(LOCKFILE)).unwrap(),
            "lock-v1"
        );
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), ORIGINAL);
        let path = dir.path().to_path_buf();

        let result = std::panic::catch_unwind(|| {
            let _guard = ManifestGuard::acquire(&path).unwrap();
            std::fs::write(path.join(MANIFEST_FILE), "garbage").unwrap();
            panic!("publish step panicked");
        });

        assert!(result.is_err());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap(),
            ORIGINAL
        );
    }

    #[test]
    fn test_guard_requires_manifest() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ManifestGuard::acquire(dir.path()),
            Err(PublishError::ManifestNotFound { .. })
        ));
    }
}
