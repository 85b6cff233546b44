//! Sync the companion Unity package (`unity/package.json`, `unity/*.npmdef`)

use super::manifest::{MANIFEST_FILE, PackageManifest};
use crate::core::error::PublishError;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const UNITY_DIR: &str = "unity";
const NPMDEF_EXTENSION: &str = "npmdef";

/// Files touched by [`update_npmdef`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NpmdefUpdate {
    pub package_json: Option<PathBuf>,
    pub npmdefs: Vec<PathBuf>,
}

/// Copy name, version and description of `<dir>/package.json` into `<dir>/unity`
///
/// A missing `unity/` directory only logs a warning.
pub async fn update_npmdef(dir: &Path) -> Result<NpmdefUpdate, PublishError> {
    let manifest = PackageManifest::load(dir).await?;
    let unity_dir = dir.join(UNITY_DIR);
    let mut update = NpmdefUpdate::default();

    if !unity_dir.is_dir() {
        log::warn!(
            "No unity directory found at {}. Skipping npmdef update.",
            unity_dir.display()
        );
        return Ok(update);
    }

    let version = manifest.require_version()?.to_string();

    let unity_manifest = unity_dir.join(MANIFEST_FILE);
    if unity_manifest.is_file() {
        let mut document = read_object(&unity_manifest)?;
        document.insert("version".to_string(), Value::String(version.clone()));
        if let Some(description) = manifest.description() {
            document.insert(
                "description".to_string(),
                Value::String(description.to_string()),
            );
        }
        write_indented(&unity_manifest, &Value::Object(document))?;
        log::info!("Updated unity package.json at {}", unity_manifest.display());
        update.package_json = Some(unity_manifest);
    }

    let name = manifest.require_name()?.to_string();
    let mut npmdefs: Vec<PathBuf> = WalkDir::new(&unity_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(NPMDEF_EXTENSION))
        .collect();
    npmdefs.sort();

    for path in npmdefs {
        log::info!("Update npmdef: {}", path.display());
        let mut document = read_object(&path)?;
        document.insert("packageName".to_string(), Value::String(name.clone()));
        document.insert("packageVersion".to_string(), Value::String(version.clone()));
        write_indented(&path, &Value::Object(document))?;
        update.npmdefs.push(path);
    }

    Ok(update)
}

fn read_object(path: &Path) -> Result<serde_json::Map<String, Value>, PublishError> {
    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PublishError::ManifestInvalid {
            path: path.display().to_string(),
            message: "expected a JSON object".to_string(),
        }),
        Err(e) => Err(PublishError::ManifestInvalid {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}

/// Unity expects 4-space indentation
fn write_indented(path: &Path, value: &Value) -> Result<(), PublishError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    std::fs::write(path, buffer)?;
    Ok(())
}
