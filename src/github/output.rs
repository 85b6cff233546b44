//! Step outputs written to the file named by `GITHUB_OUTPUT`

use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends `key=value` lines to the CI output file; a no-op outside CI
#[derive(Debug, Clone, Default)]
pub struct CiOutput {
    path: Option<PathBuf>,
}

impl CiOutput {
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
        }
    }

    /// Write one output; multi-line values use a random heredoc delimiter
    ///
    /// Failures are logged; outputs never abort a run.
    pub fn set(&self, key: &str, value: &str) {
        let Some(path) = &self.path else {
            log::debug!("GITHUB_OUTPUT not set, skipping output {}", key);
            return;
        };

        if let Err(e) = append(path, &format_entry(key, value)) {
            log::warn!("Failed to write output {} to {}: {}", key, path.display(), e);
        }
    }
}

fn format_entry(key: &str, value: &str) -> String {
    if value.contains('\n') {
        let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
        format!("{}<<{}\n{}\n{}\n", key, delimiter, value, delimiter)
    } else {
        format!("{}={}\n", key, value)
    }
}

fn append(path: &Path, entry: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(entry.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_line_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output");
        let output = CiOutput::new(Some(&path));

        output.set("package-name", "@scope/pkg");
        output.set("package-published", "true");

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "package-name=@scope/pkg\npackage-published=true\n"
        );
    }

    #[test]
    fn test_multi_line_value_uses_heredoc() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output");
        CiOutput::new(Some(&path)).set("diff-summary", "- Added X\n- Fixed Y");

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        let header = lines.next().unwrap();
        let delimiter = header.strip_prefix("diff-summary<<").unwrap();
        assert!(delimiter.starts_with("ghadelimiter_"));
        assert_eq!(lines.next(), Some("- Added X"));
        assert_eq!(lines.next(), Some("- Fixed Y"));
        assert_eq!(lines.next(), Some(delimiter));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_disabled_without_path() {
        CiOutput::new(None).set("build-time", "now");
    }
}
