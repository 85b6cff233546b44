//! Version policy - derives the version that gets published
//!
//! The published version is the manifest version with an optional dist-tag
//! and short commit hash folded into the pre-release part:
//!
//! ```
//! use npm_publish_helper::npm::version_policy::{next_version, VersionInputs};
//!
//! let next = next_version(&VersionInputs {
//!     current: "1.2.0-beta.abc123",
//!     hash: Some("def456"),
//!     tag: Some("next"),
//!     use_tag_in_version: true,
//!     use_hash_in_version: true,
//! });
//! assert_eq!(next, "1.2.0-next.def456");
//! ```

use crate::core::error::PublishError;
use semver::Version;

/// Dist-tag that never ends up in a version string
pub const LATEST_TAG: &str = "latest";

/// Dist-tag used for pre-releases that carry no usable identifier
pub const DEFAULT_PRERELEASE_TAG: &str = "next";

/// Inputs of [`next_version`]
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionInputs<'a> {
    pub current: &'a str,
    pub hash: Option<&'a str>,
    pub tag: Option<&'a str>,
    pub use_tag_in_version: bool,
    pub use_hash_in_version: bool,
}

/// Reduce a tag to its last non-empty path segment
///
/// Tags derived from git refs (`refs/heads/feature/x`) become `x`. A tag
/// with no non-empty segment is a configuration error.
pub fn sanitize_tag(tag: &str) -> Result<String, PublishError> {
    let tag = tag.trim();
    if !tag.contains('/') {
        if tag.is_empty() {
            return Err(PublishError::InvalidTag {
                tag: tag.to_string(),
            });
        }
        return Ok(tag.to_string());
    }

    tag.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
        .ok_or_else(|| PublishError::InvalidTag {
            tag: tag.to_string(),
        })
}

/// Compute the version to publish
///
/// When neither the tag nor the hash applies the current version is
/// returned untouched. Otherwise any existing pre-release suffix is replaced.
/// An all-digit hash is written as `g<hash>`.
pub fn next_version(inputs: &VersionInputs<'_>) -> String {
    let tag = inputs
        .tag
        .filter(|t| inputs.use_tag_in_version && !t.is_empty() && *t != LATEST_TAG);
    let hash = inputs
        .hash
        .filter(|h| inputs.use_hash_in_version && !h.is_empty());

    if tag.is_none() && hash.is_none() {
        return inputs.current.to_string();
    }

    let mut version = base_version(inputs.current).to_string();
    let mut has_prerelease = false;

    if let Some(tag) = tag {
        version.push('-');
        version.push_str(tag);
        has_prerelease = true;
    }

    if let Some(hash) = hash {
        version.push(if has_prerelease { '.' } else { '-' });
        // numeric identifiers with a leading zero are not SemVer
        if hash.chars().all(|c| c.is_ascii_digit()) {
            version.push('g');
        }
        version.push_str(hash);
    }

    version
}

/// Version without pre-release suffix and build metadata
pub fn base_version(version: &str) -> &str {
    let end = version.find(['-', '+']).unwrap_or(version.len());
    &version[..end]
}

/// Ensure the version is valid SemVer
pub fn validate_version(version: &str) -> Result<Version, PublishError> {
    Version::parse(version).map_err(|e| PublishError::InvalidVersion {
        version: version.to_string(),
        message: e.to_string(),
    })
}

/// Check if version is a prerelease
pub fn is_prerelease(version: &str) -> bool {
    match Version::parse(version) {
        Ok(parsed) => !parsed.pre.is_empty(),
        Err(_) => base_version(version).len() < version.len() && !version.starts_with('+'),
    }
}

/// Dist-tag applied to a pre-release when none was requested
///
/// Uses the first non-numeric pre-release identifier (`1.0.0-beta.3` →
/// `beta`), falling back to `next`. Stable versions get no automatic tag.
pub fn auto_dist_tag(version: &str) -> Option<String> {
    if !is_prerelease(version) {
        return None;
    }

    let pre = version
        .split_once('-')
        .map(|(_, rest)| rest.split('+').next().unwrap_or_default())
        .unwrap_or_default();

    let identifier = pre
        .split('.')
        .find(|id| !id.is_empty() && !id.chars().all(|c| c.is_ascii_digit()))
        .filter(|id| *id != LATEST_TAG)
        .unwrap_or(DEFAULT_PRERELEASE_TAG);

    Some(identifier.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(
        current: &'a str,
        tag: Option<&'a str>,
        hash: Option<&'a str>,
        use_tag: bool,
        use_hash: bool,
    ) -> VersionInputs<'a> {
        VersionInputs {
            current,
            hash,
            tag,
            use_tag_in_version: use_tag,
            use_hash_in_version: use_hash,
        }
    }

    #[test]
    fn test_tag_and_hash_replace_prerelease() {
        let next = next_version(&inputs(
            "1.2.0-beta.abc123",
            Some("next"),
            Some("def456"),
            true,
            true,
        ));
        assert_eq!(next, "1.2.0-next.def456");
    }

    #[test]
    fn test_no_modifiers_keeps_version() {
        assert_eq!(
            next_version(&inputs("1.2.0-beta.1", Some("next"), Some("abc"), false, false)),
            "1.2.0-beta.1"
        );
    }

    #[test]
    fn test_hash_only() {
        assert_eq!(
            next_version(&inputs("1.2.0", None, Some("abc1234"), false, true)),
            "1.2.0-abc1234"
        );
        assert_eq!(
            next_version(&inputs("1.2.0-alpha.2", None, Some("abc1234"), false, true)),
            "1.2.0-abc1234"
        );
    }

    #[test]
    fn test_numeric_hash_is_prefixed() {
        let next = next_version(&inputs("1.2.0", None, Some("0412345"), false, true));
        assert_eq!(next, "1.2.0-g0412345");
        assert!(validate_version(&next).is_ok());

        assert_eq!(
            next_version(&inputs("1.2.0", Some("next"), Some("1234567"), true, true)),
            "1.2.0-next.g1234567"
        );
        assert!(validate_version("1.2.0-0412345").is_err());
    }

    #[test]
    fn test_tag_only() {
        assert_eq!(
            next_version(&inputs("2.0.0", Some("canary"), None, true, false)),
            "2.0.0-canary"
        );
    }

    #[test]
    fn test_latest_tag_is_never_appended() {
        assert_eq!(
            next_version(&inputs("2.0.0", Some("latest"), Some("abc"), true, true)),
            "2.0.0-abc"
        );
        assert_eq!(
            next_version(&inputs("2.0.0", Some("latest"), None, true, false)),
            "2.0.0"
        );
    }

    #[test]
    fn test_missing_hash_is_ignored() {
        assert_eq!(
            next_version(&inputs("2.0.0", Some("next"), None, true, true)),
            "2.0.0-next"
        );
    }

    #[test]
    fn test_idempotent_under_reapplication() {
        let first = next_version(&inputs("1.0.0-rc.1", Some("next"), Some("f00d"), true, true));
        let second = next_version(&inputs(&first, Some("next"), Some("f00d"), true, true));
        assert_eq!(first, second);
    }

    #[test]
    fn test_build_metadata_dropped_with_suffix() {
        assert_eq!(
            next_version(&inputs("1.0.0+build.5", Some("next"), None, true, false)),
            "1.0.0-next"
        );
    }

    #[test]
    fn test_sanitize_tag() {
        assert_eq!(sanitize_tag("next").unwrap(), "next");
        assert_eq!(sanitize_tag("refs/heads/feature/login").unwrap(), "login");
        assert_eq!(sanitize_tag("release/").unwrap(), "release");
        assert_eq!(sanitize_tag("/beta//").unwrap(), "beta");
    }

    #[test]
    fn test_sanitize_tag_all_empty_segments() {
        assert!(matches!(
            sanitize_tag("///"),
            Err(PublishError::InvalidTag { .. })
        ));
        assert!(matches!(sanitize_tag(""), Err(PublishError::InvalidTag { .. })));
    }

    #[test]
    fn test_is_prerelease() {
        assert!(is_prerelease("1.0.0-alpha.1"));
        assert!(!is_prerelease("1.0.0"));
        assert!(!is_prerelease("1.0.0+build"));
    }

    #[test]
    fn test_auto_dist_tag() {
        assert_eq!(auto_dist_tag("1.0.0"), None);
        assert_eq!(auto_dist_tag("1.0.0-beta.3"), Some("beta".to_string()));
        assert_eq!(auto_dist_tag("1.0.0-next.def456"), Some("next".to_string()));
        assert_eq!(auto_dist_tag("1.0.0-1"), Some("next".to_string()));
        assert_eq!(auto_dist_tag("1.0.0-latest.2"), Some("next".to_string()));
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("1.2.3-next.abc").is_ok());
        assert!(matches!(
            validate_version("1.2"),
            Err(PublishError::InvalidVersion { .. })
        ));
    }
}
