//! npm side of the helper: package.json handling, auth, publish and build commands

pub mod auth;
pub mod compile;
pub mod manifest;
pub mod publisher;
pub mod unity;
pub mod version_policy;

pub use auth::{AuthMode, TroubleshootingReport};
pub use manifest::{ManifestGuard, PackageManifest};
pub use publisher::{NpmClient, PublishOutcome, PublishPlan};
