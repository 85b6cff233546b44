//! Orchestration layer
//!
//! High-level flows built from the npm, git, GitHub and notification
//! components: the publish pipeline and the diff report.

pub mod diff_reporter;
pub mod package_publisher;

// Re-export main types for convenience
pub use diff_reporter::{DiffOptions, DiffReport, report_diff};
pub use package_publisher::{PackagePublisher, PublishOptions, PublishReport, prepare_publish};
