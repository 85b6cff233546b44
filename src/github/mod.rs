//! GitHub Actions integration: step outputs, event payload, workflow dispatch

pub mod dispatch;
pub mod event;
pub mod output;

pub use dispatch::{DispatchRequest, GITHUB_API_URL, dispatch_workflow};
pub use event::GithubEvent;
pub use output::CiOutput;
