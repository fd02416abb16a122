//! # Data Models
//!
//! Entities and value types persisted by the repository sync service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod repository_connection;
pub mod sync_items;

pub use repository_connection::Entity as RepositoryConnection;
pub use repository_connection::{RepositoryRecord, SyncStatus};
pub use sync_items::{Commit, IssueState, PullRequest, PullRequestState, RepositoryIssue};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "repo-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
