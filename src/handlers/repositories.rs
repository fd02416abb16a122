//! # Repository Connection Handlers
//!
//! CRUD and sync endpoints for a user's GitHub repository connections. Every
//! route runs behind the JWT middleware; records belonging to another user are
//! reported as not found.

use axum::{
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, not_found, validation_error};
use crate::models::{Commit, PullRequest, RepositoryIssue, RepositoryRecord, SyncStatus};
use crate::server::AppState;
use crate::sync_service::SyncResult;

/// Request payload for connecting a repository
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectRepositoryRequest {
    /// Repository in `owner/repo` form
    #[schema(example = "acme/widgets")]
    pub full_name: String,
    /// GitHub personal access token with read access to the repository
    #[schema(example = "ghp_xxxxxxxxxxxxxxxxxxxx")]
    pub access_token: String,
}

/// Partial update for a connection
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateRepositoryRequest {
    pub is_active: Option<bool>,
    /// Replacement token; validated against GitHub before it is stored
    pub access_token: Option<String>,
}

/// Connection listing entry, without the synced collections
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RepositorySummary {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub full_name: String,
    pub is_active: bool,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub commit_count: usize,
    pub pr_count: usize,
    pub issue_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full connection record. The access token is never returned.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RepositoryResponse {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub user_id: Uuid,
    pub full_name: String,
    pub is_active: bool,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub commits: Vec<Commit>,
    pub pull_requests: Vec<PullRequest>,
    pub issues: Vec<RepositoryIssue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RepositoryListResponse {
    pub repositories: Vec<RepositorySummary>,
}

impl From<RepositoryRecord> for RepositorySummary {
    fn from(record: RepositoryRecord) -> Self {
        Self {
            id: record.id,
            full_name: record.full_name,
            is_active: record.is_active,
            sync_status: record.sync_status,
            sync_error: record.sync_error,
            last_sync_time: record.last_sync_time.map(|ts| ts.with_timezone(&Utc)),
            commit_count: record.commits.0.len(),
            pr_count: record.pull_requests.0.len(),
            issue_count: record.issues.0.len(),
            created_at: record.created_at.with_timezone(&Utc),
            updated_at: record.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<RepositoryRecord> for RepositoryResponse {
    fn from(record: RepositoryRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            full_name: record.full_name,
            is_active: record.is_active,
            sync_status: record.sync_status,
            sync_error: record.sync_error,
            last_sync_time: record.last_sync_time.map(|ts| ts.with_timezone(&Utc)),
            commits: record.commits.0,
            pull_requests: record.pull_requests.0,
            issues: record.issues.0,
            created_at: record.created_at.with_timezone(&Utc),
            updated_at: record.updated_at.with_timezone(&Utc),
        }
    }
}

/// Loads `id` if it belongs to `user`; anything else is a 404.
/// Trimmed access token; blank tokens never reach the provider.
fn required_token(raw: &str) -> Result<&str, ApiError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(validation_error(
            "Access token is required",
            serde_json::json!({ "access_token": "must not be empty" }),
        ));
    }
    Ok(token)
}

async fn load_owned(
    state: &AppState,
    user: AuthenticatedUser,
    id: Uuid,
) -> Result<RepositoryRecord, ApiError> {
    let record = state.sync_service.get_repository_data(id).await?;
    if record.user_id != user.user_id {
        tracing::debug!(repository_id = %id, user_id = %user.user_id, "Ownership check failed");
        return Err(not_found());
    }
    Ok(record)
}

/// Connect a GitHub repository
#[utoipa::path(
    post,
    path = "/repositories",
    security(("bearer_auth" = [])),
    request_body = ConnectRepositoryRequest,
    responses(
        (status = 201, description = "Repository connected", body = RepositoryResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing/invalid bearer token or GitHub rejected the access token", body = ApiError),
        (status = 404, description = "Repository not visible to the access token", body = ApiError),
        (status = 409, description = "Repository already connected", body = ApiError),
        (status = 503, description = "GitHub unavailable", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn connect_repository(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ConnectRepositoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RepositoryResponse>), ApiError> {
    let Json(request) = payload?;
    let full_name = request.full_name.trim();
    let access_token = required_token(&request.access_token)?;

    let record = state
        .sync_service
        .connect_repository(user.user_id, full_name, access_token)
        .await?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// List the caller's repository connections, most recently updated first
#[utoipa::path(
    get,
    path = "/repositories",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Repository connections", body = RepositoryListResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn list_repositories(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<RepositoryListResponse>, ApiError> {
    let records = state.sync_service.list_repositories(user.user_id).await?;
    Ok(Json(RepositoryListResponse {
        repositories: records.into_iter().map(Into::into).collect(),
    }))
}

/// Fetch one connection with its synced commits, pull requests and issues
#[utoipa::path(
    get,
    path = "/repositories/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Repository connection ID")),
    responses(
        (status = 200, description = "Repository connection", body = RepositoryResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn get_repository(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<RepositoryResponse>, ApiError> {
    let Path(id) = id?;
    let record = load_owned(&state, user, id).await?;
    Ok(Json(record.into()))
}

/// Activate/deactivate a connection or rotate its access token
#[utoipa::path(
    patch,
    path = "/repositories/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Repository connection ID")),
    request_body = UpdateRepositoryRequest,
    responses(
        (status = 200, description = "Updated repository connection", body = RepositoryResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing/invalid bearer token or GitHub rejected the new token", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn update_repository(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateRepositoryRequest>, JsonRejection>,
) -> Result<Json<RepositoryResponse>, ApiError> {
    let Path(id) = id?;
    let Json(request) = payload?;

    if request.is_active.is_none() && request.access_token.is_none() {
        return Err(validation_error(
            "Nothing to update",
            serde_json::json!({ "fields": ["is_active", "access_token"] }),
        ));
    }

    let access_token = request
        .access_token
        .as_deref()
        .map(required_token)
        .transpose()?;

    load_owned(&state, user, id).await?;
    let updated = state
        .sync_service
        .update_repository(id, request.is_active, access_token)
        .await?;

    Ok(Json(updated.into()))
}

/// Disconnect a repository and discard its synced data
#[utoipa::path(
    delete,
    path = "/repositories/{id}",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Repository connection ID")),
    responses(
        (status = 204, description = "Repository disconnected"),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn delete_repository(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    load_owned(&state, user, id).await?;
    state.sync_service.disconnect_repository(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Run a sync now
///
/// Returns 200 with `success: false` when the attempt itself failed; the
/// failure is also recorded on the connection.
#[utoipa::path(
    post,
    path = "/repositories/{id}/sync",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Repository connection ID")),
    responses(
        (status = 200, description = "Sync attempt outcome", body = SyncResult),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Inactive or already syncing", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn sync_repository(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SyncResult>, ApiError> {
    let Path(id) = id?;
    load_owned(&state, user, id).await?;
    let result = state.sync_service.sync_repository(id).await?;
    Ok(Json(result))
}
