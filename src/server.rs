//! # Server Configuration
//!
//! Router assembly, shared state and the HTTP server loop.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{AuthError, JwtAuth, auth_middleware};
use crate::config::AppConfig;
use crate::connectors::{GitHubClient, ProviderError, RepositoryProvider, RetryPolicy};
use crate::crypto::{CryptoError, TokenCipher};
use crate::handlers::{self, repositories};
use crate::repositories::RepositoryStore;
use crate::sync_service::RepositorySyncService;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub sync_service: RepositorySyncService,
    pub jwt: Arc<JwtAuth>,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("token secret is not configured")]
    MissingTokenSecret,
    #[error("token cipher: {0}")]
    Cipher(#[from] CryptoError),
    #[error("GitHub client: {0}")]
    Provider(#[from] ProviderError),
    #[error("auth: {0}")]
    Auth(#[from] AuthError),
}

impl AppState {
    /// Wires the production GitHub client into the service graph.
    pub fn from_config(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
    ) -> Result<Self, StartupError> {
        let github = GitHubClient::new(
            &config.github,
            &config.sync,
            RetryPolicy::from(&config.retry),
        )?;
        Self::with_provider(config, db, Arc::new(github))
    }

    /// Builds state around any provider; tests pass a mocked GitHub here.
    pub fn with_provider(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn RepositoryProvider>,
    ) -> Result<Self, StartupError> {
        let secret = config
            .token_secret
            .as_deref()
            .ok_or(StartupError::MissingTokenSecret)?;
        let cipher = Arc::new(TokenCipher::new(secret)?);
        let jwt = Arc::new(JwtAuth::from_config(&config)?);

        let sync_service = RepositorySyncService::new(
            RepositoryStore::new(Arc::clone(&db)),
            cipher,
            provider,
            &config.sync,
        );

        Ok(Self {
            config,
            db,
            sync_service,
            jwt,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/repositories",
            post(repositories::connect_repository).get(repositories::list_repositories),
        )
        .route(
            "/repositories/{id}",
            get(repositories::get_repository)
                .patch(repositories::update_repository)
                .delete(repositories::delete_repository),
        )
        .route(
            "/repositories/{id}/sync",
            post(repositories::sync_repository),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.jwt),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
}

/// Serves `state` until `shutdown` is cancelled.
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

struct BearerAuthAddon;

impl Modify for BearerAuthAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::readyz,
        crate::handlers::repositories::connect_repository,
        crate::handlers::repositories::list_repositories,
        crate::handlers::repositories::get_repository,
        crate::handlers::repositories::update_repository,
        crate::handlers::repositories::delete_repository,
        crate::handlers::repositories::sync_repository,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::SyncStatus,
            crate::models::Commit,
            crate::models::PullRequest,
            crate::models::PullRequestState,
            crate::models::RepositoryIssue,
            crate::models::IssueState,
            crate::handlers::HealthStatus,
            crate::handlers::repositories::ConnectRepositoryRequest,
            crate::handlers::repositories::UpdateRepositoryRequest,
            crate::handlers::repositories::RepositorySummary,
            crate::handlers::repositories::RepositoryResponse,
            crate::handlers::repositories::RepositoryListResponse,
            crate::sync_service::SyncResult,
            crate::error::ApiError,
        )
    ),
    modifiers(&BearerAuthAddon),
    tags(
        (name = "repositories", description = "GitHub repository connections and sync"),
        (name = "health", description = "Liveness and readiness probes"),
    ),
    info(
        title = "repo-sync API",
        description = "Connects GitHub repositories and keeps a snapshot of recent activity",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
