//! Re-encrypts every stored GitHub access token under the current
//! `REPOSYNC_TOKEN_SECRET`.
//!
//! Set `REPOSYNC_PREVIOUS_TOKEN_SECRET` to the secret being retired. Without
//! it, only legacy plaintext tokens are migrated.

use std::sync::Arc;

use anyhow::{Context, Result};
use repo_sync::{
    config::ConfigLoader, crypto::TokenCipher, db, repositories::RepositoryStore,
    rotation::rotate_access_tokens, telemetry,
};

const PREVIOUS_SECRET_VAR: &str = "REPOSYNC_PREVIOUS_TOKEN_SECRET";

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;

    let current = TokenCipher::new(
        config
            .token_secret
            .as_deref()
            .context("REPOSYNC_TOKEN_SECRET is not configured")?,
    )
    .context("initializing current token cipher")?;

    let previous = match std::env::var(PREVIOUS_SECRET_VAR) {
        Ok(secret) if !secret.is_empty() => {
            Some(TokenCipher::new(secret).context("initializing previous token cipher")?)
        }
        _ => None,
    };

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    let store = RepositoryStore::new(Arc::new(db));

    let summary = rotate_access_tokens(&store, previous.as_ref(), &current)
        .await
        .context("rotating access tokens")?;

    println!(
        "Rotated {} token(s), encrypted {} plaintext token(s), {} already current",
        summary.rotated, summary.encrypted_plaintext, summary.unchanged
    );
    Ok(())
}
