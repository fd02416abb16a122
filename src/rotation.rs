//! Re-encryption of stored access tokens under a new token secret.

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::{CryptoError, TokenCipher, is_envelope};
use crate::repositories::{RepositoryStore, StoreError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationSummary {
    /// Envelopes moved from the previous secret to the current one
    pub rotated: usize,
    /// Legacy plaintext tokens encrypted for the first time
    pub encrypted_plaintext: usize,
    /// Already readable with the current secret
    pub unchanged: usize,
}

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("token for connection {id} could not be decrypted with either secret: {source}")]
    Undecryptable {
        id: Uuid,
        #[source]
        source: CryptoError,
    },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Re-encrypts every stored token under `current`.
///
/// Envelopes that `current` already opens are left alone, so the pass can be
/// re-run after an interruption. Without `previous`, only plaintext tokens
/// are migrated.
pub async fn rotate_access_tokens(
    store: &RepositoryStore,
    previous: Option<&TokenCipher>,
    current: &TokenCipher,
) -> Result<RotationSummary, RotationError> {
    let mut summary = RotationSummary::default();

    for (id, stored) in store.find_all_access_tokens().await? {
        if !is_envelope(&stored) {
            warn!(repository_id = %id, "Encrypting legacy plaintext access token");
            store.replace_access_token(id, current.encrypt(&stored)?).await?;
            summary.encrypted_plaintext += 1;
            continue;
        }

        if current.decrypt(&stored).is_ok() {
            summary.unchanged += 1;
            continue;
        }

        let Some(previous) = previous else {
            return Err(RotationError::Undecryptable {
                id,
                source: CryptoError::Decryption("no previous secret supplied".to_string()),
            });
        };

        let token = zeroize::Zeroizing::new(
            previous
                .decrypt(&stored)
                .map_err(|source| RotationError::Undecryptable { id, source })?,
        );
        store.replace_access_token(id, current.encrypt(&token)?).await?;
        summary.rotated += 1;
    }

    info!(
        rotated = summary.rotated,
        encrypted_plaintext = summary.encrypted_plaintext,
        unchanged = summary.unchanged,
        "Access token rotation complete"
    );
    Ok(summary)
}
