use crate::auth::credentials::CredentialError;

/// bcrypt hash, computed off the async workers.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, CredentialError> {
    let password = password.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hash)
}

/// Constant-time via bcrypt. A malformed stored hash never matches.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, CredentialError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let matches =
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
            .await?;
    Ok(matches)
}
