use crate::auth::password;
use crate::auth::token::TokenKeys;
use crate::db::models::{ImageBlob, NewUser, User};
use crate::db::{StoreError, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Email already exists")]
    DuplicateEmail,

    #[error("Username already exists")]
    DuplicateUsername,

    /// Same error for an unknown username and a wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Sign-up data with the plaintext password.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub password: String,
    pub name: String,
    pub gender: String,
    pub age: i64,
    pub profile_image: ImageBlob,
}

/// Creates an account after checking email then username for collisions.
pub async fn register(
    users: &dyn UserRepository,
    registration: Registration,
    bcrypt_cost: u32,
) -> Result<User, CredentialError> {
    if users.email_exists(&registration.email).await? {
        return Err(CredentialError::DuplicateEmail);
    }
    if users.username_exists(&registration.username).await? {
        return Err(CredentialError::DuplicateUsername);
    }

    let password_hash = password::hash_password(&registration.password, bcrypt_cost).await?;

    // A concurrent sign-up can still win between the checks and the insert.
    let user = users
        .insert(NewUser {
            email: registration.email,
            password_hash,
            name: registration.name,
            gender: registration.gender,
            age: registration.age,
            username: registration.username,
            profile_image: registration.profile_image,
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate("email") => CredentialError::DuplicateEmail,
            StoreError::Duplicate(_) => CredentialError::DuplicateUsername,
            other => CredentialError::Store(other),
        })?;

    tracing::info!(user_id = %user.id, username = %user.username, "Registered user");
    Ok(user)
}

/// Checks the password and mints an access token.
///
/// An unknown username still costs one bcrypt round at `bcrypt_cost`, so
/// response time does not reveal whether the account exists.
pub async fn authenticate(
    users: &dyn UserRepository,
    tokens: &TokenKeys,
    username: &str,
    password: &str,
    bcrypt_cost: u32,
) -> Result<String, CredentialError> {
    let Some(user) = users.find_by_username(username).await? else {
        password::hash_password(password, bcrypt_cost).await?;
        tracing::info!(%username, "Login failed");
        return Err(CredentialError::InvalidCredentials);
    };

    if !password::verify_password(password, &user.password_hash).await? {
        tracing::info!(%username, "Login failed");
        return Err(CredentialError::InvalidCredentials);
    }

    Ok(tokens.issue(&user.id, &user.username)?)
}
