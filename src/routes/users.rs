use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::credentials::{self, Registration};
use crate::db::models::{PublicUser, UserProfile, UserUpdate};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, QueryParams, UploadForm};
use crate::state::AppState;

// --- Request / response types ---

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: UserProfile,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub username: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/getALluser", get(list_users))
        .route("/search", get(search_users))
        .route("/getByUsername/{id}", get(get_by_username))
        .route("/updateUser/{id}", put(update_user))
        .route("/delete/{id}", delete(delete_user))
}

// --- Handlers ---

async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let mut form = UploadForm::from_multipart(multipart).await?;
    let profile_image = form.require_image()?;

    let age = form
        .required("age")?
        .trim()
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest("age must be a whole number".into()))?;

    let registration = Registration {
        email: form.required("email")?,
        username: form.required("username")?,
        password: form.required("password")?,
        name: form.required("name")?,
        gender: form.required("gender")?,
        age,
        profile_image,
    };

    let user = credentials::register(
        state.users.as_ref(),
        registration,
        state.config.auth.bcrypt_cost,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user: UserProfile::from(&user),
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let token = credentials::authenticate(
        state.users.as_ref(),
        &state.tokens,
        &req.username,
        &req.password,
        state.config.auth.bcrypt_cost,
    )
    .await?;

    Ok(Json(TokenResponse { token }))
}

async fn list_users(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> AppResult<Json<Vec<PublicUser>>> {
    Ok(Json(state.users.list().await?))
}

async fn search_users(
    State(state): State<AppState>,
    user: CurrentUser,
    QueryParams(query): QueryParams<SearchQuery>,
) -> AppResult<Json<Vec<PublicUser>>> {
    let users = state
        .users
        .search(&query.username, Some(&user.username))
        .await?;
    Ok(Json(users))
}

async fn get_by_username(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Json<UserProfile>> {
    let user = state
        .users
        .find_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(UserProfile::from(&user)))
}

async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<UserProfile>> {
    user.ensure_owner(&state, &username)?;

    let mut form = UploadForm::from_multipart(multipart).await?;
    let profile_image = form.require_image()?;

    let update = UserUpdate {
        name: form.text("name"),
        gender: form.text("gender"),
        profile_image: Some(profile_image),
    };

    let updated = state.users.update(&username, update).await?;
    Ok(Json(UserProfile::from(&updated)))
}

async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    user.ensure_account(&state, &id)?;

    state.users.delete(&id).await?;
    tracing::info!(user_id = %id, deleted_by = %user.username, "Deleted user");
    Ok(Json(json!({ "message": "User deleted successfully" })))
}
