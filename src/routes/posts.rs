use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{Comment, NewPost, PostDocument, PostPage, PostUpdate, PostView};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, QueryParams, UploadForm};
use crate::state::AppState;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 3;

// --- Request types ---

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct UsernameRequest {
    pub username: Option<String>,
}

#[derive(Deserialize)]
pub struct DescriptionSearchRequest {
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct PostKey {
    #[serde(deserialize_with = "pid_number_or_string")]
    pub pid: i64,
    pub username: String,
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    #[serde(deserialize_with = "pid_number_or_string")]
    pub pid: i64,
    pub username: String,
    pub description: Option<String>,
    pub comments: Option<Vec<Comment>>,
}

#[derive(Deserialize)]
pub struct UpdateDescriptionRequest {
    #[serde(deserialize_with = "pid_number_or_string")]
    pub pid: i64,
    pub username: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct AddCommentRequest {
    #[serde(deserialize_with = "pid_number_or_string")]
    pub pid: i64,
    pub username: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Accepts `7` as well as `"7"`.
fn pid_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Pid {
        Number(i64),
        Text(String),
    }

    match Pid::deserialize(deserializer)? {
        Pid::Number(pid) => Ok(pid),
        Pid::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("pid must be a number, got `{}`", text))),
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/createPost", post(create_post))
        .route("/getAllPost", get(list_posts))
        .route("/getAllPostByUserName", post(posts_by_username))
        .route("/getPostByDescription", post(posts_by_description))
        .route("/getPostById", post(get_post))
        .route("/updatePost", put(update_post))
        .route("/updatePostDescription", put(update_description))
        .route("/addComment", put(add_comment))
        .route("/deletePost/{pid}/{username}", delete(delete_post))
}

// --- Handlers ---

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<PostDocument>)> {
    let mut form = UploadForm::from_multipart(multipart).await?;
    let image = form.require_image()?;

    let username = form.text("username").unwrap_or_else(|| user.username.clone());
    user.ensure_owner(&state, &username)?;

    let post = state
        .posts
        .create(NewPost {
            username: Some(username),
            description: form.text("description"),
            image,
        })
        .await?;

    tracing::info!(pid = post.pid, created_by = %user.username, "Created post");
    Ok((StatusCode::CREATED, Json(PostDocument::from(&post))))
}

async fn list_posts(
    State(state): State<AppState>,
    _user: CurrentUser,
    QueryParams(query): QueryParams<PageQuery>,
) -> AppResult<Json<PostPage>> {
    let page = query.page.unwrap_or(DEFAULT_PAGE);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if page == 0 || limit == 0 {
        return Err(AppError::BadRequest(
            "page and limit must be at least 1".into(),
        ));
    }

    Ok(Json(state.posts.list_paged(page, limit).await?))
}

async fn posts_by_username(
    State(state): State<AppState>,
    _user: CurrentUser,
    JsonBody(req): JsonBody<UsernameRequest>,
) -> AppResult<Json<Vec<PostView>>> {
    let username = req
        .username
        .ok_or_else(|| AppError::BadRequest("username is required".into()))?;
    Ok(Json(state.posts.list_by_username(&username).await?))
}

async fn posts_by_description(
    State(state): State<AppState>,
    _user: CurrentUser,
    JsonBody(req): JsonBody<DescriptionSearchRequest>,
) -> AppResult<Json<Vec<PostView>>> {
    Ok(Json(
        state.posts.search_by_description(&req.description).await?,
    ))
}

/// Responds with a one-element array to keep the listing shape clients expect.
async fn get_post(
    State(state): State<AppState>,
    _user: CurrentUser,
    JsonBody(key): JsonBody<PostKey>,
) -> AppResult<Json<Vec<PostDocument>>> {
    let post = state
        .posts
        .find_by_pid_and_username(key.pid, &key.username)
        .await?;
    Ok(Json(vec![PostDocument::from(&post)]))
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(req): JsonBody<UpdatePostRequest>,
) -> AppResult<Json<PostDocument>> {
    user.ensure_owner(&state, &req.username)?;

    let update = PostUpdate {
        description: req.description,
        comments: req.comments.unwrap_or_default(),
    };
    let post = state.posts.update(req.pid, &req.username, update).await?;
    Ok(Json(PostDocument::from(&post)))
}

async fn update_description(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(req): JsonBody<UpdateDescriptionRequest>,
) -> AppResult<Json<PostDocument>> {
    user.ensure_owner(&state, &req.username)?;

    let post = state
        .posts
        .update_description(req.pid, &req.username, req.description)
        .await?;
    Ok(Json(PostDocument::from(&post)))
}

/// Anyone may comment; authors are taken from the body as given.
async fn add_comment(
    State(state): State<AppState>,
    _user: CurrentUser,
    JsonBody(req): JsonBody<AddCommentRequest>,
) -> AppResult<Json<PostDocument>> {
    let post = state
        .posts
        .append_comments(req.pid, &req.username, req.comments)
        .await?;
    Ok(Json(PostDocument::from(&post)))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((pid, username)): Path<(i64, String)>,
) -> AppResult<Json<Value>> {
    user.ensure_owner(&state, &username)?;

    state.posts.delete(pid, &username).await?;
    tracing::info!(pid, owner = %username, deleted_by = %user.username, "Deleted post");
    Ok(Json(json!({ "message": "Post deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_accepts_number_or_numeric_string() {
        let key: PostKey = serde_json::from_value(json!({ "pid": 7, "username": "a" })).unwrap();
        assert_eq!(key.pid, 7);

        let key: PostKey =
            serde_json::from_value(json!({ "pid": " 12 ", "username": "a" })).unwrap();
        assert_eq!(key.pid, 12);
    }

    #[test]
    fn non_numeric_pid_is_rejected() {
        let result = serde_json::from_value::<PostKey>(json!({ "pid": "abc", "username": "a" }));
        assert!(result.is_err());
    }
}
