use axum::extract::multipart::Multipart;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::auth::AuthError;
use crate::db::models::ImageBlob;
use crate::error::AppError;
use crate::state::AppState;

/// Represents the caller identified by the access token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

/// Extractor that requires a valid access token in `Authorization`.
/// Rejects with 401 before the handler runs.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = state.tokens.verify(extract_token(parts)?)?;
        Ok(CurrentUser {
            id: identity.user_id,
            username: identity.username,
        })
    }
}

impl CurrentUser {
    /// Only fails when ownership checks are switched on in config.
    pub fn ensure_owner(&self, state: &AppState, username: &str) -> Result<(), AppError> {
        if state.config.auth.enforce_ownership && self.username != username {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    pub fn ensure_account(&self, state: &AppState, user_id: &str) -> Result<(), AppError> {
        if state.config.auth.enforce_ownership && self.id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}

/// Raw token, with an optional `Bearer ` prefix tolerated.
/// A header that is present but not visible ASCII counts as an invalid token.
fn extract_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::Invalid)?;
    Ok(Some(value.strip_prefix("Bearer ").unwrap_or(value)))
}

/// JSON request body. Malformed or incomplete bodies reject with 400 `{message}`.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// Query string, rejecting with 400 `{message}` like [`JsonBody`].
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(QueryParams(value))
    }
}

/// Text fields plus the `image` file of a multipart form.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    image: Option<ImageBlob>,
}

impl UploadForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "image" {
                let content_type = image_content_type(field.content_type(), field.file_name());
                let bytes = field.bytes().await?;
                // An empty file part is how browsers send "no file chosen".
                if !bytes.is_empty() {
                    form.image = Some(ImageBlob::new(bytes.to_vec(), content_type));
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Non-empty text field.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    pub fn required(&self, name: &str) -> Result<String, AppError> {
        self.text(name)
            .ok_or_else(|| AppError::BadRequest(format!("{} is required", name)))
    }

    pub fn require_image(&mut self) -> Result<ImageBlob, AppError> {
        self.image
            .take()
            .ok_or_else(|| AppError::BadRequest("Image file is required".into()))
    }
}

fn image_content_type(declared: Option<&str>, file_name: Option<&str>) -> String {
    match declared {
        Some(ct) if !ct.is_empty() => ct.to_string(),
        _ => file_name
            .map(|f| mime_guess::from_path(f).first_or_octet_stream())
            .unwrap_or(mime_guess::mime::APPLICATION_OCTET_STREAM)
            .to_string(),
    }
}
