use base64::engine::general_purpose::STANDARD as base64_engine;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binary image together with its MIME type. One never exists without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ImageBlob {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    pub fn to_data_uri(&self) -> String {
        data_uri(&self.content_type, &self.bytes)
    }
}

/// `data:<mime>;base64,<payload>`
pub fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        content_type,
        base64_engine.encode(bytes)
    )
}

// --- Users ---

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub gender: String,
    pub age: i64,
    pub username: String,
    pub profile_image: ImageBlob,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub gender: String,
    pub age: i64,
    pub username: String,
    pub profile_image: ImageBlob,
}

/// Partial profile update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub profile_image: Option<ImageBlob>,
}

/// Listing/search projection of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub username: String,
    pub name: String,
    pub profile_image: String,
}

/// Everything about a user except the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub gender: String,
    pub age: i64,
    pub username: String,
    pub profile_image: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            name: user.name.clone(),
            profile_image: user.profile_image.to_data_uri(),
        }
    }
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            gender: user.gender.clone(),
            age: user.age,
            username: user.username.clone(),
            profile_image: user.profile_image.to_data_uri(),
            content_type: user.profile_image.content_type.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// --- Posts ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Comment {
    pub username: String,
    pub text: String,
}

impl Comment {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub pid: i64,
    pub username: Option<String>,
    pub image: ImageBlob,
    pub description: Option<String>,
    pub comments: Vec<Comment>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub username: Option<String>,
    pub description: Option<String>,
    pub image: ImageBlob,
}

/// Combined edit applied by `PostRepository::update`.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    /// Ignored when empty.
    pub description: Option<String>,
    /// Appended after the existing comments.
    pub comments: Vec<Comment>,
}

/// Full post as returned by create, lookup and edit endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDocument {
    pub id: String,
    pub pid: i64,
    pub username: Option<String>,
    pub description: Option<String>,
    pub comments: Vec<Comment>,
    pub timestamp: DateTime<Utc>,
    pub image: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Feed projection of a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub username: Option<String>,
    pub description: Option<String>,
    pub comments: Vec<Comment>,
    pub timestamp: DateTime<Utc>,
    pub pid: i64,
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<PostView>,
    pub has_more_posts: bool,
}

impl From<&Post> for PostDocument {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            pid: post.pid,
            username: post.username.clone(),
            description: post.description.clone(),
            comments: post.comments.clone(),
            timestamp: post.timestamp,
            image: post.image.to_data_uri(),
            content_type: post.image.content_type.clone(),
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

impl From<&Post> for PostView {
    fn from(post: &Post) -> Self {
        Self {
            username: post.username.clone(),
            description: post.description.clone(),
            comments: post.comments.clone(),
            timestamp: post.timestamp,
            pid: post.pid,
            image: post.image.to_data_uri(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_encodes_payload_with_mime() {
        assert_eq!(data_uri("image/png", b"hi"), "data:image/png;base64,aGk=");
        assert_eq!(data_uri("image/jpeg", b""), "data:image/jpeg;base64,");
    }

    #[test]
    fn public_user_never_carries_password() {
        let user = User {
            id: "u1".into(),
            email: "a@example.com".into(),
            password_hash: "$2b$04$secret".into(),
            name: "Alice".into(),
            gender: "female".into(),
            age: 31,
            username: "alice".into(),
            profile_image: ImageBlob::new(vec![1, 2, 3], "image/png"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let public = serde_json::to_value(PublicUser::from(&user)).unwrap();
        assert_eq!(public["profileImage"], "data:image/png;base64,AQID");

        let profile = serde_json::to_string(&UserProfile::from(&user)).unwrap();
        assert!(!profile.contains("secret"));
        assert!(profile.contains("\"contentType\":\"image/png\""));
    }

    #[test]
    fn comment_tolerates_missing_fields() {
        let comment: Comment = serde_json::from_str(r#"{"text":"nice"}"#).unwrap();
        assert_eq!(comment, Comment::new("", "nice"));
    }

    #[test]
    fn post_page_uses_camel_case() {
        let page = PostPage {
            posts: vec![],
            has_more_posts: true,
        };
        let json = serde_json::to_value(page).unwrap();
        assert_eq!(json["hasMorePosts"], true);
    }
}
