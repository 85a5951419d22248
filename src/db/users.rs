use async_trait::async_trait;
use rusqlite::{params, ErrorCode, OptionalExtension};

use crate::db::models::{ImageBlob, NewUser, PublicUser, User, UserUpdate};
use crate::db::{format_timestamp, like_pattern, now_millis, timestamp_column, StoreError};
use crate::state::DbPool;

const USER_COLUMNS: &str = "id, email, password_hash, name, gender, age, username,
     profile_image, content_type, created_at, updated_at";

/// Persistence for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Every user, oldest account first.
    async fn list(&self) -> Result<Vec<PublicUser>, StoreError>;

    /// Case-insensitive substring match on username, leaving out `exclude`.
    async fn search(
        &self,
        fragment: &str,
        exclude: Option<&str>,
    ) -> Result<Vec<PublicUser>, StoreError>;

    async fn update(&self, username: &str, update: UserUpdate) -> Result<User, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        gender: row.get(4)?,
        age: row.get(5)?,
        username: row.get(6)?,
        profile_image: ImageBlob {
            bytes: row.get(7)?,
            content_type: row.get(8)?,
        },
        created_at: timestamp_column(row, 9)?,
        updated_at: timestamp_column(row, 10)?,
    })
}

fn public_user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PublicUser> {
    let content_type: String = row.get(2)?;
    let bytes: Vec<u8> = row.get(3)?;
    Ok(PublicUser {
        username: row.get(0)?,
        name: row.get(1)?,
        profile_image: ImageBlob::new(bytes, content_type).to_data_uri(),
    })
}

/// Maps a UNIQUE violation on `users` to the column that collided.
fn unique_violation(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, Some(ref msg)) = err {
        if failure.code == ErrorCode::ConstraintViolation {
            if msg.contains("users.email") {
                return StoreError::Duplicate("email");
            }
            if msg.contains("users.username") {
                return StoreError::Duplicate("username");
            }
        }
    }
    StoreError::Sql(err)
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let now = now_millis();
        let now_str = format_timestamp(&now);

        conn.execute(
            "INSERT INTO users (id, email, password_hash, name, gender, age, username,
                                profile_image, content_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id,
                user.email,
                user.password_hash,
                user.name,
                user.gender,
                user.age,
                user.username,
                user.profile_image.bytes,
                user.profile_image.content_type,
                now_str,
            ],
        )
        .map_err(unique_violation)?;

        Ok(User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            gender: user.gender,
            age: user.age,
            username: user.username,
            profile_image: user.profile_image,
            created_at: now,
            updated_at: now,
        })
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<PublicUser>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT username, name, content_type, profile_image
             FROM users
             ORDER BY created_at ASC, id ASC",
        )?;

        let users = stmt
            .query_map([], public_user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    async fn search(
        &self,
        fragment: &str,
        exclude: Option<&str>,
    ) -> Result<Vec<PublicUser>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT username, name, content_type, profile_image
             FROM users
             WHERE username LIKE ?1 ESCAPE '\\'
               AND (?2 IS NULL OR username <> ?2)
             ORDER BY created_at ASC, id ASC",
        )?;

        let users = stmt
            .query_map(params![like_pattern(fragment), exclude], public_user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    async fn update(&self, username: &str, update: UserUpdate) -> Result<User, StoreError> {
        let conn = self.pool.get()?;
        let (image_bytes, content_type) = match update.profile_image {
            Some(image) => (Some(image.bytes), Some(image.content_type)),
            None => (None, None),
        };

        let rows = conn.execute(
            "UPDATE users SET
                name = COALESCE(?2, name),
                gender = COALESCE(?3, gender),
                profile_image = COALESCE(?4, profile_image),
                content_type = COALESCE(?5, content_type),
                updated_at = ?6
             WHERE username = ?1",
            params![
                username,
                update.name,
                update.gender,
                image_bytes,
                content_type,
                format_timestamp(&now_millis()),
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound("User"));
        }

        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound("User"))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound("User"));
        }
        Ok(())
    }
}
