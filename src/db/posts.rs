use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::db::models::{Comment, ImageBlob, NewPost, Post, PostPage, PostUpdate, PostView};
use crate::db::{format_timestamp, like_pattern, now_millis, timestamp_column, StoreError};
use crate::state::DbPool;

const POST_COLUMNS: &str = "id, pid, username, image, content_type, description, comments,
     timestamp, created_at, updated_at";

/// Persistence for posts. A post is addressed by its `(pid, username)` pair.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Stores a post under the next pid of the shared sequence.
    async fn create(&self, post: NewPost) -> Result<Post, StoreError>;

    /// Newest first. `page` starts at 1.
    ///
    /// `has_more_posts` is true whenever the page came back full, so a final
    /// page of exactly `limit` posts still reports more.
    async fn list_paged(&self, page: u32, limit: u32) -> Result<PostPage, StoreError>;

    async fn list_by_username(&self, username: &str) -> Result<Vec<PostView>, StoreError>;

    /// Case-insensitive substring match on description, newest first.
    async fn search_by_description(&self, fragment: &str) -> Result<Vec<PostView>, StoreError>;

    async fn find_by_pid_and_username(&self, pid: i64, username: &str)
        -> Result<Post, StoreError>;

    async fn update(&self, pid: i64, username: &str, update: PostUpdate)
        -> Result<Post, StoreError>;

    async fn update_description(
        &self,
        pid: i64,
        username: &str,
        description: String,
    ) -> Result<Post, StoreError> {
        let update = PostUpdate {
            description: Some(description),
            comments: Vec::new(),
        };
        self.update(pid, username, update).await
    }

    async fn append_comments(
        &self,
        pid: i64,
        username: &str,
        comments: Vec<Comment>,
    ) -> Result<Post, StoreError> {
        let update = PostUpdate {
            description: None,
            comments,
        };
        self.update(pid, username, update).await
    }

    async fn delete(&self, pid: i64, username: &str) -> Result<(), StoreError>;
}

pub struct SqlitePostRepository {
    pool: DbPool,
}

impl SqlitePostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn query_views(
        &self,
        filter: &str,
        window: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<PostView>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts {filter}
             ORDER BY timestamp DESC, pid DESC {window}"
        ))?;

        let posts = stmt
            .query_map(params, post_from_row)?
            .map(|post| post.map(|p| PostView::from(&p)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    let comments_json: String = row.get(6)?;
    let comments: Vec<Comment> = serde_json::from_str(&comments_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(Post {
        id: row.get(0)?,
        pid: row.get(1)?,
        username: row.get(2)?,
        image: ImageBlob {
            bytes: row.get(3)?,
            content_type: row.get(4)?,
        },
        description: row.get(5)?,
        comments,
        timestamp: timestamp_column(row, 7)?,
        created_at: timestamp_column(row, 8)?,
        updated_at: timestamp_column(row, 9)?,
    })
}

fn select_post(
    conn: &rusqlite::Connection,
    pid: i64,
    username: &str,
) -> Result<Option<Post>, StoreError> {
    let post = conn
        .query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE pid = ?1 AND username = ?2"),
            params![pid, username],
            post_from_row,
        )
        .optional()?;
    Ok(post)
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let pid: i64 = tx.query_row(
            "UPDATE counters SET seq = seq + 1 WHERE name = 'pid' RETURNING seq",
            [],
            |row| row.get(0),
        )?;

        let id = uuid::Uuid::now_v7().to_string();
        let now = now_millis();
        let now_str = format_timestamp(&now);

        tx.execute(
            "INSERT INTO posts (id, pid, username, image, content_type, description,
                                comments, timestamp, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', ?7, ?7, ?7)",
            params![
                id,
                pid,
                post.username,
                post.image.bytes,
                post.image.content_type,
                post.description,
                now_str,
            ],
        )?;
        tx.commit()?;

        Ok(Post {
            id,
            pid,
            username: post.username,
            image: post.image,
            description: post.description,
            comments: Vec::new(),
            timestamp: now,
            created_at: now,
            updated_at: now,
        })
    }

    async fn list_paged(&self, page: u32, limit: u32) -> Result<PostPage, StoreError> {
        // Pages past i64 range are simply empty.
        let offset = i64::from(page.saturating_sub(1))
            .checked_mul(i64::from(limit))
            .unwrap_or(i64::MAX);
        let posts = self.query_views("", "LIMIT ?1 OFFSET ?2", params![limit, offset])?;

        let has_more_posts = posts.len() == limit as usize;
        Ok(PostPage {
            posts,
            has_more_posts,
        })
    }

    async fn list_by_username(&self, username: &str) -> Result<Vec<PostView>, StoreError> {
        self.query_views("WHERE username = ?1", "", params![username])
    }

    async fn search_by_description(&self, fragment: &str) -> Result<Vec<PostView>, StoreError> {
        self.query_views(
            "WHERE description LIKE ?1 ESCAPE '\\'",
            "",
            params![like_pattern(fragment)],
        )
    }

    async fn find_by_pid_and_username(
        &self,
        pid: i64,
        username: &str,
    ) -> Result<Post, StoreError> {
        let conn = self.pool.get()?;
        select_post(&conn, pid, username)?.ok_or(StoreError::NotFound("Post"))
    }

    async fn update(
        &self,
        pid: i64,
        username: &str,
        update: PostUpdate,
    ) -> Result<Post, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut post = select_post(&tx, pid, username)?.ok_or(StoreError::NotFound("Post"))?;

        if let Some(description) = update.description.filter(|d| !d.is_empty()) {
            post.description = Some(description);
        }
        post.comments.extend(update.comments);
        post.updated_at = now_millis();

        tx.execute(
            "UPDATE posts SET description = ?2, comments = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                post.id,
                post.description,
                serde_json::to_string(&post.comments)?,
                format_timestamp(&post.updated_at),
            ],
        )?;
        tx.commit()?;

        Ok(post)
    }

    async fn delete(&self, pid: i64, username: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM posts WHERE pid = ?1 AND username = ?2",
            params![pid, username],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("Post"));
        }
        Ok(())
    }
}
