use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::token::TokenKeys;
use crate::config::Config;
use crate::db::{PostRepository, SqlitePostRepository, SqliteUserRepository, UserRepository};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub tokens: Arc<TokenKeys>,
}

impl AppState {
    /// Wires the SQLite repositories and builds the signing keys once.
    pub fn new(pool: DbPool, config: Config) -> Self {
        let tokens = TokenKeys::from_config(&config.auth);
        Self {
            users: Arc::new(SqliteUserRepository::new(pool.clone())),
            posts: Arc::new(SqlitePostRepository::new(pool)),
            tokens: Arc::new(tokens),
            config,
        }
    }
}
