use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::{
    domain::{Club, Event},
    error::{AppError, Result},
    repository::CatalogRepository,
};

pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn find_club(&self, id: i64) -> Result<Option<Club>> {
        sqlx::query_as::<_, Club>("SELECT id, name FROM clubs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_event(&self, id: i64) -> Result<Option<Event>> {
        sqlx::query_as::<_, Event>("SELECT id, title FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
