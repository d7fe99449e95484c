use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::analysis::ObjectId;

/// Lookup of stored analysis documents. `AppState` holds an
/// `Arc<dyn AnalysisStore>`.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Value>, AppError>;
}

pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Value>, AppError> {
        Ok(
            sqlx::query_scalar::<_, Value>("SELECT document FROM analyses WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}
