use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use pgvector::Vector;
use tokio::sync::Semaphore;
use uuid::Uuid;

use common::{database::DbPool, services::EmbeddingService};

use crate::core::{progress::create_progress_with_job, Job, JobError};

const DEFAULT_EMBED_BATCH_SIZE: usize = 32;
const MAX_DB_EMBED_CONCURRENCY: usize = 8;

/// Fills `knowledge_base.embedding` for rows loaded without one.
pub struct EmbedJob {
    embedding_service: Arc<EmbeddingService>,
    batch_size: usize,
}

impl EmbedJob {
    pub fn new(embedding_service: Arc<EmbeddingService>) -> Self {
        let batch_size = std::env::var("EMBED_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_EMBED_BATCH_SIZE);

        Self {
            embedding_service,
            batch_size,
        }
    }

    async fn pending_documents(pool: &DbPool) -> Result<Vec<(Uuid, String)>, JobError> {
        let client = pool
            .get()
            .await
            .map_err(|e| JobError::Database(e.to_string()))?;
        let rows = client
            .query(
                "SELECT id, COALESCE(NULLIF(text, ''), chunk) AS content
                 FROM knowledge_base
                 WHERE embedding IS NULL
                   AND COALESCE(NULLIF(text, ''), chunk) IS NOT NULL
                 ORDER BY created_at",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("content")))
            .filter(|(_, content): &(Uuid, String)| !content.trim().is_empty())
            .collect())
    }
}

#[async_trait]
impl Job for EmbedJob {
    async fn execute(&self, pool: &DbPool) -> Result<(), JobError> {
        let pending = Self::pending_documents(pool).await?;
        if pending.is_empty() {
            tracing::info!("Every knowledge document already has an embedding");
            return Ok(());
        }

        let progress = create_progress_with_job("embed", "Embedding knowledge documents");
        progress.init(pending.len(), "documents");

        let db_semaphore = Arc::new(Semaphore::new(MAX_DB_EMBED_CONCURRENCY));
        let pool = Arc::new(pool.clone());
        let mut processed = 0;

        for chunk in pending.chunks(self.batch_size) {
            let texts = chunk.iter().map(|(_, text)| text.clone()).collect();
            let embeddings = self
                .embedding_service
                .embed_batch(texts)
                .await
                .map_err(|e| JobError::Embedding(e.to_string()))?;

            let mut futures = FuturesUnordered::new();
            for ((id, _), embedding) in chunk.iter().zip(embeddings) {
                let db_semaphore = Arc::clone(&db_semaphore);
                let pool = Arc::clone(&pool);
                let id = *id;

                futures.push(async move {
                    let _permit = db_semaphore
                        .acquire()
                        .await
                        .map_err(|e| JobError::Database(format!("Semaphore error: {}", e)))?;

                    let client = pool
                        .get()
                        .await
                        .map_err(|e| JobError::Database(e.to_string()))?;
                    client
                        .execute(
                            "UPDATE knowledge_base SET embedding = $2 WHERE id = $1",
                            &[&id, &Vector::from(embedding)],
                        )
                        .await?;
                    Result::<(), JobError>::Ok(())
                });
            }

            while let Some(result) = futures.next().await {
                result?;
                processed += 1;
                progress.set(processed);
            }
        }

        progress.done(format!("Embedded {} knowledge documents", processed));
        Ok(())
    }

    fn name(&self) -> &str {
        "embed"
    }
}
