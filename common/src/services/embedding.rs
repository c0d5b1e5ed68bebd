use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use super::external::{Credential, ExternalApiService};
use crate::utils::{
    config::Config,
    error::{ApiError, Result},
    modal::{EmbeddingRequest, EmbeddingResponse},
};

/// all-MiniLM-L6-v2 output width; the knowledge_base column is declared with it.
pub const EMBEDDING_DIM: usize = 384;

#[derive(Clone, Hash, PartialEq, Eq)]
struct CacheKey(String);

#[derive(Clone)]
struct CacheEntry {
    embedding: Vec<f32>,
    created_at: Instant,
}

/// Sentence embeddings from the hosted feature-extraction endpoint, with a
/// small TTL cache in front of it and a cap on in-flight requests.
pub struct EmbeddingService {
    http: ExternalApiService,
    endpoint: String,
    api_key: Option<String>,
    semaphore: Arc<Semaphore>,
    cache: Arc<Mutex<HashMap<CacheKey, CacheEntry>>>,
    cache_capacity: usize,
    cache_ttl: Duration,
}

impl EmbeddingService {
    pub fn new(config: &Config, http: ExternalApiService) -> Self {
        let max_concurrent = config.embedding_max_concurrent_requests.max(1);

        info!(
            "Embedding service targeting {} with {} concurrent slots, cache size {}",
            config.embedding_model_url, max_concurrent, config.embedding_cache_size
        );

        Self {
            http,
            endpoint: config.embedding_model_url.clone(),
            api_key: config.hf_api_key.clone(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            cache: Arc::new(Mutex::new(HashMap::with_capacity(config.embedding_cache_size))),
            cache_capacity: config.embedding_cache_size,
            cache_ttl: Duration::from_secs(config.embedding_cache_ttl_seconds),
        }
    }

    #[instrument(skip(self, sentences))]
    pub async fn embed_batch(&self, sentences: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let mut futures = FuturesUnordered::new();
        for (idx, sentence) in sentences.into_iter().enumerate() {
            futures.push(async move {
                let embedding = self.embed_text(&sentence).await?;
                Result::Ok((idx, embedding))
            });
        }

        let mut results = Vec::new();
        while let Some(result) = futures.next().await {
            results.push(result?);
        }

        results.sort_by_key(|(idx, _)| *idx);
        Ok(results.into_iter().map(|(_, embedding)| embedding).collect())
    }

    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::validation("query", "Cannot embed empty text"));
        }

        let cache_key = CacheKey(text.to_string());
        if let Some(hit) = self.cached(&cache_key) {
            debug!("Embedding cache hit");
            return Ok(hit);
        }

        let embedding = self.request_embedding(text).await?;
        self.remember(cache_key, &embedding);
        Ok(embedding)
    }

    fn cached(&self, key: &CacheKey) -> Option<Vec<f32>> {
        let cache = self.cache.lock();
        cache
            .get(key)
            .filter(|entry| entry.created_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.embedding.clone())
    }

    fn remember(&self, key: CacheKey, embedding: &[f32]) {
        if self.cache_capacity == 0 || self.cache_ttl.is_zero() {
            return;
        }

        let mut cache = self.cache.lock();
        if cache.len() >= self.cache_capacity {
            let now = Instant::now();
            cache.retain(|_, entry| now.duration_since(entry.created_at) < self.cache_ttl);
            if cache.len() >= self.cache_capacity {
                cache.clear();
            }
        }

        cache.insert(
            key,
            CacheEntry {
                embedding: embedding.to_vec(),
                created_at: Instant::now(),
            },
        );
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Config("HF_API_KEY not set".to_owned()))?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ApiError::Embedding("Failed to acquire semaphore".to_owned()))?;

        let response: EmbeddingResponse = self
            .http
            .post_json(&self.endpoint, Some(Credential::Bearer(api_key)), &EmbeddingRequest { inputs: text })
            .await?;

        let embedding = response
            .into_vector()
            .ok_or_else(|| ApiError::Embedding("Empty embedding response".to_owned()))?;

        check_dimension(embedding)
    }
}

fn check_dimension(embedding: Vec<f32>) -> Result<Vec<f32>> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(ApiError::Embedding(format!(
            "Expected {} dimensions, got {}",
            EMBEDDING_DIM,
            embedding.len()
        )));
    }
    Ok(embedding)
}
