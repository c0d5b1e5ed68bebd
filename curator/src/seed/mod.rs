use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use pgvector::Vector;
use serde::Deserialize;
use serde_json::{Map, Value};

use common::{database::DbPool, services::embedding::EMBEDDING_DIM};

use crate::core::{progress::create_progress_with_job, Job, JobError};

/// One precomputed knowledge-base entry. Keys other than the known ones are
/// kept as metadata.
#[derive(Debug, Deserialize, PartialEq)]
pub struct KnowledgeDocument {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl KnowledgeDocument {
    fn has_content(&self) -> bool {
        [&self.text, &self.chunk]
            .iter()
            .any(|field| field.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    /// Matches the `content_key` column: the same source, text and chunk are
    /// one document.
    fn content_key(&self) -> (String, String, String) {
        (
            self.source.clone().unwrap_or_default(),
            self.text.clone().unwrap_or_default(),
            self.chunk.clone().unwrap_or_default(),
        )
    }

    /// Only vectors of the column's width are stored; anything else is left
    /// for the embed job to fill.
    fn vector(&self) -> Option<Vector> {
        match &self.embedding {
            Some(values) if values.len() == EMBEDDING_DIM => Some(Vector::from(values.clone())),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KnowledgeFile {
    Many(Vec<KnowledgeDocument>),
    One(KnowledgeDocument),
}

/// A knowledge file holds either a single document object or an array of them.
pub fn parse_knowledge_file(raw: &str) -> Result<Vec<KnowledgeDocument>, JobError> {
    let file: KnowledgeFile = serde_json::from_str(raw)
        .map_err(|e| JobError::Parse(format!("Invalid knowledge file: {}", e)))?;
    Ok(match file {
        KnowledgeFile::Many(documents) => documents,
        KnowledgeFile::One(document) => vec![document],
    })
}

const INSERT_DOCUMENT: &str = "INSERT INTO knowledge_base (text, chunk, source, metadata, embedding)
     VALUES ($1, $2, $3, $4, $5)
     ON CONFLICT (content_key) DO NOTHING";

/// Drops documents without content and repeats of an earlier document.
pub fn unique_documents(documents: Vec<KnowledgeDocument>) -> Vec<KnowledgeDocument> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|document| {
            if !document.has_content() {
                tracing::warn!("Skipping knowledge document without text or chunk");
                return false;
            }
            seen.insert(document.content_key())
        })
        .collect()
}

pub struct SeedJob {
    path: PathBuf,
}

impl SeedJob {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(path: &Path) -> Result<Vec<KnowledgeDocument>, JobError> {
        let raw = tokio::fs::read_to_string(path).await?;
        parse_knowledge_file(&raw)
    }
}

#[async_trait]
impl Job for SeedJob {
    async fn execute(&self, pool: &DbPool) -> Result<(), JobError> {
        let loaded = Self::load(&self.path).await?;
        let total = loaded.len();
        let documents = unique_documents(loaded);
        tracing::info!(
            "Loaded {} documents from {} ({} unique)",
            total,
            self.path.display(),
            documents.len()
        );

        let progress = create_progress_with_job("seed", "Inserting knowledge documents");
        progress.init(documents.len(), "documents");

        let mut client = pool
            .get()
            .await
            .map_err(|e| JobError::Database(e.to_string()))?;
        let tx = client.transaction().await?;
        let statement = tx.prepare(INSERT_DOCUMENT).await?;

        let mut inserted = 0u64;
        let mut pending_embedding = 0usize;
        for document in &documents {
            progress.increment();
            let embedding = document.vector();
            let metadata = Value::Object(document.metadata.clone());
            let written = tx
                .execute(
                    &statement,
                    &[
                        &document.text.clone().unwrap_or_default(),
                        &document.chunk,
                        &document.source,
                        &metadata,
                        &embedding,
                    ],
                )
                .await?;
            if written > 0 && embedding.is_none() {
                pending_embedding += 1;
            }
            inserted += written;
        }
        tx.commit().await?;

        if pending_embedding > 0 {
            tracing::warn!(
                "{} documents had no usable {}-dim embedding; run the embed job to fill them",
                pending_embedding,
                EMBEDDING_DIM
            );
        }
        progress.done(format!(
            "Inserted {} documents into knowledge_base, {} already present",
            inserted,
            documents.len() as u64 - inserted
        ));
        Ok(())
    }

    fn name(&self) -> &str {
        "seed"
    }
}
