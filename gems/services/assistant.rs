use deadpool_postgres::Client;
use pgvector::Vector;
use tracing::{debug, instrument};

use common::{
    database::DbPool,
    services::{EmbeddingService, GeminiClient},
};

use crate::{
    models::assistant::{ChatRequest, ChatResponse, RetrievedDocument},
    utils::error::{ApiError, Result},
};

pub const MAX_TOP_K: i64 = 20;

const NO_CONTEXT_ANSWER: &str = "I couldn't find anything in the knowledge base about that yet. \
     Try rephrasing your question or ask about artisan schemes, crafts, or events.";

pub fn clamp_top_k(top_k: i64) -> i64 {
    top_k.clamp(1, MAX_TOP_K)
}

/// `None` when the retrieved documents carry text worth answering from,
/// otherwise the fixed reply sent without calling the model.
pub fn fallback_answer(documents: &[RetrievedDocument]) -> Option<&'static str> {
    if documents.iter().all(|doc| doc.text.trim().is_empty()) {
        Some(NO_CONTEXT_ANSWER)
    } else {
        None
    }
}

pub fn answer_prompt(query: &str, documents: &[RetrievedDocument]) -> String {
    let context = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[{}] {}", i + 1, doc.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are the assistant of Hidden Gems, a marketplace for Indian artisans and handicrafts. \
         Answer the user's question using only the context below. \
         If the context does not contain the answer, say so briefly instead of guessing. \
         Keep the answer clear and practical.\n\n\
         Context:\n{context}\n\nQuestion: {query}\n\nAnswer:"
    )
}

async fn search_knowledge_base(
    client: &Client,
    embedding: Vec<f32>,
    top_k: i64,
) -> Result<Vec<RetrievedDocument>> {
    let embedding = Vector::from(embedding);
    let rows = client
        .query(
            "SELECT id, COALESCE(NULLIF(text, ''), chunk, '') AS text,
                    1 - (embedding <=> $1) AS score
             FROM knowledge_base
             WHERE embedding IS NOT NULL
             ORDER BY embedding <=> $1
             LIMIT $2",
            &[&embedding, &top_k],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| RetrievedDocument {
            id: row.get("id"),
            score: row.get("score"),
            text: row.get("text"),
        })
        .collect())
}

/// Embeds the question, pulls the nearest knowledge-base documents and asks
/// Gemini to answer from them.
#[instrument(skip(pool, embeddings, gemini, request), fields(top_k = request.top_k))]
pub async fn answer(
    pool: &DbPool,
    embeddings: &EmbeddingService,
    gemini: &GeminiClient,
    request: ChatRequest,
) -> Result<ChatResponse> {
    let query = request.query.trim().to_owned();
    if query.is_empty() {
        return Err(ApiError::validation("query", "Query must not be empty"));
    }

    let embedding = embeddings.embed_text(&query).await?;
    let client = pool.get().await?;
    let retrieved = search_knowledge_base(&client, embedding, clamp_top_k(request.top_k)).await?;
    debug!(retrieved = retrieved.len(), "Knowledge base search finished");

    let answer = match fallback_answer(&retrieved) {
        Some(fixed) => fixed.to_owned(),
        None => gemini.generate_text(&answer_prompt(&query, &retrieved)).await?,
    };

    Ok(ChatResponse {
        query,
        retrieved,
        answer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn top_k_is_clamped() {
        assert_eq!(clamp_top_k(0), 1);
        assert_eq!(clamp_top_k(-4), 1);
        assert_eq!(clamp_top_k(3), 3);
        assert_eq!(clamp_top_k(500), MAX_TOP_K);
    }

    #[test]
    fn prompt_numbers_each_document() {
        let docs = vec![
            RetrievedDocument {
                id: Uuid::new_v4(),
                score: 0.91,
                text: " Artisans can apply for the Mudra loan. ".into(),
            },
            RetrievedDocument {
                id: Uuid::new_v4(),
                score: 0.72,
                text: "GI tags protect regional crafts.".into(),
            },
        ];

        let prompt = answer_prompt("I want funding", &docs);
        assert!(prompt.contains("[1] Artisans can apply for the Mudra loan.\n\n[2] GI tags"));
        assert!(prompt.ends_with("Question: I want funding\n\nAnswer:"));
    }

    fn doc(text: &str) -> RetrievedDocument {
        RetrievedDocument {
            id: Uuid::new_v4(),
            score: 0.5,
            text: text.into(),
        }
    }

    #[test]
    fn blank_retrieval_gets_the_fixed_answer() {
        assert_eq!(fallback_answer(&[]), Some(NO_CONTEXT_ANSWER));
        assert_eq!(fallback_answer(&[doc(""), doc("  \n")]), Some(NO_CONTEXT_ANSWER));
    }

    #[test]
    fn any_retrieved_text_goes_to_the_model() {
        assert_eq!(fallback_answer(&[doc(""), doc("Kantha is running-stitch embroidery.")]), None);
    }
}
