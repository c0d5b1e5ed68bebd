use super::error::{ApiError, Result};
use serde::Deserialize;
use std::env;

pub const DEFAULT_EMBEDDING_MODEL_URL: &str = "https://router.huggingface.co/hf-inference/models/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction";
const DEV_SECRET_KEY: &str = "supersecret";
pub const DEFAULT_EVENT_SOURCE_URL: &str = "https://indian.handicrafts.gov.in";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    pub database_url: String,
    pub max_db_connections: u32,
    pub api_port: u16,
    pub run_migrations: bool,
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub gemini_api_key: Option<String>,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub groq_api_key: Option<String>,
    pub groq_model: String,
    pub hf_api_key: Option<String>,
    pub embedding_model_url: String,
    pub embedding_cache_size: usize,
    pub embedding_cache_ttl_seconds: u64,
    pub embedding_max_concurrent_requests: usize,
    pub event_source_url: String,
    pub event_scrape_pages: u32,
    pub event_scrape_workers: usize,
    pub event_match_threshold: f64,
    pub kb_embeddings_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let production = Self::optional_env("APP_ENV")
            .is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let secret_key = Self::resolve_secret_key(Self::optional_env("SECRET_KEY"), production)?;

        Ok(Self {
            database_url: Self::get_required_env("DATABASE_URL")?,
            max_db_connections: Self::parse_env("MAX_DB_CONNECTIONS", "20")?,
            api_port: Self::parse_env("PORT", "8000")?,
            run_migrations: Self::parse_env("RUN_MIGRATIONS", "true")?,
            secret_key,
            access_token_expire_minutes: Self::parse_env("ACCESS_TOKEN_EXPIRE_MINUTES", "10080")?,
            gemini_api_key: Self::optional_env("GEMINI_API_KEY"),
            gemini_text_model: Self::env_or("GEMINI_TEXT_MODEL", "gemini-2.0-flash"),
            gemini_image_model: Self::env_or(
                "GEMINI_IMAGE_MODEL",
                "gemini-2.0-flash-preview-image-generation",
            ),
            groq_api_key: Self::optional_env("GROQ_API_KEY"),
            groq_model: Self::env_or("GROQ_MODEL", "llama-3.3-70b-versatile"),
            hf_api_key: Self::optional_env("HF_API_KEY"),
            embedding_model_url: Self::env_or("EMBEDDING_MODEL_URL", DEFAULT_EMBEDDING_MODEL_URL),
            embedding_cache_size: Self::parse_env("EMBEDDING_CACHE_SIZE", "1000")?,
            embedding_cache_ttl_seconds: Self::parse_env("EMBEDDING_CACHE_TTL_SECONDS", "3600")?,
            embedding_max_concurrent_requests: Self::parse_env("EMBEDDING_MAX_CONCURRENT_REQUESTS", "8")?,
            event_source_url: Self::env_or("EVENT_SOURCE_URL", DEFAULT_EVENT_SOURCE_URL),
            event_scrape_pages: Self::parse_env("EVENT_SCRAPE_PAGES", "11")?,
            event_scrape_workers: Self::parse_env("EVENT_SCRAPE_WORKERS", "4")?,
            event_match_threshold: Self::parse_env("EVENT_MATCH_THRESHOLD", "70")?,
            kb_embeddings_path: Self::optional_env("KB_EMBEDDINGS_PATH"),
        })
    }

    /// Production refuses to start without a signing key. Elsewhere a fixed
    /// development key is used and every token it signs is forgeable.
    fn resolve_secret_key(secret: Option<String>, production: bool) -> Result<String> {
        match secret {
            Some(key) => Ok(key),
            None if production => Err(ApiError::Config(
                "SECRET_KEY must be set when APP_ENV=production".to_owned(),
            )),
            None => {
                tracing::error!(
                    "SECRET_KEY not set, signing tokens with the insecure development key"
                );
                Ok(DEV_SECRET_KEY.to_owned())
            }
        }
    }

    fn get_required_env(key: &str) -> Result<String> {
        env::var(key).map_err(|_| ApiError::Config(format!("{} not set", key)))
    }

    fn optional_env(key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn env_or(key: &str, default: &str) -> String {
        Self::optional_env(key).unwrap_or_else(|| default.to_owned())
    }

    fn parse_env<T>(key: &str, default: &str) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Debug,
    {
        env::var(key)
            .as_deref()
            .unwrap_or(default)
            .parse()
            .map_err(|_| ApiError::Config(format!("Invalid {}", key)))
    }
}
