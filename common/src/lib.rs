pub mod utils;
pub mod services;
pub mod database;

pub use utils::{Config, Result, ApiError};
pub use services::{EmbeddingService, ExternalApiService, GeminiClient, GroqClient};
pub use database::{DbPool, ConnectionManager, create_pool, ping, run_migrations};
