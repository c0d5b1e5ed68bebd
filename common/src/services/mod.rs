pub mod embedding;
pub mod external;
pub mod gemini;
pub mod groq;

pub use embedding::EmbeddingService;
pub use external::ExternalApiService;
pub use gemini::GeminiClient;
pub use groq::GroqClient;
