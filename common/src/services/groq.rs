use tracing::instrument;

use super::external::{Credential, ExternalApiService};
use crate::utils::{
    config::Config,
    error::{ApiError, Result},
    modal::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage},
};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone, Copy)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 1000,
            top_p: 1.0,
        }
    }
}

/// OpenAI-compatible chat completions against Groq.
#[derive(Clone)]
pub struct GroqClient {
    http: ExternalApiService,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GroqClient {
    pub fn new(config: &Config, http: ExternalApiService) -> Self {
        Self {
            http,
            api_key: config.groq_api_key.clone(),
            model: config.groq_model.clone(),
            base_url: GROQ_BASE_URL.to_owned(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[instrument(skip(self, system, user), fields(model = %self.model))]
    pub async fn complete(&self, system: &str, user: &str, options: SamplingOptions) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Config("GROQ_API_KEY not set".to_owned()))?;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_owned(),
                    content: system.to_owned(),
                },
                ChatMessage {
                    role: "user".to_owned(),
                    content: user.to_owned(),
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response: ChatCompletionResponse = self
            .http
            .post_json(&url, Some(Credential::Bearer(api_key)), &request)
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_owned())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ApiError::ExternalApi("Groq returned an empty completion".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn fake_groq(reply: &'static str) -> String {
        let router = Router::new().route(
            "/chat/completions",
            post(move |Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "llama-test");
                assert_eq!(body["messages"][0]["role"], "system");
                assert_eq!(body["stream"], false);
                Json(json!({"choices": [{"message": {"role": "assistant", "content": reply}}]}))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn client(base: String) -> GroqClient {
        let config = Config {
            groq_api_key: Some("gsk".into()),
            groq_model: "llama-test".into(),
            ..Config::default()
        };
        let http = ExternalApiService::new()
            .unwrap()
            .with_retry_policy(1, Duration::from_millis(1));
        GroqClient::new(&config, http).with_base_url(base)
    }

    #[tokio::test]
    async fn completion_content_is_trimmed() {
        let groq = client(fake_groq("  A fine bowl.\n").await);
        let out = groq
            .complete("system", "describe", SamplingOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "A fine bowl.");
    }

    #[tokio::test]
    async fn blank_completion_is_an_error() {
        let groq = client(fake_groq("   ").await);
        let err = groq
            .complete("system", "describe", SamplingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ExternalApi(_)));
    }
}
