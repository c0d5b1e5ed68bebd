use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::instrument;

use super::external::{Credential, ExternalApiService};
use crate::utils::{
    config::Config,
    error::{ApiError, Result},
    modal::{GeminiBlob, GeminiContent, GeminiGenerationConfig, GeminiPart, GeminiRequest, GeminiResponse},
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl InlineImage {
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

#[derive(Debug, Default)]
pub struct GeminiOutput {
    pub text: Option<String>,
    pub images: Vec<InlineImage>,
}

/// Client for the `generateContent` endpoint. The text model serves story and
/// chat generation; the image model handles multimodal prompts and posters.
#[derive(Clone)]
pub struct GeminiClient {
    http: ExternalApiService,
    api_key: Option<String>,
    text_model: String,
    image_model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &Config, http: ExternalApiService) -> Self {
        Self {
            http,
            api_key: config.gemini_api_key.clone(),
            text_model: config.gemini_text_model.clone(),
            image_model: config.gemini_image_model.clone(),
            base_url: GEMINI_BASE_URL.to_owned(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[instrument(skip(self, prompt), fields(model = %self.text_model))]
    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_owned()),
                parts: vec![text_part(prompt)],
            }],
            generation_config: None,
        };

        let output = self.call(&self.text_model, &request).await?;
        output
            .text
            .ok_or_else(|| ApiError::ExternalApi("Gemini returned no text".to_owned()))
    }

    /// Sends a prompt plus an optional image to the image-capable model and
    /// returns every text and image part of the first candidate.
    #[instrument(skip(self, prompt, image), fields(model = %self.image_model))]
    pub async fn generate_multimodal(
        &self,
        prompt: &str,
        image: Option<&InlineImage>,
    ) -> Result<GeminiOutput> {
        let mut parts = vec![text_part(prompt)];
        if let Some(image) = image {
            parts.push(GeminiPart {
                text: None,
                inline_data: Some(GeminiBlob {
                    mime_type: image.mime_type.clone(),
                    data: STANDARD.encode(&image.bytes),
                }),
            });
        }

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_owned()),
                parts,
            }],
            generation_config: Some(GeminiGenerationConfig {
                response_modalities: vec!["TEXT".to_owned(), "IMAGE".to_owned()],
            }),
        };

        self.call(&self.image_model, &request).await
    }

    async fn call(&self, model: &str, request: &GeminiRequest) -> Result<GeminiOutput> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Config("GEMINI_API_KEY not set".to_owned()))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );
        let response: GeminiResponse = self
            .http
            .post_json(&url, Some(Credential::Header("x-goog-api-key", api_key)), request)
            .await?;

        collect_output(response)
    }
}

fn text_part(text: &str) -> GeminiPart {
    GeminiPart {
        text: Some(text.to_owned()),
        inline_data: None,
    }
}

fn collect_output(response: GeminiResponse) -> Result<GeminiOutput> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .ok_or_else(|| ApiError::ExternalApi("Gemini returned no candidates".to_owned()))?;

    let mut output = GeminiOutput::default();
    for part in content.parts {
        if let Some(text) = part.text.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty()) {
            if output.text.is_none() {
                output.text = Some(text);
            }
        }
        if let Some(blob) = part.inline_data {
            let bytes = STANDARD
                .decode(blob.data.as_bytes())
                .map_err(|e| ApiError::ExternalApi(format!("Gemini returned invalid image data: {e}")))?;
            output.images.push(InlineImage {
                mime_type: blob.mime_type,
                bytes,
            });
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Path, http::HeaderMap, routing::post};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn fake_gemini() -> String {
        let router = Router::new().route(
            "/v1beta/models/{call}",
            post(|Path(call): Path<String>, headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-goog-api-key"], "g-key");
                let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
                let mut parts = vec![json!({"text": format!("  {call}: {prompt}  ")})];
                if body["contents"][0]["parts"].as_array().map_or(0, Vec::len) > 1 {
                    parts.push(json!({"inlineData": {"mimeType": "image/png", "data": STANDARD.encode(b"poster")}}));
                }
                Json(json!({"candidates": [{"content": {"role": "model", "parts": parts}}]}))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn client(base: String, key: Option<&str>) -> GeminiClient {
        let config = Config {
            gemini_api_key: key.map(str::to_owned),
            gemini_text_model: "text-model".into(),
            gemini_image_model: "image-model".into(),
            ..Config::default()
        };
        let http = ExternalApiService::new()
            .unwrap()
            .with_retry_policy(1, Duration::from_millis(1));
        GeminiClient::new(&config, http).with_base_url(base)
    }

    #[tokio::test]
    async fn text_generation_trims_and_targets_text_model() {
        let gemini = client(fake_gemini().await, Some("g-key"));
        let text = gemini.generate_text("tell a story").await.unwrap();
        assert_eq!(text, "text-model:generateContent: tell a story");
    }

    #[tokio::test]
    async fn multimodal_generation_decodes_images() {
        let gemini = client(fake_gemini().await, Some("g-key"));
        let image = InlineImage {
            mime_type: "image/jpeg".into(),
            bytes: vec![0xff, 0xd8],
        };
        let output = gemini.generate_multimodal("make a poster", Some(&image)).await.unwrap();

        assert!(output.text.unwrap().starts_with("image-model"));
        assert_eq!(output.images.len(), 1);
        assert_eq!(output.images[0].bytes, b"poster");
        assert_eq!(output.images[0].extension(), "png");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let gemini = client("http://127.0.0.1:9".into(), None);
        assert!(matches!(
            gemini.generate_text("hi").await.unwrap_err(),
            ApiError::Config(msg) if msg.contains("GEMINI_API_KEY")
        ));
    }

    #[test]
    fn empty_candidates_are_an_upstream_error() {
        let err = collect_output(GeminiResponse { candidates: vec![] }).unwrap_err();
        assert!(matches!(err, ApiError::ExternalApi(_)));
    }
}
