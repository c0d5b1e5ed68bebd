use crate::utils::error::{ApiError, Result};
use crate::utils::modal::ProviderErrorEnvelope;

use std::time::Duration;
use tokio::time::sleep;

use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode, header::RETRY_AFTER};
use serde::{Serialize, de::DeserializeOwned};

/// How a request authenticates against the upstream service.
#[derive(Clone, Copy, Debug)]
pub enum Credential<'a> {
    Bearer(&'a str),
    Header(&'static str, &'a str),
}

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Shared outbound HTTP client. Every call to a hosted model or to the event
/// source goes through here so retry and error mapping behave the same.
#[derive(Clone)]
pub struct ExternalApiService {
    client: Client,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl ExternalApiService {
    pub fn new() -> Result<Self> {
        let client = ClientBuilder::new()
            .user_agent("hidden-gems/1.0")
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ApiError::ExternalApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_secs(1),
        })
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, initial_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.initial_backoff = initial_backoff;
        self
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send_with_retry(url, || self.client.get(url)).await?;
        response
            .text()
            .await
            .map_err(|e| ApiError::ExternalApi(format!("Failed to read response body from {}: {}", url, e)))
    }

    pub async fn post_json<B, T>(&self, url: &str, credential: Option<Credential<'_>>, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send_with_retry(url, || {
                let request = self.client.post(url).json(body);
                match credential {
                    Some(Credential::Bearer(token)) => request.bearer_auth(token),
                    Some(Credential::Header(name, value)) => request.header(name, value),
                    None => request,
                }
            })
            .await?;

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::ExternalApi(format!("Failed to read response body: {}", e)))?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::ExternalApi(format!("Failed to parse API response: {}", e)))
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = self.initial_backoff;

        for attempt in 1..=self.max_attempts {
            let last_attempt = attempt == self.max_attempts;

            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let retry_after = retry_after_secs(&response);
                    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

                    if retryable && !last_attempt {
                        let delay = retry_after
                            .map(Duration::from_secs)
                            .unwrap_or(backoff)
                            .min(MAX_BACKOFF);
                        tracing::warn!(
                            "{} returned {}, retrying in {:?} (attempt {}/{})",
                            url, status, delay, attempt, self.max_attempts
                        );
                        sleep(delay).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unable to read response body".to_string());
                    return Err(status_error(status, retry_after, &body));
                }
                Err(e) if !last_attempt && (e.is_timeout() || e.is_connect()) => {
                    tracing::warn!(
                        "Network error {}, retrying in {:?} (attempt {}/{})",
                        e, backoff, attempt, self.max_attempts
                    );
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => {
                    return Err(ApiError::ExternalApi(format!("Failed to reach {}: {}", url, e)));
                }
            }
        }

        Err(ApiError::ExternalApi(format!("Gave up on {} after {} attempts", url, self.max_attempts)))
    }
}

fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> ApiError {
    let detail = serde_json::from_str::<ProviderErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.chars().take(500).collect());

    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimit {
            retry_after: retry_after.unwrap_or(60),
            message: format!("Upstream rate limit: {}", detail),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::ExternalApi(format!(
            "Upstream rejected credentials ({}): {}",
            status, detail
        )),
        _ => ApiError::ExternalApi(format!("HTTP error: {} - {}", status, detail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode as AxumStatus, routing::{get, post}};
    use serde_json::{Value, json};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fast_client() -> ExternalApiService {
        ExternalApiService::new()
            .unwrap()
            .with_retry_policy(3, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/flaky",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (AxumStatus::SERVICE_UNAVAILABLE, "busy".to_string())
                    } else {
                        (AxumStatus::OK, "ready".to_string())
                    }
                }
            }),
        );
        let base = serve(router).await;

        let body = fast_client().get_text(&format!("{base}/flaky")).await.unwrap();
        assert_eq!(body, "ready");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/missing",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { (AxumStatus::NOT_FOUND, "nope") }
            }),
        );
        let base = serve(router).await;

        let err = fast_client().get_text(&format!("{base}/missing")).await.unwrap_err();
        assert!(matches!(err, ApiError::ExternalApi(ref msg) if msg.contains("404")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_rate_limit_surfaces_retry_after() {
        let router = Router::new().route(
            "/limited",
            post(|| async {
                (
                    AxumStatus::TOO_MANY_REQUESTS,
                    [("retry-after", "0")],
                    Json(json!({"error": {"message": "quota exceeded"}})),
                )
            }),
        );
        let base = serve(router).await;

        let err = fast_client()
            .post_json::<_, Value>(&format!("{base}/limited"), Some(Credential::Bearer("token")), &json!({}))
            .await
            .unwrap_err();
        match err {
            ApiError::RateLimit { retry_after, message } => {
                assert_eq!(retry_after, 0);
                assert!(message.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_json_sends_bearer_and_decodes_reply() {
        let router = Router::new().route(
            "/echo",
            post(|headers: axum::http::HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"auth": auth, "inputs": body["inputs"]}))
            }),
        );
        let base = serve(router).await;

        let reply: Value = fast_client()
            .post_json(&format!("{base}/echo"), Some(Credential::Bearer("abc")), &json!({"inputs": "clay pots"}))
            .await
            .unwrap();
        assert_eq!(reply["auth"], "Bearer abc");
        assert_eq!(reply["inputs"], "clay pots");
    }
}
