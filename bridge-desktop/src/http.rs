//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("sermon-organizer-core/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based HTTP client implementation
///
/// Connection pooling and TLS come from reqwest. `execute` sends a request
/// exactly once; only an explicit [`RetryPolicy`] passed to
/// `execute_with_retry` resends on 429/5xx. When attempts run out the last
/// response is handed back so callers can map the status themselves.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    ///
    /// Falls back to reqwest's default client if the tuned builder is rejected.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Self::try_with_timeout(timeout) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Falling back to default HTTP client configuration");
                Self {
                    client: Client::new(),
                }
            }
        }
    }

    /// Build a client, surfacing builder failures (e.g. TLS backend init)
    pub fn try_with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    fn build_request(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(Self::convert_method(request.method), &request.url);

        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to read body: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn map_send_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::OperationFailed("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::no_retry())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            // URLs may carry an API key in the query string; log the method only.
            debug!(
                attempt,
                max_attempts,
                method = ?request.method,
                "Executing HTTP request"
            );

            let outcome = match self.build_request(&request).send().await {
                Ok(response) => {
                    let response = Self::into_response(response).await?;
                    if !response.is_retryable() || attempt >= max_attempts {
                        return Ok(response);
                    }
                    warn!(
                        status = response.status,
                        attempt, "HTTP request failed with retryable status"
                    );
                    Ok(())
                }
                Err(e) => {
                    warn!(attempt, error_kind = %describe(&e), "HTTP request failed");
                    Err(Self::map_send_error(e))
                }
            };

            if attempt >= max_attempts {
                // Only transport errors reach this point
                return match outcome {
                    Err(e) => Err(e),
                    Ok(()) => Err(BridgeError::OperationFailed(
                        "All retry attempts exhausted".to_string(),
                    )),
                };
            }

            let delay = policy.delay_for(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }
}

fn describe(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_request() {
        "request"
    } else {
        "other"
    }
}
