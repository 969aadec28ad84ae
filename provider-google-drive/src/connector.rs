//! Google Drive API connector implementation
//!
//! Implements `RemoteDocumentStore` for a single JSON document on Google
//! Drive API v3. Every request carries both the OAuth bearer token and the
//! project API key.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{
    AccessToken, RemoteDocumentConnector, RemoteDocumentStore, RemoteFileHandle,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{GoogleDriveError, Result};
use crate::types::{ApiErrorResponse, CreateFileRequest, DriveFile, FilesListResponse};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive media upload base URL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const DOCUMENT_MIME_TYPE: &str = "application/json";

/// Google Drive document client
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveConnector;
///
/// let drive = GoogleDriveConnector::new(http_client, api_key)?;
/// let handle = drive.find_file(&token, "sermon-organizer-data.json").await?;
/// ```
pub struct GoogleDriveConnector {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    retry_policy: RetryPolicy,
}

impl GoogleDriveConnector {
    /// Create a new connector.
    ///
    /// # Errors
    ///
    /// `MissingApiKey` when `api_key` is blank.
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GoogleDriveError::MissingApiKey);
        }

        Ok(Self {
            http_client,
            api_key,
            retry_policy: RetryPolicy::no_retry(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Drive query for a live file with exactly this name.
    fn name_query(name: &str) -> String {
        let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
        format!("name = '{}' and trashed = false", escaped)
    }

    fn key_param(&self) -> String {
        format!("key={}", urlencoding::encode(&self.api_key))
    }

    /// Send once (unless a retry policy was opted into) and log the status.
    ///
    /// The URL is not logged since it carries the API key.
    async fn send(&self, request: HttpRequest, operation: &'static str) -> Result<HttpResponse> {
        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await
            .map_err(|e| GoogleDriveError::NetworkError(e.to_string()))?;

        debug!(operation, status = response.status, "Drive response");
        Ok(response)
    }

    fn check_status(response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ApiErrorResponse>()
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}", response.status));

        match response.status {
            401 | 403 => {
                warn!(status = response.status, "Drive rejected credentials");
                Err(GoogleDriveError::AuthenticationFailed(message))
            }
            429 => {
                let retry_after_seconds = response
                    .header("Retry-After")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(60);
                Err(GoogleDriveError::RateLimitExceeded {
                    retry_after_seconds,
                })
            }
            status_code => Err(GoogleDriveError::ApiError {
                status_code,
                message,
            }),
        }
    }

    fn parse_file(response: &HttpResponse) -> Result<RemoteFileHandle> {
        let file: DriveFile = serde_json::from_slice(&response.body)
            .map_err(|e| GoogleDriveError::ParseError(e.to_string()))?;
        Ok(RemoteFileHandle::new(file.id, file.name))
    }

    /// Most recently modified live file named `name`, if any.
    #[instrument(skip(self, credential))]
    pub async fn find_file(
        &self,
        credential: &AccessToken,
        name: &str,
    ) -> Result<Option<RemoteFileHandle>> {
        let url = format!(
            "{}/files?q={}&spaces=drive&orderBy={}&fields={}&{}",
            DRIVE_API_BASE,
            urlencoding::encode(&Self::name_query(name)),
            urlencoding::encode("modifiedTime desc"),
            urlencoding::encode("files(id,name)"),
            self.key_param()
        );
        let request = HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(credential.secret())
            .header("Accept", "application/json");

        let response = Self::check_status(self.send(request, "files.list").await?)?;
        let list: FilesListResponse = serde_json::from_slice(&response.body)
            .map_err(|e| GoogleDriveError::ParseError(e.to_string()))?;

        if list.files.len() > 1 {
            warn!(count = list.files.len(), "Several files share the name, using newest");
        }

        Ok(list
            .files
            .into_iter()
            .next()
            .map(|file| RemoteFileHandle::new(file.id, file.name)))
    }

    /// Create an empty JSON file.
    #[instrument(skip(self, credential))]
    pub async fn create_file(
        &self,
        credential: &AccessToken,
        name: &str,
    ) -> Result<RemoteFileHandle> {
        let url = format!("{}/files?fields=id,name&{}", DRIVE_API_BASE, self.key_param());
        let request = HttpRequest::new(HttpMethod::Post, url)
            .bearer_token(credential.secret())
            .json(&CreateFileRequest {
                name,
                mime_type: DOCUMENT_MIME_TYPE,
            })
            .map_err(|e| GoogleDriveError::ParseError(e.to_string()))?;

        let response = Self::check_status(self.send(request, "files.create").await?)?;
        let handle = Self::parse_file(&response)?;

        info!(file_id = %handle.id, "Created remote file");
        Ok(handle)
    }

    /// File content, or `None` when the file no longer exists.
    #[instrument(skip(self, credential), fields(file_id = %handle.id))]
    pub async fn download_file(
        &self,
        credential: &AccessToken,
        handle: &RemoteFileHandle,
    ) -> Result<Option<Bytes>> {
        let url = format!(
            "{}/files/{}?alt=media&{}",
            DRIVE_API_BASE,
            urlencoding::encode(&handle.id),
            self.key_param()
        );
        let request = HttpRequest::new(HttpMethod::Get, url).bearer_token(credential.secret());

        let response = self.send(request, "files.get").await?;
        if response.status == 404 {
            info!("Remote file not found");
            return Ok(None);
        }

        let response = Self::check_status(response)?;
        debug!(bytes = response.body.len(), "Downloaded remote file");
        Ok(Some(response.body))
    }

    /// Replace the file content.
    #[instrument(skip(self, credential, content), fields(file_id = %handle.id, bytes = content.len()))]
    pub async fn upload_file(
        &self,
        credential: &AccessToken,
        handle: &RemoteFileHandle,
        content: Bytes,
    ) -> Result<()> {
        let url = format!(
            "{}/files/{}?uploadType=media&{}",
            DRIVE_UPLOAD_BASE,
            urlencoding::encode(&handle.id),
            self.key_param()
        );
        let request = HttpRequest::new(HttpMethod::Patch, url)
            .bearer_token(credential.secret())
            .header("Content-Type", DOCUMENT_MIME_TYPE)
            .body(content);

        Self::check_status(self.send(request, "files.update").await?)?;
        info!("Uploaded remote file");
        Ok(())
    }
}

#[async_trait]
impl RemoteDocumentStore for GoogleDriveConnector {
    async fn find_by_name(
        &self,
        credential: &AccessToken,
        name: &str,
    ) -> bridge_traits::error::Result<Option<RemoteFileHandle>> {
        Ok(self.find_file(credential, name).await?)
    }

    async fn create(
        &self,
        credential: &AccessToken,
        name: &str,
    ) -> bridge_traits::error::Result<RemoteFileHandle> {
        Ok(self.create_file(credential, name).await?)
    }

    async fn download(
        &self,
        credential: &AccessToken,
        handle: &RemoteFileHandle,
    ) -> bridge_traits::error::Result<Option<Bytes>> {
        Ok(self.download_file(credential, handle).await?)
    }

    async fn upload(
        &self,
        credential: &AccessToken,
        handle: &RemoteFileHandle,
        content: Bytes,
    ) -> bridge_traits::error::Result<()> {
        Ok(self.upload_file(credential, handle, content).await?)
    }
}

/// Builds [`GoogleDriveConnector`]s sharing one HTTP client.
pub struct GoogleDriveConnectorFactory {
    http_client: Arc<dyn HttpClient>,
}

impl GoogleDriveConnectorFactory {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

impl RemoteDocumentConnector for GoogleDriveConnectorFactory {
    fn connect(&self, api_key: &str) -> bridge_traits::error::Result<Arc<dyn RemoteDocumentStore>> {
        let connector = GoogleDriveConnector::new(self.http_client.clone(), api_key)?;
        Ok(Arc::new(connector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
            async fn execute_with_retry(
                &self,
                request: HttpRequest,
                policy: RetryPolicy,
            ) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn token() -> AccessToken {
        AccessToken::new("ya29.test")
    }

    fn connector(http: MockHttp) -> GoogleDriveConnector {
        GoogleDriveConnector::new(Arc::new(http), "api-key-123").unwrap()
    }

    #[test]
    fn test_blank_api_key_rejected() {
        let result = GoogleDriveConnector::new(Arc::new(MockHttp::new()), "  ");
        assert!(matches!(result, Err(GoogleDriveError::MissingApiKey)));
    }

    #[test]
    fn test_factory_reports_missing_key() {
        let factory = GoogleDriveConnectorFactory::new(Arc::new(MockHttp::new()));
        assert!(matches!(
            factory.connect(""),
            Err(BridgeError::NotAvailable(_))
        ));
        assert!(factory.connect("key").is_ok());
    }

    #[test]
    fn test_name_query_escapes_quotes() {
        assert_eq!(
            GoogleDriveConnector::name_query("it's\\data.json"),
            "name = 'it\\'s\\\\data.json' and trashed = false"
        );
    }

    #[tokio::test]
    async fn test_find_by_name_returns_first_match() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .withf(|req, _| {
                req.method == HttpMethod::Get
                    && req.url.starts_with("https://www.googleapis.com/drive/v3/files?q=")
                    && req.url.contains("trashed%20%3D%20false")
                    && req.url.ends_with("key=api-key-123")
                    && req.headers.get("Authorization") == Some(&"Bearer ya29.test".to_string())
            })
            .times(1)
            .returning(|_, _| {
                Ok(response(
                    200,
                    r#"{"files":[{"id":"newest","name":"data.json"},{"id":"older","name":"data.json"}]}"#,
                ))
            });

        let handle = connector(http)
            .find_by_name(&token(), "data.json")
            .await
            .unwrap();
        assert_eq!(handle, Some(RemoteFileHandle::new("newest", "data.json")));
    }

    #[tokio::test]
    async fn test_find_by_name_none() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .returning(|_, _| Ok(response(200, r#"{"files":[]}"#)));

        let handle = connector(http).find_file(&token(), "data.json").await.unwrap();
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_create_posts_json_metadata() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .withf(|req, _| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                req.method == HttpMethod::Post
                    && body["name"] == "data.json"
                    && body["mimeType"] == "application/json"
            })
            .times(1)
            .returning(|_, _| Ok(response(200, r#"{"id":"new-id","name":"data.json"}"#)));

        let handle = connector(http).create(&token(), "data.json").await.unwrap();
        assert_eq!(handle.id, "new-id");
    }

    #[tokio::test]
    async fn test_create_sends_once_and_surfaces_server_error() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .withf(|req, policy| req.method == HttpMethod::Post && policy.max_attempts == 1)
            .times(1)
            .returning(|_, _| Ok(response(503, r#"{"error":{"code":503,"message":"Backend Error"}}"#)));

        let err = connector(http)
            .create_file(&token(), "data.json")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GoogleDriveError::ApiError {
                status_code: 503,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_download_not_found_is_none() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .withf(|req, _| req.url.contains("/files/abc?alt=media"))
            .returning(|_, _| {
                Ok(response(404, r#"{"error":{"code":404,"message":"File not found"}}"#))
            });

        let handle = RemoteFileHandle::new("abc", "data.json");
        assert!(connector(http)
            .download(&token(), &handle)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_download_returns_body() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .returning(|_, _| Ok(response(200, r#"{"keywords":[]}"#)));

        let handle = RemoteFileHandle::new("abc", "data.json");
        let body = connector(http).download(&token(), &handle).await.unwrap();
        assert_eq!(body, Some(Bytes::from_static(br#"{"keywords":[]}"#)));
    }

    #[tokio::test]
    async fn test_upload_patches_media_endpoint() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .withf(|req, _| {
                req.method == HttpMethod::Patch
                    && req
                        .url
                        .starts_with("https://www.googleapis.com/upload/drive/v3/files/abc?uploadType=media")
                    && req.body == Some(Bytes::from_static(b"{}"))
            })
            .times(1)
            .returning(|_, _| Ok(response(200, r#"{"id":"abc"}"#)));

        let handle = RemoteFileHandle::new("abc", "data.json");
        connector(http)
            .upload(&token(), &handle, Bytes::from_static(b"{}"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut http = MockHttp::new();
        let mut seq = mockall::Sequence::new();
        http.expect_execute_with_retry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(response(401, r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)));
        http.expect_execute_with_retry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                let mut resp = response(429, "");
                resp.headers.insert("retry-after".to_string(), "7".to_string());
                Ok(resp)
            });
        http.expect_execute_with_retry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(response(500, "oops")));
        http.expect_execute_with_retry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(BridgeError::OperationFailed("connection reset".to_string())));

        let drive = connector(http);
        assert!(matches!(
            drive.find_file(&token(), "a").await,
            Err(GoogleDriveError::AuthenticationFailed(msg)) if msg == "Invalid Credentials"
        ));
        assert!(matches!(
            drive.find_file(&token(), "a").await,
            Err(GoogleDriveError::RateLimitExceeded { retry_after_seconds: 7 })
        ));
        assert!(matches!(
            drive.find_file(&token(), "a").await,
            Err(GoogleDriveError::ApiError { status_code: 500, .. })
        ));
        assert!(matches!(
            drive.find_file(&token(), "a").await,
            Err(GoogleDriveError::NetworkError(_))
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_bridge_unauthorized() {
        let mut http = MockHttp::new();
        http.expect_execute_with_retry()
            .returning(|_, _| Ok(response(403, "")));

        let store: Arc<dyn RemoteDocumentStore> = Arc::new(connector(http));
        let result = store
            .upload(&token(), &RemoteFileHandle::new("abc", "x"), Bytes::new())
            .await;
        assert!(matches!(result, Err(BridgeError::Unauthorized(_))));
    }
}
