//! Google Drive API client
//!
//! Provides a typed HTTP client for the Drive v3 API. The client holds no
//! credentials: each request is built with the access token of the account
//! it acts on, so one client serves every linked account.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivemirror_drive::client::DriveClient;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), drivemirror_drive::DriveError> {
//! let client = DriveClient::new();
//! let request = client.request(Method::GET, "/drive/v3/about?fields=user", "ya29.token");
//! let response = client.execute_with_retry(request).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::{types::ApiErrorEnvelope, DriveError};

/// Base URL for Google APIs
pub const GOOGLE_API_BASE_URL: &str = "https://www.googleapis.com";

/// Path prefix for Drive v3 metadata endpoints
pub const FILES_PATH: &str = "/drive/v3/files";

/// Path prefix for Drive v3 media upload endpoints
pub const UPLOAD_PATH: &str = "/upload/drive/v3/files";

/// Default retry-after duration when header is missing
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

/// Upper bound on a single backoff sleep
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Maximum number of retries for 429 and 5xx responses
const DEFAULT_MAX_RETRIES: u32 = 3;

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for Google Drive API calls
///
/// Wraps `reqwest::Client` with base URL construction and response status
/// classification. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DriveClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Retries for throttled or failed requests
    max_retries: u32,
}

impl DriveClient {
    /// Creates a new DriveClient against the public Google API endpoint
    pub fn new() -> Self {
        Self::with_base_url(GOOGLE_API_BASE_URL)
    }

    /// Creates a new DriveClient with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Overrides the retry budget for 429 and 5xx responses
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    ///
    /// Automatically prepends the base URL and adds the Authorization header.
    pub fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url).bearer_auth(token)
    }

    /// Creates an authenticated request builder for an absolute URL
    ///
    /// Used for resumable upload session URIs returned by Drive.
    pub fn request_url(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(token)
    }

    /// Sends a request once and classifies the response status
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, DriveError> {
        let response = request.send().await?;
        check_status(response).await
    }

    /// Sends a request, retrying on 429 and 5xx responses
    ///
    /// Requests whose body cannot be cloned (streamed uploads) are sent once.
    pub async fn execute_with_retry(&self, request: RequestBuilder) -> Result<Response, DriveError> {
        let mut attempt = 0;
        loop {
            let Some(current) = request.try_clone() else {
                return self.execute(request).await;
            };

            match self.execute(current).await {
                Err(DriveError::TooManyRequests { retry_after }) if attempt < self.max_retries => {
                    info!(
                        attempt,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "Received 429, backing off"
                    );
                    tokio::time::sleep(retry_after.min(MAX_RETRY_AFTER)).await;
                }
                Err(DriveError::ServerError(msg)) if attempt < self.max_retries => {
                    let delay = DEFAULT_RETRY_AFTER * 2u32.pow(attempt);
                    warn!(attempt, error = %msg, "Server error, retrying");
                    tokio::time::sleep(delay.min(MAX_RETRY_AFTER)).await;
                }
                Ok(response) => {
                    if attempt > 0 {
                        info!(attempt, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) => return Err(e),
            }
            attempt += 1;
        }
    }
}

impl Default for DriveClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Status classification
// ============================================================================

/// Maps non-success statuses to [`DriveError`] variants
pub(crate) async fn check_status(response: Response) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER));
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    debug!(status = status.as_u16(), path = %url, "Drive request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED => DriveError::Unauthorized(message),
        StatusCode::FORBIDDEN => DriveError::Forbidden(message),
        StatusCode::NOT_FOUND => DriveError::NotFound(url),
        StatusCode::TOO_MANY_REQUESTS => DriveError::TooManyRequests {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
        },
        s if s.is_server_error() => DriveError::ServerError(format!("{}: {}", s.as_u16(), message)),
        s => DriveError::Unexpected {
            status: s.as_u16(),
            body: message,
        },
    })
}

/// Parses a `Retry-After` header value (integer seconds or HTTP-date)
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(duration) = diff.to_std() {
            return duration;
        }
        return Duration::ZERO;
    }

    default
}
