//! Shared HTTP client
//!
//! Thin wrapper around `reqwest` used by both REST connectors: endpoint
//! building, an outbound rate limiter, a bounded retry loop and status to
//! [`ConnectorError`] mapping.

use std::time::Duration;

use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use mdmsync_connector::error::{ConnectorError, ConnectorResult};
use mdmsync_connector::rate_limit::RateLimiter;

use crate::config::validate_base_url;
use crate::retry::{is_retryable_status, parse_retry_after, RetryConfig};

/// Longest error body excerpt kept in error messages.
const MAX_ERROR_BODY: usize = 500;

/// HTTP client shared by the REST connectors.
#[derive(Debug)]
pub struct HttpClient {
    name: String,
    base_url: Url,
    client: Client,
    rate_limiter: RateLimiter,
    retry: RetryConfig,
    timeout_secs: u64,
}

/// Connection settings for [`HttpClient::new`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub verify_ssl: bool,
    pub rate_limit_per_minute: u32,
    pub retry: RetryConfig,
}

impl HttpClient {
    /// Build a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidConfiguration`] when the URL is
    /// unusable or the TLS stack cannot be initialized.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        default_headers: HeaderMap,
        settings: HttpSettings,
    ) -> ConnectorResult<Self> {
        let name = name.into();
        let base_url = validate_base_url(&name, base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ConnectorError::InvalidConfiguration {
                message: format!("{name} base URL cannot carry a path"),
            });
        }

        let timeout = Duration::from_secs(settings.timeout_secs);
        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .default_headers(default_headers);

        if !settings.verify_ssl {
            warn!(connector = %name, "TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| ConnectorError::InvalidConfiguration {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            name,
            base_url,
            client,
            rate_limiter: RateLimiter::per_minute(settings.rate_limit_per_minute),
            retry: settings.retry,
            timeout_secs: settings.timeout_secs,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Append path segments to the base URL. Segments are percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidConfiguration`] when the base URL
    /// cannot take a path.
    pub fn endpoint<I, S>(&self, segments: I) -> ConnectorResult<Url>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        {
            let mut path =
                url.path_segments_mut()
                    .map_err(|()| ConnectorError::InvalidConfiguration {
                        message: format!("{} base URL cannot carry a path", self.name),
                    })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment.as_ref());
            }
        }
        Ok(url)
    }

    /// Start a request against an absolute URL.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a request, retrying transient failures, and fail on non-2xx.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`ConnectorError`] for the final attempt.
    pub async fn send(&self, builder: RequestBuilder) -> ConnectorResult<Response> {
        let request = builder
            .build()
            .map_err(|e| ConnectorError::operation_failed_with_source("Invalid request", e))?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let current = clone_request(&request)?;
            self.rate_limiter.acquire().await;

            debug!(
                connector = %self.name,
                method = %request.method(),
                path = %request.url().path(),
                attempt = attempt,
                "Sending request"
            );

            match self.client.execute(current).await {
                Ok(resp) => {
                    let status = resp.status();
                    debug!(
                        connector = %self.name,
                        path = %request.url().path(),
                        status = %status,
                        attempt = attempt,
                        "Received response"
                    );

                    if is_retryable_status(status) && self.retry.allows(attempt) {
                        let backoff = self.retry.delay_for(attempt);
                        let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                            retry_after(&resp).unwrap_or(backoff)
                        } else {
                            backoff
                        };

                        warn!(
                            connector = %self.name,
                            path = %request.url().path(),
                            status = %status,
                            attempt = attempt,
                            wait_ms = wait.as_millis(),
                            "Transient response, retrying with backoff"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if status.is_success() {
                        return Ok(resp);
                    }
                    return Err(self.response_error(&request, resp).await);
                }
                Err(e) => {
                    if self.retry.allows(attempt) {
                        let backoff = self.retry.delay_for(attempt);
                        warn!(
                            connector = %self.name,
                            path = %request.url().path(),
                            error = %e,
                            attempt = attempt,
                            wait_ms = backoff.as_millis(),
                            "Request failed, retrying with backoff"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if e.is_timeout() {
                        return Err(ConnectorError::ConnectionTimeout {
                            timeout_secs: self.timeout_secs,
                        });
                    }
                    return Err(ConnectorError::connection_failed_with_source(
                        format!(
                            "{} request failed after {attempt} attempts: {}",
                            self.name,
                            request.url().path()
                        ),
                        e,
                    ));
                }
            }
        }
    }

    /// [`send`](Self::send) and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidData`] when the body does not decode.
    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ConnectorResult<T> {
        let resp = self.send(builder).await?;
        let path = resp.url().path().to_string();
        resp.json::<T>().await.map_err(|e| {
            ConnectorError::invalid_data(format!("{} returned an unexpected body for {path}: {e}", self.name))
        })
    }

    async fn response_error(&self, request: &Request, resp: Response) -> ConnectorError {
        let status = resp.status();
        let retry_after_secs = retry_after(&resp).map(|d| d.as_secs());
        let body = resp.text().await.unwrap_or_default();
        let message = error_message(&body);

        warn!(
            connector = %self.name,
            method = %request.method(),
            path = %request.url().path(),
            status = %status,
            error = %message,
            "Request rejected"
        );

        map_status(status, request, message, retry_after_secs)
    }
}

fn clone_request(request: &Request) -> ConnectorResult<Request> {
    request
        .try_clone()
        .ok_or_else(|| ConnectorError::operation_failed("Request body cannot be replayed"))
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

/// Map a non-success status to a connector error.
pub(crate) fn map_status(
    status: StatusCode,
    request: &Request,
    message: String,
    retry_after_secs: Option<u64>,
) -> ConnectorError {
    match status {
        StatusCode::UNAUTHORIZED => ConnectorError::AuthenticationFailed,
        StatusCode::FORBIDDEN => ConnectorError::AuthorizationFailed {
            operation: format!("{} {}", request.method(), request.url().path()),
        },
        StatusCode::NOT_FOUND => ConnectorError::ObjectNotFound {
            identifier: request.url().path().to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited { retry_after_secs },
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            ConnectorError::TargetUnavailable {
                message: format!("HTTP {status}: {message}"),
            }
        }
        _ => ConnectorError::operation_failed(format!("HTTP {status}: {message}")),
    }
}

/// Best-effort message from an error body.
///
/// Understands `{"message": ..}` objects and GLPI's `["ERROR_CODE", "text"]`
/// arrays; anything else is returned verbatim, truncated.
pub(crate) fn error_message(body: &str) -> String {
    let extracted = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Ok(Value::Array(items)) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join(": "))
        }
        _ => None,
    };

    let message = extracted.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return "no details".to_string();
    }
    truncate(&message, MAX_ERROR_BODY)
}

fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> HttpSettings {
        HttpSettings {
            timeout_secs: 5,
            verify_ssl: true,
            rate_limit_per_minute: 60,
            retry: RetryConfig::disabled(),
        }
    }

    fn client(base: &str) -> HttpClient {
        HttpClient::new("test", base, HeaderMap::new(), settings()).unwrap()
    }

    #[test]
    fn test_endpoint_appends_segments() {
        let http = client("https://glpi.example.com/apirest.php");
        let url = http.endpoint(["Computer", "42"]).unwrap();
        assert_eq!(url.as_str(), "https://glpi.example.com/apirest.php/Computer/42");
    }

    #[test]
    fn test_endpoint_handles_trailing_slash_and_encoding() {
        let http = client("https://mdm.example.com/");
        let url = http.endpoint(["api", "v1", "devices", "a b/c"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://mdm.example.com/api/v1/devices/a%20b%2Fc"
        );
    }

    #[test]
    fn test_new_rejects_non_http_url() {
        let result = HttpClient::new("test", "mailto:ops@example.com", HeaderMap::new(), settings());
        assert!(result.is_err());
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(r#"{"message":"bad token"}"#), "bad token");
        assert_eq!(
            error_message(r#"["ERROR_SESSION_TOKEN_INVALID","session expired"]"#),
            "ERROR_SESSION_TOKEN_INVALID: session expired"
        );
        assert_eq!(error_message("  plain text "), "plain text");
        assert_eq!(error_message(""), "no details");
    }

    #[test]
    fn test_error_message_truncates() {
        let long = "x".repeat(MAX_ERROR_BODY + 50);
        let message = error_message(&long);
        assert!(message.ends_with("..."));
        assert_eq!(message.len(), MAX_ERROR_BODY + 3);
    }

    #[test]
    fn test_map_status() {
        let request = Request::new(
            Method::GET,
            Url::parse("https://glpi.example.com/apirest.php/Computer/7").unwrap(),
        );

        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, &request, String::new(), None),
            ConnectorError::AuthenticationFailed
        ));
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, &request, String::new(), None),
            ConnectorError::ObjectNotFound { identifier } if identifier == "/apirest.php/Computer/7"
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, &request, String::new(), Some(30)),
            ConnectorError::RateLimited { retry_after_secs: Some(30) }
        ));
        assert!(matches!(
            map_status(StatusCode::SERVICE_UNAVAILABLE, &request, "down".into(), None),
            ConnectorError::TargetUnavailable { .. }
        ));
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, &request, "boom".into(), None),
            ConnectorError::OperationFailed { .. }
        ));
    }
}
