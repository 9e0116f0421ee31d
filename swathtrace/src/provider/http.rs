//! HTTP client abstraction for testability

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use super::types::ProviderError;

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs a form-encoded HTTP POST.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to post to
    /// * `form` - Form fields as key/value pairs
    ///
    /// # Returns
    ///
    /// The response body as bytes, or an error classified from the status.
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Vec<u8>, ProviderError>;

    /// Performs a JSON HTTP POST with an optional bearer token.
    fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Client timeout for `timeout_secs`; 0 means none.
fn request_timeout(timeout_secs: u64) -> Option<Duration> {
    (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs))
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient without a client-side timeout.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(0)
    }

    /// Creates a new ReqwestClient with custom timeout; 0 disables it.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout(timeout_secs))
            .build()
            .map_err(|e| {
                ProviderError::HttpError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    fn finish(
        url: &str,
        response: reqwest::Result<reqwest::blocking::Response>,
    ) -> Result<Vec<u8>, ProviderError> {
        let response =
            response.map_err(|e| ProviderError::HttpError(format!("Request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::HttpError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &body, url));
        }
        Ok(body)
    }
}

impl HttpClient for ReqwestClient {
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Vec<u8>, ProviderError> {
        Self::finish(url, self.client.post(url).form(form).send())
    }

    fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<Vec<u8>, ProviderError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        Self::finish(url, request.send())
    }
}

fn resolution_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"exceeds the limit ([0-9]+(?:\.[0-9]+)?) meters per pixel").unwrap()
    })
}

/// Maps a non-success HTTP status and body to a provider error.
pub fn classify_status(status: u16, body: &[u8], url: &str) -> ProviderError {
    let text = String::from_utf8_lossy(body);
    if status == 429 {
        return ProviderError::QuotaExceeded(format!("HTTP 429 from {}", url));
    }
    if let Some(caps) = resolution_pattern().captures(&text) {
        let limit_m = caps[1].parse().unwrap_or(f64::NAN);
        return ProviderError::ResolutionLimit { limit_m };
    }
    if status == 401 || status == 403 {
        return ProviderError::Auth(format!("HTTP {} from {}", status, url));
    }
    let snippet: String = text.chars().take(200).collect();
    ProviderError::HttpError(format!("HTTP {} from {}: {}", status, url, snippet))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Mock HTTP client for testing: returns queued responses in order and
    /// records every request body.
    pub struct MockHttpClient {
        pub responses: Mutex<Vec<Result<Vec<u8>, ProviderError>>>,
        pub requests: Mutex<Vec<(String, String)>>,
    }

    impl MockHttpClient {
        pub fn new(responses: Vec<Result<Vec<u8>, ProviderError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn next(&self, url: &str, body: String) -> Result<Vec<u8>, ProviderError> {
            self.requests.lock().push((url.to_string(), body));
            self.responses
                .lock()
                .pop()
                .unwrap_or(Err(ProviderError::HttpError("no mock response".into())))
        }
    }

    impl HttpClient for MockHttpClient {
        fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Vec<u8>, ProviderError> {
            let body = form
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            self.next(url, body)
        }

        fn post_json(
            &self,
            url: &str,
            _bearer: Option<&str>,
            body: &serde_json::Value,
        ) -> Result<Vec<u8>, ProviderError> {
            self.next(url, body.to_string())
        }
    }

    #[test]
    fn test_zero_timeout_disables_client_timeout() {
        assert_eq!(request_timeout(0), None);
        assert_eq!(request_timeout(90), Some(Duration::from_secs(90)));
        assert!(ReqwestClient::new().is_ok());
    }

    #[test]
    fn test_mock_client_returns_in_order() {
        let mock = MockHttpClient::new(vec![Ok(vec![1]), Ok(vec![2])]);
        assert_eq!(mock.post_form("http://a", &[]).unwrap(), vec![1]);
        assert_eq!(mock.post_form("http://a", &[]).unwrap(), vec![2]);
        assert!(mock.post_form("http://a", &[]).is_err());
        assert_eq!(mock.requests.lock().len(), 3);
    }

    #[test]
    fn test_classify_quota() {
        let err = classify_status(429, b"slow down", "http://x");
        assert!(matches!(err, ProviderError::QuotaExceeded(_)));
    }

    #[test]
    fn test_classify_resolution_limit() {
        let body = br#"{"error":{"status":400,"reason":"Bad Request","message":"The image resolution exceeds the limit 1500.00 meters per pixel."}}"#;
        let err = classify_status(400, body, "http://x");
        assert_eq!(err, ProviderError::ResolutionLimit { limit_m: 1500.0 });
    }

    #[test]
    fn test_classify_auth_and_other() {
        assert!(matches!(
            classify_status(401, b"", "http://x"),
            ProviderError::Auth(_)
        ));
        match classify_status(500, b"boom", "http://x") {
            ProviderError::HttpError(msg) => assert!(msg.contains("500") && msg.contains("boom")),
            other => panic!("Expected HttpError, got {:?}", other),
        }
    }
}
