//! HTTP transport for the profile API
//!
//! Thin wrapper around `reqwest` that joins endpoint paths onto the
//! configured base URL, attaches bearer credentials and buffers responses.
//! It never interprets status codes; each component decides what success
//! means for its own endpoint.

use crate::config::ApiConfig;
use crate::metrics;
use bytes::Bytes;
use reqwest::multipart::Form;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Endpoint paths relative to the base URL
pub mod paths {
    pub const LOGIN: &str = "/auth/login";
    pub const DOCUMENTS: &str = "/profile/documents";
    pub const PHOTO: &str = "/profile/photo";
    pub const PROFILE: &str = "/profile";

    /// Path of a single document record
    pub fn document(id: i64) -> String {
        format!("{DOCUMENTS}/{id}")
    }
}

/// Transport errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A fully buffered HTTP response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl ApiResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Client for the profile API
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    probe: reqwest::Client,
}

impl ApiClient {
    /// Create a client for `config.base_url`.
    ///
    /// API calls carry no timeout. Only [`ApiClient::head`] is bounded, by
    /// `probe_timeout_seconds`.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        Url::parse(&config.base_url).map_err(|e| ApiError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let http = reqwest::Client::builder().build()?;
        let probe = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            probe,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of an endpoint path
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Resolve a URL returned by the API, which may be relative to the base URL
    pub fn resolve(&self, url: &str) -> Result<Url, ApiError> {
        let invalid = |reason: String| ApiError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        if url.starts_with("http://") || url.starts_with("https://") {
            return Url::parse(url).map_err(|e| invalid(e.to_string()));
        }
        let base =
            Url::parse(&format!("{}/", self.base_url)).map_err(|e| invalid(e.to_string()))?;
        base.join(url).map_err(|e| invalid(e.to_string()))
    }

    /// POST a JSON body
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let mut request = self.http.post(self.endpoint(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        self.execute("post_json", request).await
    }

    /// POST a multipart form with bearer auth
    pub async fn post_multipart(
        &self,
        path: &str,
        form: Form,
        token: &str,
    ) -> Result<ApiResponse, ApiError> {
        let request = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(token)
            .multipart(form);
        self.execute("post_multipart", request).await
    }

    /// GET with bearer auth
    pub async fn get(&self, path: &str, token: &str) -> Result<ApiResponse, ApiError> {
        let request = self.http.get(self.endpoint(path)).bearer_auth(token);
        self.execute("get", request).await
    }

    /// DELETE with bearer auth
    pub async fn delete(&self, path: &str, token: &str) -> Result<ApiResponse, ApiError> {
        let request = self.http.delete(self.endpoint(path)).bearer_auth(token);
        self.execute("delete", request).await
    }

    /// Unauthenticated HEAD with the bounded probe timeout
    pub async fn head(&self, url: Url) -> Result<ApiResponse, ApiError> {
        let request = self.probe.head(url);
        self.execute("head", request).await
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<ApiResponse, ApiError> {
        let start = Instant::now();
        let result = Self::buffer(request).await;
        metrics::record_request_duration(operation, start.elapsed().as_secs_f64());

        match &result {
            Ok(response) => tracing::debug!(
                operation,
                status = response.status.as_u16(),
                bytes = response.body.len(),
                "API call completed"
            ),
            Err(e) => tracing::debug!(operation, error = %e, "API call failed"),
        }
        result
    }

    async fn buffer(request: RequestBuilder) -> Result<ApiResponse, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: base_url.to_string(),
            probe_timeout_seconds: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let api = client("http://localhost:3000/api/");
        assert_eq!(api.base_url(), "http://localhost:3000/api");
        assert_eq!(
            api.endpoint(paths::LOGIN),
            "http://localhost:3000/api/auth/login"
        );
        assert_eq!(
            api.endpoint(&paths::document(42)),
            "http://localhost:3000/api/profile/documents/42"
        );
    }

    #[test]
    fn test_resolve_absolute_and_relative() {
        let api = client("http://localhost:3000/api");
        assert_eq!(
            api.resolve("https://cdn.example.com/p/1.png").unwrap().as_str(),
            "https://cdn.example.com/p/1.png"
        );
        assert_eq!(
            api.resolve("/uploads/1.png").unwrap().as_str(),
            "http://localhost:3000/uploads/1.png"
        );
        assert_eq!(
            api.resolve("uploads/1.png").unwrap().as_str(),
            "http://localhost:3000/api/uploads/1.png"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ApiClient::new(&ApiConfig {
            base_url: "not a url".into(),
            probe_timeout_seconds: 1,
        });
        assert!(matches!(result, Err(ApiError::InvalidUrl { .. })));
    }

    #[test]
    fn test_response_helpers() {
        let response = ApiResponse {
            status: StatusCode::OK,
            content_type: Some("application/json".into()),
            body: Bytes::from_static(br#"{"token":"t"}"#),
        };
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["token"], "t");
        assert_eq!(response.text(), r#"{"token":"t"}"#);
    }
}
