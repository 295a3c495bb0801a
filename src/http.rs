//! # HTTP Fetcher
//!
//! Outbound HTTP used by web configuration sources and the OIDC provisioner.
//!
//! - Trust: built-in roots plus the in-cluster service CA bundle when mounted
//! - `insecure_tls` requests skip certificate verification entirely
//! - Basic or Bearer auth per request
//! - Request bodies are sent as `application/json` when they start with `{`,
//!   otherwise as `application/x-www-form-urlencoded`
//! - Every call is bounded by one fixed timeout
//!
//! Status codes are returned to the caller untouched; only transport failures
//! become errors here.

use crate::constants::SERVICE_CA_PATH;
use crate::error::{Error, Result};
use crate::observability::metrics;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum HttpAuth {
    Basic { username: String, password: String },
    Bearer(String),
}

impl std::fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

/// A single outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub auth: Option<HttpAuth>,
    pub insecure_tls: bool,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            auth: None,
            insecure_tls: false,
        }
    }

    #[must_use]
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body.into()),
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn auth(mut self, auth: Option<HttpAuth>) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }
}

/// Content type chosen for a request body
#[must_use]
pub fn content_type_for(body: &str) -> &'static str {
    if body.starts_with('{') {
        CONTENT_TYPE_JSON
    } else {
        CONTENT_TYPE_FORM
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes outbound requests
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Send a request and return the status and body.
    ///
    /// Fails only when no response was received.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpFetcher`] backed by two reqwest clients, one verifying certificates
/// and one that does not
pub struct ReqwestFetcher {
    verified: reqwest::Client,
    insecure: reqwest::Client,
}

impl std::fmt::Debug for ReqwestFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestFetcher").finish_non_exhaustive()
    }
}

impl ReqwestFetcher {
    /// Build the fetcher, trusting the in-cluster CA bundle if it is mounted
    pub fn new(timeout: Duration) -> std::result::Result<Self, reqwest::Error> {
        Self::with_ca_bundle(timeout, Path::new(SERVICE_CA_PATH))
    }

    pub fn with_ca_bundle(
        timeout: Duration,
        ca_bundle: &Path,
    ) -> std::result::Result<Self, reqwest::Error> {
        let mut verified = client_builder(timeout).tls_built_in_root_certs(true);
        for certificate in load_ca_bundle(ca_bundle) {
            verified = verified.add_root_certificate(certificate);
        }

        Ok(Self {
            verified: verified.build()?,
            insecure: client_builder(timeout)
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }
}

fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .user_agent(concat!("app-gateway-operator/", env!("CARGO_PKG_VERSION")))
}

fn load_ca_bundle(path: &Path) -> Vec<reqwest::Certificate> {
    let pem = match std::fs::read(path) {
        Ok(pem) => pem,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no in-cluster CA bundle, using system roots only");
            return Vec::new();
        }
    };

    match reqwest::Certificate::from_pem_bundle(&pem) {
        Ok(certificates) => {
            info!(
                path = %path.display(),
                count = certificates.len(),
                "Loaded in-cluster CA bundle"
            );
            certificates
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable in-cluster CA bundle");
            Vec::new()
        }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let client = if request.insecure_tls {
            &self.insecure
        } else {
            &self.verified
        };

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.auth {
            Some(HttpAuth::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            Some(HttpAuth::Bearer(token)) => builder.bearer_auth(token),
            None => builder,
        };

        if let Some(body) = request.body {
            let content_type = content_type_for(&body);
            builder = builder.header(CONTENT_TYPE, content_type);
            if content_type == CONTENT_TYPE_JSON {
                builder = builder.header(ACCEPT, CONTENT_TYPE_JSON);
            }
            builder = builder.body(body);
        }

        debug!(
            method = request.method.as_str(),
            url = request.url.as_str(),
            insecure = request.insecure_tls,
            "sending request"
        );

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::increment_http_requests(request.method.as_str(), "error");
                return Err(Error::fetch(&request.url, e));
            }
        };

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::fetch(&request.url, e))?;

        metrics::increment_http_requests(request.method.as_str(), &status.to_string());
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_follows_body_shape() {
        assert_eq!(content_type_for(r#"{"client_name":"gw"}"#), CONTENT_TYPE_JSON);
        assert_eq!(
            content_type_for("grant_type=client_credentials"),
            CONTENT_TYPE_FORM
        );
        assert_eq!(content_type_for(""), CONTENT_TYPE_FORM);
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let basic = HttpAuth::Basic {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{basic:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"), "password leaked: {rendered}");

        let bearer = format!("{:?}", HttpAuth::Bearer("tok-123".into()));
        assert!(!bearer.contains("tok-123"), "token leaked: {bearer}");
    }

    #[test]
    fn test_response_success_range() {
        for status in [200, 201, 204, 299] {
            assert!(HttpResponse { status, body: String::new() }.is_success());
        }
        for status in [199, 301, 404, 500] {
            assert!(!HttpResponse { status, body: String::new() }.is_success());
        }
    }
}
