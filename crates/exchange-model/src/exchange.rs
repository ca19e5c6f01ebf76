use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::body::Body;
use crate::fields::{Headers, Queries};

/// Errors resolving a request's URL.
#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error("malformed URL: {0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme '{0}'; only http and https can be intercepted")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(UrlError::UnsupportedScheme(s.to_string())),
        }
    }
}

/// Metadata about one intercepted exchange, populated by the host.
///
/// Hooks receive it by shared reference and cannot change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeContext {
    /// The proxy session this exchange belongs to.
    pub session_id: Uuid,
    /// Sequence number of the exchange within its session.
    pub exchange_id: u64,
    /// When the proxy intercepted the request.
    pub request_started_at: DateTime<Utc>,
    /// When the upstream response arrived, once it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_received_at: Option<DateTime<Utc>>,
}

impl ExchangeContext {
    pub fn new(session_id: Uuid, exchange_id: u64) -> Self {
        Self {
            session_id,
            exchange_id,
            request_started_at: Utc::now(),
            response_received_at: None,
        }
    }

    /// Stamp the arrival of the upstream response.
    pub fn response_received(&mut self) {
        self.response_received_at = Some(Utc::now());
    }
}

/// One outbound HTTP(S) request as a hook sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default = "default_method")]
    pub method: String,
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub queries: Queries,
    /// Proxy-side annotation; never sent upstream.
    #[serde(default)]
    pub comment: String,
    /// Proxy-side highlight colour; never sent upstream.
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub body: Body,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

impl Request {
    /// A `GET` request with the scheme's default port and an empty body.
    pub fn new(scheme: Scheme, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            scheme,
            host: host.into(),
            port: scheme.default_port(),
            path: path.into(),
            headers: Headers::new(),
            queries: Queries::new(),
            comment: String::new(),
            color: String::new(),
            body: Body::default(),
        }
    }

    /// Split an absolute URL into request fields.
    pub fn from_url(method: impl Into<String>, url: &str) -> Result<Self, UrlError> {
        let parsed = Url::parse(url)?;
        let scheme: Scheme = parsed.scheme().parse()?;
        let host = parsed.host_str().ok_or(UrlError::MissingHost)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let mut request = Request::new(scheme, host, parsed.path());
        request.method = method.into();
        request.port = parsed.port().unwrap_or(scheme.default_port());
        request.queries = parsed.query_pairs().into_owned().collect();
        Ok(request)
    }

    /// The fully-resolved URL this request will be sent to.
    ///
    /// The port is omitted when it is the scheme's default.
    pub fn url(&self) -> Result<Url, UrlError> {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        let mut url = Url::parse(&format!("{}://{}", self.scheme, host))?;
        if url.host_str().is_none() {
            return Err(UrlError::MissingHost);
        }
        // Url stores no port when it equals the scheme default.
        url.set_port(Some(self.port))
            .map_err(|()| UrlError::MissingHost)?;
        url.set_path(&self.path);
        if self.queries.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().extend_pairs(self.queries.iter());
        }
        Ok(url)
    }
}

/// One inbound HTTP(S) response as a hook sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub body: Body,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Headers::new(),
            comment: String::new(),
            color: String::new(),
            body: Body::default(),
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }
}
