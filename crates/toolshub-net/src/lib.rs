//! # Tools Hub Net
//!
//! Request/response model and HTTP loading for the AI Tools Hub offline worker.
//!
//! ## Design Goals
//!
//! 1. **Platform-shaped types**: requests carry a mode and an initiating origin,
//!    responses carry a response type, mirroring what a browser hands a worker
//! 2. **One seam**: everything that touches the network goes through [`Fetcher`]
//! 3. **Async HTTP**: the production [`ResourceLoader`] runs on `reqwest`

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Origin, Url};

pub mod loader;
pub mod stub;

pub use loader::{LoaderConfig, ResourceLoader};
pub use stub::{OfflineFetcher, StubFetcher};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Request mode, as set by whoever issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    /// Same-origin only.
    SameOrigin,
    /// Cross-origin allowed, response is opaque.
    NoCors,
    /// Cross-origin allowed under CORS.
    #[default]
    Cors,
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
    /// Origin of the page or worker that issued the request.
    pub origin: Option<Origin>,
    pub timeout: Option<Duration>,
    pub referrer: Option<Url>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            mode: RequestMode::default(),
            origin: None,
            timeout: Some(Duration::from_secs(30)),
            referrer: None,
        }
    }

    /// Create a navigation request for a top-level document.
    pub fn navigate(url: Url) -> Self {
        let origin = url.origin();
        Self::get(url).mode(RequestMode::Navigate).origin(origin)
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(url)
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the request mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the initiating origin.
    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Set timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set referrer.
    pub fn referrer(mut self, referrer: Url) -> Self {
        self.referrer = Some(referrer);
        self
    }

    /// Whether this request loads a full page.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// Whether the URL uses a network transport scheme.
pub fn is_network_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Response type, as exposed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    Basic,
    /// Cross-origin response under CORS.
    Cors,
    /// Cross-origin no-cors response. Status, headers and body are hidden.
    Opaque,
    /// Network error.
    Error,
    /// Constructed locally rather than fetched.
    #[default]
    Default,
}

impl ResponseType {
    /// Classify a response to `request` that ended up at `final_url`.
    ///
    /// A request without an initiating origin counts as same-origin.
    pub fn classify(request: &Request, final_url: &Url) -> Self {
        let same_origin = request
            .origin
            .as_ref()
            .map_or(true, |origin| *origin == final_url.origin());

        if same_origin {
            Self::Basic
        } else if request.mode == RequestMode::NoCors {
            Self::Opaque
        } else {
            Self::Cors
        }
    }

    /// Name as used by the platform (`"basic"`, `"opaque"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Cors => "cors",
            Self::Opaque => "opaque",
            Self::Error => "error",
            Self::Default => "default",
        }
    }
}

/// HTTP response.
///
/// Cloning is cheap: the body is reference-counted.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects. Absent for constructed and opaque responses.
    pub url: Option<Url>,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
    pub redirected: bool,
}

impl Response {
    /// Construct a response locally.
    pub fn synthetic(status: u16, status_text: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            url: None,
            status,
            status_text: status_text.into(),
            headers: HeaderMap::new(),
            body: body.into(),
            response_type: ResponseType::Default,
            redirected: false,
        }
    }

    /// The network error response.
    pub fn error() -> Self {
        Self {
            response_type: ResponseType::Error,
            ..Self::synthetic(0, "", Bytes::new())
        }
    }

    /// Strip everything a worker must not see of a cross-origin no-cors response.
    pub fn into_opaque(self) -> Self {
        Self {
            url: None,
            status: 0,
            status_text: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            response_type: ResponseType::Opaque,
            redirected: false,
        }
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Get a header value as a string.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Anything that can put a request on the wire.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a request. `Err` means the network itself failed; HTTP error
    /// statuses come back as `Ok`.
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}
