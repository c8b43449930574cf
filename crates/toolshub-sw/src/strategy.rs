//! Cache-first decisions, free of I/O.
//!
//! [`crate::fetch::FetchHandler`] performs the lookups and network calls;
//! everything it decides goes through these functions.

use http::Method;
use toolshub_net::{is_network_scheme, Request, Response, ResponseType};
use url::Url;

/// Status of the offline placeholder.
pub const OFFLINE_STATUS: u16 = 408;

/// Reason phrase of the offline placeholder.
pub const OFFLINE_STATUS_TEXT: &str = "Request Timeout";

/// Body of the offline placeholder.
pub const OFFLINE_BODY: &str = "Offline";

/// Why a request is left to the network untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    NonGetMethod,
    NonNetworkScheme,
    NoActiveWorker,
}

/// Whether the worker handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    Intercept,
    Bypass(BypassReason),
}

/// What to answer with when the network is unreachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// Serve this document from the current namespace.
    CachedDocument(Url),
    /// Serve the synthetic 408 response.
    Placeholder,
}

/// Only GET requests over http(s) are intercepted.
pub fn classify_request(request: &Request) -> Interception {
    if request.method != Method::GET {
        Interception::Bypass(BypassReason::NonGetMethod)
    } else if !is_network_scheme(&request.url) {
        Interception::Bypass(BypassReason::NonNetworkScheme)
    } else {
        Interception::Intercept
    }
}

/// Only complete same-origin responses are written back.
///
/// Opaque and error responses cannot be replayed safely, and anything but a
/// 200 would pin a failure into the cache.
pub fn should_cache(response: &Response) -> bool {
    response.status == 200 && response.response_type == ResponseType::Basic
}

/// Navigations fall back to the cached app document, everything else to the
/// placeholder.
pub fn offline_fallback(request: &Request, offline_document: &Url) -> Fallback {
    if request.is_navigation() {
        Fallback::CachedDocument(offline_document.clone())
    } else {
        Fallback::Placeholder
    }
}

/// The synthetic response for requests that cannot reach the network.
pub fn offline_placeholder() -> Response {
    Response::synthetic(OFFLINE_STATUS, OFFLINE_STATUS_TEXT, OFFLINE_BODY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use toolshub_net::RequestMode;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_classify_get_http() {
        let request = Request::get(url("https://hub.example/js/script.js"));
        assert_eq!(classify_request(&request), Interception::Intercept);
    }

    #[test]
    fn test_classify_non_get() {
        let request = Request::post(url("https://hub.example/api"), Bytes::new());
        assert_eq!(
            classify_request(&request),
            Interception::Bypass(BypassReason::NonGetMethod)
        );
    }

    #[test]
    fn test_classify_non_network_scheme() {
        let request = Request::get(url("chrome-extension://abcdef/content.js"));
        assert_eq!(
            classify_request(&request),
            Interception::Bypass(BypassReason::NonNetworkScheme)
        );
    }

    #[test]
    fn test_should_cache() {
        let mut response = Response::synthetic(200, "OK", "x");
        response.response_type = ResponseType::Basic;
        assert!(should_cache(&response));

        response.status = 404;
        assert!(!should_cache(&response));

        response.status = 200;
        response.response_type = ResponseType::Cors;
        assert!(!should_cache(&response));

        assert!(!should_cache(&response.clone().into_opaque()));
        assert!(!should_cache(&Response::error()));
    }

    #[test]
    fn test_offline_fallback() {
        let index = url("https://hub.example/index.html");

        let navigation = Request::navigate(url("https://hub.example/dashboard"));
        assert_eq!(
            offline_fallback(&navigation, &index),
            Fallback::CachedDocument(index.clone())
        );

        let api = Request::get(url("https://hub.example/api/data")).mode(RequestMode::SameOrigin);
        assert_eq!(offline_fallback(&api, &index), Fallback::Placeholder);
    }

    #[test]
    fn test_offline_placeholder() {
        let response = offline_placeholder();
        assert_eq!(response.status, 408);
        assert_eq!(response.status_text, "Request Timeout");
        assert_eq!(response.text().unwrap(), "Offline");
    }
}
