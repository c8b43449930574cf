//! In-process fetchers that never touch a socket.
//!
//! [`OfflineFetcher`] models a device with no connectivity. [`StubFetcher`]
//! serves canned responses per URL and records every call, which is what the
//! worker's tests use to prove that a cache hit made no network request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;
use url::Url;

use crate::{Fetcher, NetError, Request, Response, ResponseType};

/// A fetcher for which every request fails at the connection level.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        trace!(url = %request.url, "Offline, failing request");
        Err(NetError::ConnectionFailed(format!(
            "network unreachable: {}",
            request.url
        )))
    }
}

#[derive(Debug, Clone)]
enum Route {
    Respond(Response),
    Fail,
}

/// A fetcher with canned per-URL responses.
///
/// Unknown URLs answer 404. Response types are classified against the
/// request exactly like the real loader does.
#[derive(Debug, Default)]
pub struct StubFetcher {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    calls: Mutex<Vec<Url>>,
}

impl StubFetcher {
    /// Create a stub with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `status` and `body`.
    pub fn respond(&self, url: &str, status: u16, body: impl Into<Bytes>) -> &Self {
        let reason = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default();
        self.respond_with(url, Response::synthetic(status, reason, body))
    }

    /// Answer `url` with a full response template.
    pub fn respond_with(&self, url: &str, response: Response) -> &Self {
        self.lock_routes()
            .insert(url.to_string(), Route::Respond(response));
        self
    }

    /// Make requests for `url` fail at the connection level.
    pub fn fail(&self, url: &str) -> &Self {
        self.lock_routes().insert(url.to_string(), Route::Fail);
        self
    }

    /// Toggle total loss of connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every URL fetched so far, in order.
    pub fn calls(&self) -> Vec<Url> {
        self.lock_calls().clone()
    }

    /// Number of fetches so far.
    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    fn lock_routes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Route>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<Url>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.lock_calls().push(request.url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return OfflineFetcher.fetch(request).await;
        }

        let route = self.lock_routes().get(request.url.as_str()).cloned();
        let mut response = match route {
            Some(Route::Respond(response)) => response,
            Some(Route::Fail) => {
                return Err(NetError::ConnectionFailed(format!(
                    "connection refused: {}",
                    request.url
                )))
            }
            None => Response::synthetic(404, "Not Found", Bytes::new()),
        };

        response.url = Some(request.url.clone());
        response.response_type = ResponseType::classify(request, &request.url);

        if response.response_type == ResponseType::Opaque {
            return Ok(response.into_opaque());
        }
        Ok(response)
    }
}
