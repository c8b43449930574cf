//! Cache namespaces and the storage that holds them.
//!
//! A namespace maps a [`RequestKey`] to a captured [`CacheEntry`]. Entries are
//! never evicted one by one; the unit of eviction is the whole namespace.

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::RwLock;
use toolshub_net::{Request, Response, ResponseType};
use url::Url;

use crate::persist::{CacheSnapshot, NamespaceSnapshot};
use crate::ServiceWorkerError;

// ==================== Keys ====================

/// Request identity used as the cache key.
///
/// The URL fragment never takes part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.into(),
        }
    }

    pub fn for_request(request: &Request) -> Self {
        Self::new(&request.method, &request.url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

// ==================== Entries ====================

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL, fragment stripped.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response status text.
    pub status_text: String,

    /// Response headers, in order, repeated names kept. Values are raw bytes
    /// since they need not be ASCII.
    pub headers: Vec<StoredHeader>,

    /// Response body.
    #[serde(with = "crate::persist::base64_body")]
    pub body: Vec<u8>,

    /// Response type at capture time.
    pub response_type: ResponseType,

    /// Whether the response was reached through a redirect.
    #[serde(default)]
    pub redirected: bool,

    /// Request header values named by the response's `Vary` header.
    #[serde(default)]
    pub vary: HashMap<String, Option<String>>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot `response` as the answer to `request`.
    pub fn capture(request: &Request, response: &Response) -> Self {
        let key = RequestKey::for_request(request);
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| StoredHeader {
                name: name.as_str().to_string(),
                value: value.as_bytes().to_vec(),
            })
            .collect();
        let vary = vary_names(&response.headers)
            .into_iter()
            .filter(|name| name != "*")
            .map(|name| {
                let value = request_header(request, &name);
                (name, value)
            })
            .collect();

        Self {
            url: key.url,
            method: key.method,
            status: response.status,
            status_text: response.status_text.clone(),
            headers,
            body: response.body.to_vec(),
            response_type: response.response_type,
            redirected: response.redirected,
            vary,
            cached_at: toolshub_common::unix_millis(),
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method.clone(),
            url: self.url.clone(),
        }
    }

    /// Rebuild the stored response.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(header.name.as_str()),
                HeaderValue::from_bytes(&header.value),
            ) {
                headers.append(name, value);
            }
        }

        Response {
            url: Url::parse(&self.url).ok(),
            status: self.status,
            status_text: self.status_text.clone(),
            headers,
            body: Bytes::from(self.body.clone()),
            response_type: self.response_type,
            redirected: self.redirected,
        }
    }

    /// Whether the request's headers agree with the ones recorded under `Vary`.
    pub fn matches_vary(&self, request: &Request) -> bool {
        let names: Vec<String> = self
            .headers
            .iter()
            .filter(|header| header.name.eq_ignore_ascii_case("vary"))
            .filter_map(|header| std::str::from_utf8(&header.value).ok())
            .flat_map(split_vary)
            .collect();

        names.iter().all(|name| {
            name != "*" && self.vary.get(name).cloned().flatten() == request_header(request, name)
        })
    }
}

/// One response header as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHeader {
    pub name: String,
    #[serde(with = "crate::persist::header_value")]
    pub value: Vec<u8>,
}

fn split_vary(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn vary_names(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(http::header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(split_vary)
        .collect()
}

fn request_header(request: &Request, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

// ==================== Cache ====================

/// One cache namespace.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    entries: HashMap<RequestKey, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request. Only GET requests ever match.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        if request.method != Method::GET {
            return None;
        }
        self.entries
            .get(&RequestKey::for_request(request))
            .filter(|entry| entry.matches_vary(request))
    }

    /// Store `response` under `request`, replacing any previous entry.
    pub fn put(&mut self, request: &Request, response: &Response) -> Result<(), ServiceWorkerError> {
        if request.method != Method::GET {
            return Err(ServiceWorkerError::CacheError(format!(
                "only GET requests can be cached, got {}",
                request.method
            )));
        }
        if !toolshub_net::is_network_scheme(&request.url) {
            return Err(ServiceWorkerError::CacheError(format!(
                "unsupported scheme: {}",
                request.url.scheme()
            )));
        }
        if response.status == 206 {
            return Err(ServiceWorkerError::CacheError(
                "partial responses cannot be cached".to_string(),
            ));
        }
        if vary_names(&response.headers).iter().any(|n| n == "*") {
            return Err(ServiceWorkerError::CacheError(
                "responses with Vary: * cannot be cached".to_string(),
            ));
        }

        self.insert(CacheEntry::capture(request, response));
        Ok(())
    }

    /// Insert a captured entry as is.
    pub fn insert(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key(), entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, request: &Request) -> bool {
        self.entries
            .remove(&RequestKey::for_request(request))
            .is_some()
    }

    /// All keys, sorted by URL.
    pub fn keys(&self) -> Vec<RequestKey> {
        let mut keys: Vec<RequestKey> = self.entries.keys().cloned().collect();
        keys.sort_by(|a, b| a.url.cmp(&b.url));
        keys
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// Named cache namespaces shared by the installer, activator and interceptor.
///
/// Implementations guarantee per-entry atomicity only. Two concurrent misses
/// for the same request both fetch and both write; the last write wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the namespace if it does not exist.
    async fn open(&self, name: &str) -> Result<(), ServiceWorkerError>;

    /// Check if namespace exists.
    async fn has(&self, name: &str) -> bool;

    /// Look up a request in one namespace.
    async fn match_request(&self, name: &str, request: &Request) -> Option<Response>;

    /// Store a response, creating the namespace if needed.
    async fn put(
        &self,
        name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), ServiceWorkerError>;

    /// Store several responses. Not transactional: a failure part way leaves
    /// the earlier entries in place.
    async fn put_all(
        &self,
        name: &str,
        pairs: &[(Request, Response)],
    ) -> Result<(), ServiceWorkerError> {
        for (request, response) in pairs {
            self.put(name, request, response).await?;
        }
        Ok(())
    }

    /// Delete one entry.
    async fn delete_entry(&self, name: &str, request: &Request) -> bool;

    /// Keys stored in a namespace.
    async fn keys(&self, name: &str) -> Vec<RequestKey>;

    /// Delete a whole namespace. Returns whether it existed.
    async fn delete_namespace(&self, name: &str) -> Result<bool, ServiceWorkerError>;

    /// Names of all namespaces, sorted.
    async fn list_namespaces(&self) -> Vec<String>;
}

/// In-memory cache storage.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build storage from a persisted snapshot.
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        let caches = snapshot
            .namespaces
            .into_iter()
            .map(|ns| {
                let mut cache = Cache::new(&ns.name);
                for entry in ns.entries {
                    cache.insert(entry);
                }
                (ns.name, cache)
            })
            .collect();
        Self {
            caches: RwLock::new(caches),
        }
    }

    /// Copy the current contents into a serializable snapshot.
    pub async fn snapshot(&self) -> CacheSnapshot {
        let caches = self.caches.read().await;
        let mut namespaces: Vec<NamespaceSnapshot> = caches
            .values()
            .map(|cache| {
                let mut entries: Vec<CacheEntry> = cache.entries().cloned().collect();
                entries.sort_by(|a, b| a.url.cmp(&b.url));
                NamespaceSnapshot {
                    name: cache.name.clone(),
                    entries,
                }
            })
            .collect();
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        CacheSnapshot { namespaces }
    }

    /// Number of entries in a namespace, zero if absent.
    pub async fn len(&self, name: &str) -> usize {
        self.caches
            .read()
            .await
            .get(name)
            .map_or(0, |cache| cache.len())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<(), ServiceWorkerError> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        Ok(())
    }

    async fn has(&self, name: &str) -> bool {
        self.caches.read().await.contains_key(name)
    }

    async fn match_request(&self, name: &str, request: &Request) -> Option<Response> {
        let caches = self.caches.read().await;
        caches
            .get(name)?
            .match_request(request)
            .map(CacheEntry::to_response)
    }

    async fn put(
        &self,
        name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), ServiceWorkerError> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
            .put(request, response)
    }

    async fn delete_entry(&self, name: &str, request: &Request) -> bool {
        self.caches
            .write()
            .await
            .get_mut(name)
            .is_some_and(|cache| cache.delete(request))
    }

    async fn keys(&self, name: &str) -> Vec<RequestKey> {
        self.caches
            .read()
            .await
            .get(name)
            .map(Cache::keys)
            .unwrap_or_default()
    }

    async fn delete_namespace(&self, name: &str) -> Result<bool, ServiceWorkerError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn list_namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolshub_net::RequestMode;

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    fn ok(body: &'static str) -> Response {
        let mut response = Response::synthetic(200, "OK", body);
        response.response_type = ResponseType::Basic;
        response
    }

    #[test]
    fn test_request_key_strips_fragment() {
        let a = RequestKey::for_request(&get("https://hub.example/index.html#top"));
        let b = RequestKey::for_request(&get("https://hub.example/index.html"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "GET https://hub.example/index.html");
    }

    #[test]
    fn test_cache_put_and_match() {
        let mut cache = Cache::new("v1");
        cache
            .put(&get("https://hub.example/css/style.css"), &ok("body{}"))
            .unwrap();

        let entry = cache
            .match_request(&get("https://hub.example/css/style.css"))
            .unwrap();
        assert_eq!(entry.body, b"body{}");
        assert!(cache
            .match_request(&get("https://hub.example/other.css"))
            .is_none());
    }

    #[test]
    fn test_cache_rejects_non_get() {
        let mut cache = Cache::new("v1");
        let post = Request::post(
            Url::parse("https://hub.example/api").unwrap(),
            Bytes::from_static(b"{}"),
        );
        assert!(cache.put(&post, &ok("x")).is_err());

        cache.put(&get("https://hub.example/api"), &ok("x")).unwrap();
        assert!(cache.match_request(&post).is_none());
    }

    #[test]
    fn test_cache_rejects_partial_and_vary_star() {
        let mut cache = Cache::new("v1");
        let request = get("https://hub.example/video");

        let partial = Response::synthetic(206, "Partial Content", "x");
        assert!(cache.put(&request, &partial).is_err());

        let mut vary_star = ok("x");
        vary_star
            .headers
            .insert(http::header::VARY, HeaderValue::from_static("*"));
        assert!(cache.put(&request, &vary_star).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_vary_matching() {
        let mut cache = Cache::new("v1");
        let mut response = ok("fr");
        response.headers.insert(
            http::header::VARY,
            HeaderValue::from_static("Accept-Language"),
        );

        let french = get("https://hub.example/").header(
            http::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("fr"),
        );
        cache.put(&french, &response).unwrap();

        assert!(cache.match_request(&french).is_some());

        let english = get("https://hub.example/").header(
            http::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en"),
        );
        assert!(cache.match_request(&english).is_none());
        assert!(cache.match_request(&get("https://hub.example/")).is_none());
    }

    #[test]
    fn test_entry_round_trip_keeps_repeated_headers() {
        let mut response = ok("x");
        response
            .headers
            .append("x-tag", HeaderValue::from_static("a"));
        response
            .headers
            .append("x-tag", HeaderValue::from_static("b"));

        let entry = CacheEntry::capture(&get("https://hub.example/x"), &response);
        let rebuilt = entry.to_response();
        assert_eq!(rebuilt.headers.get_all("x-tag").iter().count(), 2);
        assert_eq!(rebuilt.response_type, ResponseType::Basic);
        assert_eq!(rebuilt.body, response.body);
    }

    #[test]
    fn test_entry_keeps_non_ascii_header_values() {
        let disposition = b"attachment; filename=\"caf\xc3\xa9.pdf\"";
        let mut response = ok("pdf");
        response.headers.insert(
            http::header::CONTENT_DISPOSITION,
            HeaderValue::from_bytes(disposition).unwrap(),
        );

        let rebuilt = CacheEntry::capture(&get("https://hub.example/menu.pdf"), &response)
            .to_response();
        assert_eq!(
            rebuilt
                .headers
                .get(http::header::CONTENT_DISPOSITION)
                .map(|v| v.as_bytes()),
            Some(&disposition[..])
        );
    }

    #[test]
    fn test_entry_keeps_redirected_flag() {
        let mut response = ok("moved");
        response.redirected = true;

        let entry = CacheEntry::capture(&get("https://hub.example/old"), &response);
        assert!(entry.redirected);
        assert!(entry.to_response().redirected);
    }

    #[tokio::test]
    async fn test_snapshot_keeps_binary_header_values() {
        let storage = MemoryCacheStorage::new();
        let request = get("https://hub.example/menu.pdf");
        let mut response = ok("pdf");
        response.headers.insert(
            "x-label",
            HeaderValue::from_bytes(b"caf\xc3\xa9").unwrap(),
        );
        storage.put("v1", &request, &response).await.unwrap();

        let json = serde_json::to_string(&storage.snapshot().await).unwrap();
        let snapshot = serde_json::from_str(&json).unwrap();
        let hit = MemoryCacheStorage::from_snapshot(snapshot)
            .match_request("v1", &request)
            .await
            .unwrap();
        assert_eq!(hit.headers.get("x-label").unwrap().as_bytes(), b"caf\xc3\xa9");
    }

    #[test]
    fn test_cache_delete_and_keys() {
        let mut cache = Cache::new("test");
        cache.put(&get("https://hub.example/b.js"), &ok("b")).unwrap();
        cache.put(&get("https://hub.example/a.js"), &ok("a")).unwrap();

        let keys = cache.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].url, "https://hub.example/a.js");

        assert!(cache.delete(&get("https://hub.example/a.js")));
        assert!(!cache.delete(&get("https://hub.example/a.js")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_namespaces() {
        let storage = MemoryCacheStorage::new();
        assert!(!storage.has("v1").await);

        storage.open("v1").await.unwrap();
        storage.open("v0").await.unwrap();
        assert!(storage.has("v1").await);
        assert_eq!(storage.list_namespaces().await, vec!["v0", "v1"]);

        assert!(storage.delete_namespace("v0").await.unwrap());
        assert!(!storage.delete_namespace("v0").await.unwrap());
        assert_eq!(storage.list_namespaces().await, vec!["v1"]);
    }

    #[tokio::test]
    async fn test_storage_match_is_scoped_to_namespace() {
        let storage = MemoryCacheStorage::new();
        let request = get("https://hub.example/index.html");
        storage.put("v0", &request, &ok("old")).await.unwrap();

        assert!(storage.match_request("v1", &request).await.is_none());
        let hit = storage.match_request("v0", &request).await.unwrap();
        assert_eq!(hit.text().unwrap(), "old");
    }

    #[tokio::test]
    async fn test_storage_put_all_and_delete_entry() {
        let storage = MemoryCacheStorage::new();
        let pairs = vec![
            (get("https://hub.example/"), ok("root")),
            (get("https://hub.example/index.html"), ok("index")),
        ];
        storage.put_all("v1", &pairs).await.unwrap();
        assert_eq!(storage.len("v1").await, 2);

        assert!(storage.delete_entry("v1", &pairs[0].0).await);
        assert_eq!(storage.keys("v1").await.len(), 1);
        assert!(!storage.delete_entry("missing", &pairs[0].0).await);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let storage = MemoryCacheStorage::new();
        let request = get("https://hub.example/js/script.js").mode(RequestMode::SameOrigin);
        storage.put("v1", &request, &ok("js")).await.unwrap();
        storage.open("empty").await.unwrap();

        let restored = MemoryCacheStorage::from_snapshot(storage.snapshot().await);
        assert_eq!(restored.list_namespaces().await, vec!["empty", "v1"]);
        let hit = restored.match_request("v1", &request).await.unwrap();
        assert_eq!(hit.text().unwrap(), "js");
    }
}
