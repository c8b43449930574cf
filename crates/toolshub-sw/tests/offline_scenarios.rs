//! End-to-end scenarios: install, activate, then serve requests on and offline.

use std::sync::Arc;

use bytes::Bytes;
use toolshub_net::{Request, RequestMode, StubFetcher};
use toolshub_sw::manifest::{BEST_EFFORT_RESOURCES, CACHE_NAME, REQUIRED_RESOURCES};
use toolshub_sw::{
    Activator, BypassReason, CacheStore, Clients, FetchEvent, FetchOutcome, MemoryCacheStorage,
    NotificationCenter, ResponseSource, ServiceWorker, ServiceWorkerConfig, ServiceWorkerError,
    ServiceWorkerHost,
};
use tokio::sync::RwLock;
use url::Url;

const ORIGIN: &str = "https://hub.example/";

fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

fn config() -> ServiceWorkerConfig {
    ServiceWorkerConfig {
        origin: origin(),
        ..Default::default()
    }
}

/// A fetcher answering every manifest entry with 200.
fn reachable_site() -> Arc<StubFetcher> {
    let stub = Arc::new(StubFetcher::new());
    for path in REQUIRED_RESOURCES {
        let url = origin().join(path).unwrap();
        stub.respond(url.as_str(), 200, format!("content of {path}"));
    }
    for url in BEST_EFFORT_RESOURCES {
        stub.respond(url, 200, "/* css */");
    }
    stub
}

struct World {
    host: ServiceWorkerHost,
    caches: Arc<MemoryCacheStorage>,
    stub: Arc<StubFetcher>,
}

fn world(stub: Arc<StubFetcher>) -> World {
    let caches = Arc::new(MemoryCacheStorage::new());
    let (host, _events) = ServiceWorkerHost::new(
        config(),
        caches.clone(),
        stub.clone(),
        Arc::new(NotificationCenter::new()),
    )
    .unwrap();
    World {
        host,
        caches,
        stub,
    }
}

fn script() -> Url {
    origin().join("/sw.js").unwrap()
}

fn page_get(path: &str) -> FetchEvent {
    let url = origin().join(path).unwrap();
    FetchEvent::new(
        Request::get(url)
            .origin(origin().origin())
            .mode(RequestMode::SameOrigin),
    )
}

fn navigation(path: &str) -> FetchEvent {
    FetchEvent::new(Request::navigate(origin().join(path).unwrap()))
}

#[tokio::test]
async fn install_with_everything_reachable_caches_all_six_entries() {
    let w = world(reachable_site());

    let report = w.host.install(script()).await.unwrap();
    assert_eq!(report.required.len(), 4);
    assert_eq!(report.best_effort_cached.len(), 2);
    assert!(report.best_effort_failed.is_empty());

    assert_eq!(w.caches.len(CACHE_NAME).await, 6);
}

#[tokio::test]
async fn install_survives_unreachable_font_stylesheet() {
    let stub = reachable_site();
    let fonts = BEST_EFFORT_RESOURCES[0];
    stub.fail(fonts);
    let w = world(stub);

    let report = w.host.install(script()).await.unwrap();
    assert_eq!(report.best_effort_failed.len(), 1);
    assert_eq!(report.best_effort_failed[0].0.as_str(), fonts);

    assert_eq!(w.caches.len(CACHE_NAME).await, 5);
    let font_request = Request::get(Url::parse(fonts).unwrap());
    assert!(w.caches.match_request(CACHE_NAME, &font_request).await.is_none());
    let icons = Request::get(Url::parse(BEST_EFFORT_RESOURCES[1]).unwrap());
    assert!(w.caches.match_request(CACHE_NAME, &icons).await.is_some());
}

#[tokio::test]
async fn install_fails_when_a_required_resource_is_unreachable() {
    let stub = reachable_site();
    stub.fail("https://hub.example/css/style.css");
    let w = world(stub);

    let result = w.host.install(script()).await;
    match result {
        Err(ServiceWorkerError::InstallFailed { url, .. }) => {
            assert_eq!(url, "https://hub.example/css/style.css")
        }
        other => panic!("expected install failure, got {other:?}"),
    }
    assert!(w.host.active_worker().await.is_none());
    assert!(w.host.waiting_worker().await.is_none());
}

#[tokio::test]
async fn required_resources_are_served_from_cache_after_install() {
    let w = world(reachable_site());
    w.host.start(script()).await.unwrap();
    let calls_after_install = w.stub.call_count();

    for path in REQUIRED_RESOURCES {
        let outcome = w.host.handle_fetch(&page_get(path)).await;
        assert_eq!(outcome.source(), Some(ResponseSource::Cache), "{path}");
        assert_eq!(
            outcome.response().unwrap().body,
            Bytes::from(format!("content of {path}"))
        );
    }
    assert_eq!(w.stub.call_count(), calls_after_install);
}

#[tokio::test]
async fn activation_leaves_only_the_current_namespace() {
    let w = world(reachable_site());
    w.caches.open("ai-tools-hub-v0").await.unwrap();
    w.caches.open(CACHE_NAME).await.unwrap();

    w.host.start(script()).await.unwrap();
    assert_eq!(w.caches.list_namespaces().await, vec![CACHE_NAME]);
}

#[tokio::test]
async fn repeated_activation_is_idempotent() {
    let w = world(reachable_site());
    w.caches.open("ai-tools-hub-v0").await.unwrap();
    w.host.start(script()).await.unwrap();
    let entries = w.caches.keys(CACHE_NAME).await;

    for _ in 0..3 {
        let report = w.host.activate().await.unwrap();
        assert!(report.deleted.is_empty());
    }

    assert_eq!(w.caches.list_namespaces().await, vec![CACHE_NAME]);
    assert_eq!(w.caches.keys(CACHE_NAME).await, entries);
}

#[tokio::test]
async fn activator_alone_cleans_up_stale_versions() {
    let caches = Arc::new(MemoryCacheStorage::new());
    caches.open("ai-tools-hub-v0").await.unwrap();
    caches.open(CACHE_NAME).await.unwrap();

    let worker = ServiceWorker::new(script(), CACHE_NAME).id;
    let clients = Arc::new(RwLock::new(Clients::new()));
    let activator = Activator::new(CACHE_NAME, caches.clone(), clients);
    let report = activator.run(worker, &origin()).await;
    assert_eq!(report.deleted, vec!["ai-tools-hub-v0"]);
    assert_eq!(caches.list_namespaces().await, vec![CACHE_NAME]);
}

#[tokio::test]
async fn offline_navigation_serves_cached_index() {
    let w = world(reachable_site());
    w.host.start(script()).await.unwrap();
    w.stub.set_offline(true);

    let outcome = w.host.handle_fetch(&navigation("/dashboard")).await;
    assert_eq!(outcome.source(), Some(ResponseSource::OfflineDocument));
    assert_eq!(
        outcome.response().unwrap().text().unwrap(),
        "content of /index.html"
    );
}

#[tokio::test]
async fn offline_subresource_gets_408_placeholder() {
    let w = world(reachable_site());
    w.host.start(script()).await.unwrap();
    w.stub.set_offline(true);

    let outcome = w.host.handle_fetch(&page_get("/api/data")).await;
    let response = outcome.response().unwrap();
    assert_eq!(outcome.source(), Some(ResponseSource::OfflinePlaceholder));
    assert_eq!(response.status, 408);
    assert_eq!(response.status_text, "Request Timeout");
    assert_eq!(response.text().unwrap(), "Offline");
}

#[tokio::test]
async fn miss_is_fetched_then_served_from_cache() {
    let stub = reachable_site();
    stub.respond("https://hub.example/tools.json", 200, "[]");
    let w = world(stub);
    w.host.start(script()).await.unwrap();

    let first = w.host.handle_fetch(&page_get("/tools.json")).await;
    assert_eq!(first.source(), Some(ResponseSource::Network));
    w.host.settle().await;
    let calls = w.stub.call_count();

    let second = w.host.handle_fetch(&page_get("/tools.json")).await;
    assert_eq!(second.source(), Some(ResponseSource::Cache));
    assert_eq!(second.response().unwrap().body, first.response().unwrap().body);
    assert_eq!(w.stub.call_count(), calls);
}

#[tokio::test]
async fn non_cacheable_responses_never_reach_the_cache() {
    let stub = reachable_site();
    stub.respond("https://hub.example/gone", 404, "missing")
        .respond("https://hub.example/moved", 301, "");
    let w = world(stub);
    w.host.start(script()).await.unwrap();

    w.host.handle_fetch(&page_get("/gone")).await;
    w.host.handle_fetch(&page_get("/moved")).await;
    w.host.settle().await;

    for path in ["/gone", "/moved"] {
        let request = Request::get(origin().join(path).unwrap());
        assert!(w.caches.match_request(CACHE_NAME, &request).await.is_none());
    }
}

#[tokio::test]
async fn non_get_and_non_network_requests_pass_through() {
    let w = world(reachable_site());
    w.host.start(script()).await.unwrap();
    let calls = w.stub.call_count();

    let post = Request::post(origin().join("/api/data").unwrap(), Bytes::from_static(b"{}"));
    let outcome = w.host.handle_fetch(&FetchEvent::new(post)).await;
    assert!(matches!(
        outcome,
        FetchOutcome::PassThrough(BypassReason::NonGetMethod)
    ));

    let extension = Request::get(Url::parse("chrome-extension://abc/page.js").unwrap());
    let outcome = w.host.handle_fetch(&FetchEvent::new(extension)).await;
    assert!(matches!(
        outcome,
        FetchOutcome::PassThrough(BypassReason::NonNetworkScheme)
    ));

    assert_eq!(w.stub.call_count(), calls);
}
