//! Integration tests for the offline core

use async_trait::async_trait;
use leoiptv_offline::cache::{GenerationSet, PrecacheManifest};
use leoiptv_offline::config::Config;
use leoiptv_offline::http::{CacheKey, Request, Response, ResponseType};
use leoiptv_offline::interceptor::{Interception, Interceptor, ResponseSource};
use leoiptv_offline::lifecycle::LifecycleManager;
use leoiptv_offline::platform::{ClientRegistry, Notification, Notifier};
use leoiptv_offline::store::{CacheStore, DiskStore, EntryInfo, MemoryStore};
use leoiptv_offline::sync::ConfigPlaylistSource;
use leoiptv_offline::transport::Transport;
use leoiptv_offline::{
    Event, EventOutcome, OfflineError, OfflineResult, Platform, ServiceWorker, WorkerState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

const ORIGIN: &str = "https://leoiptv.test";

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Transport with per-path scripted responses and a connectivity switch
#[derive(Default)]
struct ScriptedTransport {
    routes: Mutex<HashMap<String, (u16, ResponseType, String)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn route(&self, path: &str, status: u16, body: &str) {
        self.route_typed(path, status, ResponseType::Basic, body);
    }

    fn route_typed(&self, path: &str, status: u16, kind: ResponseType, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, kind, body.to_string()));
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: &Request) -> OfflineResult<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(OfflineError::network(request.url.as_str(), "no connectivity"));
        }

        let route = self.routes.lock().unwrap().get(request.url.path()).cloned();
        match route {
            Some((status, kind, body)) => {
                Ok(Response::basic(request.url.clone(), status, body).with_type(kind))
            }
            None => Err(OfflineError::network(request.url.as_str(), "dns failure")),
        }
    }
}

#[derive(Default)]
struct RecordingClients {
    claims: AtomicUsize,
    opened: Mutex<Vec<String>>,
}

#[async_trait]
impl ClientRegistry for RecordingClients {
    async fn claim(&self) -> OfflineResult<usize> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Ok(2)
    }

    async fn open_window(&self, url: &str) -> OfflineResult<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    shown: Mutex<Vec<Notification>>,
    closed: AtomicUsize,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show(&self, notification: Notification) -> OfflineResult<()> {
        self.shown.lock().unwrap().push(notification);
        Ok(())
    }

    async fn close(&self, _primary_key: u32) -> OfflineResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store wrapper whose single-entry writes always fail
struct ReadOnlyStore {
    inner: MemoryStore,
}

#[async_trait]
impl CacheStore for ReadOnlyStore {
    async fn open(&self, name: &str) -> OfflineResult<()> {
        self.inner.open(name).await
    }

    async fn names(&self) -> OfflineResult<Vec<String>> {
        self.inner.names().await
    }

    async fn match_in(&self, name: &str, key: &CacheKey) -> OfflineResult<Option<Response>> {
        self.inner.match_in(name, key).await
    }

    async fn put(&self, _name: &str, _key: CacheKey, _response: Response) -> OfflineResult<()> {
        Err(OfflineError::io(
            "writing entry",
            std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded"),
        ))
    }

    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, Response)>) -> OfflineResult<()> {
        self.inner.put_all(name, entries).await
    }

    async fn entries(&self, name: &str) -> OfflineResult<Vec<EntryInfo>> {
        self.inner.entries(name).await
    }

    async fn delete(&self, name: &str) -> OfflineResult<bool> {
        self.inner.delete(name).await
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.app.origin = ORIGIN.to_string();
    config.cache.precache = ["/", "/index.html", "/manifest.json", "/logo.png"]
        .iter()
        .map(|p| p.to_string())
        .collect();
    config
}

fn shell_transport() -> Arc<ScriptedTransport> {
    let transport = Arc::new(ScriptedTransport::default());
    transport.route("/", 200, "<html>root</html>");
    transport.route("/index.html", 200, "<html>shell</html>");
    transport.route("/manifest.json", 200, "{\"name\":\"LEOIPTV\"}");
    transport.route("/logo.png", 200, "PNG");
    transport
}

struct Harness {
    worker: ServiceWorker,
    store: Arc<MemoryStore>,
    transport: Arc<ScriptedTransport>,
    clients: Arc<RecordingClients>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(transport: Arc<ScriptedTransport>, store: Arc<MemoryStore>) -> Harness {
    let clients = Arc::new(RecordingClients::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let platform = Platform {
        store: store.clone(),
        transport: transport.clone(),
        clients: clients.clone(),
        notifier: notifier.clone(),
        playlists: Arc::new(ConfigPlaylistSource::default()),
    };
    Harness {
        worker: ServiceWorker::new(&config(), platform).unwrap(),
        store,
        transport,
        clients,
        notifier,
    }
}

async fn activated(transport: Arc<ScriptedTransport>) -> Harness {
    let h = harness(transport, Arc::new(MemoryStore::new()));
    h.worker.dispatch(Event::Install).await.unwrap();
    h.worker.dispatch(Event::Activate).await.unwrap();
    h
}

async fn resolve(h: &Harness, request: Request) -> leoiptv_offline::interceptor::Resolved {
    match h.worker.dispatch(Event::Fetch(request)).await.unwrap() {
        EventOutcome::Fetch(Interception::Responded(resolved)) => resolved,
        other => panic!("expected a response, got {other:?}"),
    }
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn install_precaches_exactly_the_manifest() {
        let h = harness(shell_transport(), Arc::new(MemoryStore::new()));

        h.worker.dispatch(Event::Install).await.unwrap();

        let keys: Vec<String> = h
            .store
            .keys("leoiptv-static-v1")
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.url)
            .collect();
        let mut expected: Vec<String> = ["/", "/index.html", "/manifest.json", "/logo.png"]
            .iter()
            .map(|p| url(p).to_string())
            .collect();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn failed_asset_leaves_previous_generation_authoritative() {
        let store = Arc::new(MemoryStore::new());
        let old_shell = Response::basic(url("/index.html"), 200, "<html>v0</html>");
        store
            .put("leoiptv-static-v0", CacheKey::get(&url("/index.html")), old_shell.clone())
            .await
            .unwrap();

        let transport = shell_transport();
        transport.route("/logo.png", 500, "boom");
        let h = harness(transport, store);

        let err = h.worker.dispatch(Event::Install).await.unwrap_err();
        assert!(matches!(err, OfflineError::PrecacheFailure { .. }));

        assert_eq!(h.store.names().await.unwrap(), vec!["leoiptv-static-v0"]);
        assert_eq!(
            h.store.match_any(&CacheKey::get(&url("/index.html"))).await.unwrap(),
            Some(old_shell)
        );
        assert!(h.worker.dispatch(Event::Activate).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_asset_aborts_install() {
        let transport = shell_transport();
        transport.routes.lock().unwrap().remove("/manifest.json");
        let h = harness(transport, Arc::new(MemoryStore::new()));

        assert!(h.worker.dispatch(Event::Install).await.is_err());
        assert!(h.store.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn activation_purges_stale_generations() {
        let store = Arc::new(MemoryStore::new());
        for name in ["leoiptv-v0", "leoiptv-dynamic-v1"] {
            store.open(name).await.unwrap();
        }
        let h = harness(shell_transport(), store);

        h.worker.dispatch(Event::Install).await.unwrap();
        let report = match h.worker.dispatch(Event::Activate).await.unwrap() {
            EventOutcome::Activated(report) => report,
            other => panic!("unexpected outcome: {other:?}"),
        };

        assert_eq!(report.deleted, vec!["leoiptv-v0"]);
        assert_eq!(report.claimed, 2);
        assert_eq!(h.clients.claims.load(Ordering::SeqCst), 1);

        let mut names = h.store.names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["leoiptv-dynamic-v1", "leoiptv-static-v1"]);
    }

    #[tokio::test]
    async fn version_bump_replaces_generations() {
        let store = Arc::new(MemoryStore::new());
        let transport = shell_transport();
        let manifest = PrecacheManifest::new(&url("/"), &["/", "/index.html"], "/index.html").unwrap();

        for version in ["v1", "v2"] {
            let lifecycle = LifecycleManager::new(
                store.clone(),
                transport.clone(),
                Arc::new(RecordingClients::default()),
                GenerationSet::new("leoiptv", version),
                manifest.clone(),
            );
            lifecycle.install().await.unwrap();
            lifecycle.activate().await.unwrap();
        }

        assert_eq!(store.names().await.unwrap(), vec!["leoiptv-static-v2"]);
    }
}

mod interceptor_tests {
    use super::*;

    #[tokio::test]
    async fn cached_request_issues_no_network_call() {
        let h = activated(shell_transport()).await;
        let before = h.transport.calls();

        let resolved = resolve(&h, Request::get(url("/manifest.json"))).await;

        assert_eq!(resolved.source, ResponseSource::Cache);
        assert_eq!(resolved.response.body.as_ref(), b"{\"name\":\"LEOIPTV\"}");
        assert_eq!(h.transport.calls(), before);
    }

    #[tokio::test]
    async fn eligible_miss_roundtrips_through_dynamic_cache() {
        let transport = shell_transport();
        transport.route("/api/channels", 200, "[{\"id\":\"1\"}]");
        let h = activated(transport).await;

        let first = resolve(&h, Request::get(url("/api/channels"))).await;
        assert_eq!(first.source, ResponseSource::Network);
        first.cache_write.unwrap().await.unwrap();

        let calls = h.transport.calls();
        let second = resolve(&h, Request::get(url("/api/channels"))).await;

        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.response, first.response);
        assert_eq!(h.transport.calls(), calls);
        assert_eq!(h.store.keys("leoiptv-dynamic-v1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn not_found_is_returned_unmodified_and_not_cached() {
        let transport = shell_transport();
        transport.route("/api/data", 404, "missing");
        let h = activated(transport).await;

        let resolved = resolve(&h, Request::get(url("/api/data"))).await;

        assert_eq!(resolved.response.status, 404);
        assert_eq!(resolved.response.body.as_ref(), b"missing");
        assert!(resolved.cache_write.is_none());
        assert!(!h.store.has("leoiptv-dynamic-v1").await.unwrap());
    }

    #[tokio::test]
    async fn opaque_and_cors_responses_are_never_cached() {
        let transport = shell_transport();
        transport.route_typed("/proxy/a", 200, ResponseType::Opaque, "a");
        transport.route_typed("/proxy/b", 200, ResponseType::Cors, "b");
        transport.route_typed("/proxy/c", 200, ResponseType::OpaqueRedirect, "");
        let h = activated(transport).await;

        for path in ["/proxy/a", "/proxy/b", "/proxy/c"] {
            let resolved = resolve(&h, Request::get(url(path))).await;
            assert!(resolved.cache_write.is_none());
        }
        assert!(!h.store.has("leoiptv-dynamic-v1").await.unwrap());
    }

    #[tokio::test]
    async fn cross_origin_and_post_pass_through() {
        let h = activated(shell_transport()).await;

        let external = Request::parse("https://images.pexels.com/photo.jpg").unwrap();
        let post = Request::get(url("/api/playlists")).with_method("POST");

        for request in [external, post] {
            assert!(matches!(
                h.worker.dispatch(Event::Fetch(request)).await.unwrap(),
                EventOutcome::Fetch(Interception::PassThrough)
            ));
        }
    }

    #[tokio::test]
    async fn offline_navigation_serves_index_html() {
        let transport = shell_transport();
        let h = activated(transport.clone()).await;
        transport.go_offline();

        let resolved = resolve(&h, Request::navigate(url("/channels/sports"))).await;

        assert_eq!(resolved.source, ResponseSource::Fallback);
        assert_eq!(resolved.response.url, url("/index.html"));
        assert_eq!(resolved.response.body.as_ref(), b"<html>shell</html>");
    }

    #[tokio::test]
    async fn offline_subresource_fails() {
        let transport = shell_transport();
        let h = activated(transport.clone()).await;
        transport.go_offline();

        let outcome = h
            .worker
            .dispatch(Event::Fetch(Request::get(url("/api/epg"))))
            .await
            .unwrap();

        match outcome {
            EventOutcome::Fetch(Interception::Failed(err)) => assert!(err.is_retryable()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cache_write_failure_is_invisible_to_caller() {
        let transport = shell_transport();
        transport.route("/api/data", 200, "payload");
        let store = Arc::new(ReadOnlyStore {
            inner: MemoryStore::new(),
        });
        let manifest = PrecacheManifest::new(&url("/"), &["/index.html"], "/index.html").unwrap();
        let interceptor = Interceptor::new(
            store.clone(),
            transport,
            url("/"),
            GenerationSet::new("leoiptv", "v1"),
            &manifest,
        );

        let resolved = interceptor.resolve(&Request::get(url("/api/data"))).await.unwrap();

        assert_eq!(resolved.response.body.as_ref(), b"payload");
        resolved.cache_write.unwrap().await.unwrap();
        assert!(store.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_independently() {
        let transport = shell_transport();
        for i in 0..8 {
            transport.route(&format!("/api/item/{i}"), 200, &format!("item {i}"));
        }
        let h = Arc::new(activated(transport).await);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let h = Arc::clone(&h);
            tasks.push(tokio::spawn(async move {
                let resolved = resolve(&h, Request::get(url(&format!("/api/item/{i}")))).await;
                if let Some(write) = resolved.cache_write {
                    write.await.unwrap();
                }
                resolved.response.body
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap().as_ref(), format!("item {i}").as_bytes());
        }

        assert_eq!(h.store.keys("leoiptv-dynamic-v1").await.unwrap().len(), 8);
    }
}

mod background_tests {
    use super::*;

    #[tokio::test]
    async fn playlist_refresh_populates_dynamic_cache() {
        let transport = shell_transport();
        transport.route("/playlists/main.m3u", 200, "#EXTM3U\n#EXTINF:-1,News\nhttp://x/1\n");
        let clients = Arc::new(RecordingClients::default());
        let store = Arc::new(MemoryStore::new());
        let mut config = config();
        config.sync.playlist_urls = vec![url("/playlists/main.m3u").to_string()];

        let platform = Platform {
            store: store.clone(),
            transport: transport.clone(),
            clients,
            notifier: Arc::new(RecordingNotifier::default()),
            playlists: Arc::new(ConfigPlaylistSource::from_strings(&config.sync.playlist_urls).unwrap()),
        };
        let worker = ServiceWorker::new(&config, platform).unwrap();

        worker
            .dispatch(Event::Sync { tag: "playlist-update".to_string() })
            .await
            .unwrap();

        let cached = store
            .match_in("leoiptv-dynamic-v1", &CacheKey::get(&url("/playlists/main.m3u")))
            .await
            .unwrap()
            .unwrap();
        assert!(cached.body.starts_with(b"#EXTM3U"));
    }

    #[tokio::test]
    async fn playlist_refresh_failure_goes_back_to_scheduler() {
        let transport = shell_transport();
        transport.go_offline();
        let mut config = config();
        config.sync.playlist_urls = vec![url("/playlists/main.m3u").to_string()];

        let platform = Platform {
            store: Arc::new(MemoryStore::new()),
            transport,
            clients: Arc::new(RecordingClients::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            playlists: Arc::new(ConfigPlaylistSource::from_strings(&config.sync.playlist_urls).unwrap()),
        };
        let worker = ServiceWorker::new(&config, platform).unwrap();

        let err = worker
            .dispatch(Event::Sync { tag: "playlist-update".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, OfflineError::BackgroundTask { .. }));
    }

    #[tokio::test]
    async fn push_and_click_reach_platform() {
        let h = harness(shell_transport(), Arc::new(MemoryStore::new()));

        h.worker
            .dispatch(Event::Push { payload: None })
            .await
            .unwrap();
        h.worker
            .dispatch(Event::NotificationClick { action: Some("explore".to_string()) })
            .await
            .unwrap();
        h.worker
            .dispatch(Event::NotificationClick { action: Some("close".to_string()) })
            .await
            .unwrap();

        let shown = h.notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].body, "New content available");
        assert_eq!(*h.clients.opened.lock().unwrap(), vec!["/".to_string()]);
        assert_eq!(h.notifier.closed.load(Ordering::SeqCst), 2);
    }
}

mod persistence_tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn disk_store_survives_restart() {
        let temp = TempDir::new().unwrap();
        let transport = shell_transport();
        let manifest =
            PrecacheManifest::new(&url("/"), &["/", "/index.html", "/manifest.json"], "/index.html")
                .unwrap();

        {
            let store = Arc::new(DiskStore::open_at(temp.path()).await.unwrap());
            let lifecycle = LifecycleManager::new(
                store,
                transport.clone(),
                Arc::new(RecordingClients::default()),
                GenerationSet::new("leoiptv", "v1"),
                manifest.clone(),
            );
            lifecycle.install().await.unwrap();
        }

        let store = Arc::new(DiskStore::open_at(temp.path()).await.unwrap());
        let interceptor = Interceptor::new(
            store,
            transport.clone(),
            url("/"),
            GenerationSet::new("leoiptv", "v1"),
            &manifest,
        );
        transport.go_offline();

        let resolved = interceptor
            .resolve(&Request::navigate(url("/settings")))
            .await
            .unwrap();
        assert_eq!(resolved.source, ResponseSource::Fallback);
        assert_eq!(resolved.response.body.as_ref(), b"<html>shell</html>");
    }

    fn disk_worker(store: Arc<DiskStore>, transport: Arc<ScriptedTransport>) -> ServiceWorker {
        let platform = Platform {
            store,
            transport,
            clients: Arc::new(RecordingClients::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            playlists: Arc::new(ConfigPlaylistSource::default()),
        };
        ServiceWorker::new(&config(), platform).unwrap()
    }

    #[tokio::test]
    async fn restarted_worker_serves_shell_offline() {
        let temp = TempDir::new().unwrap();
        let transport = shell_transport();

        {
            let store = Arc::new(DiskStore::open_at(temp.path()).await.unwrap());
            let worker = disk_worker(store, transport.clone());
            worker.dispatch(Event::Install).await.unwrap();
            worker.dispatch(Event::Activate).await.unwrap();
        }

        transport.go_offline();
        let store = Arc::new(DiskStore::open_at(temp.path()).await.unwrap());
        let worker = disk_worker(store, transport.clone());

        assert!(worker.resume().await.unwrap());
        assert_eq!(worker.state().await, WorkerState::Activated);

        let calls_before = transport.calls();
        match worker.fetch(&Request::get(url("/logo.png"))).await {
            Interception::Responded(resolved) => {
                assert_eq!(resolved.source, ResponseSource::Cache);
                assert_eq!(resolved.response.body.as_ref(), b"PNG");
            }
            other => panic!("expected cached logo, got {other:?}"),
        }
        assert_eq!(transport.calls(), calls_before);

        match worker.fetch(&Request::navigate(url("/channels/42"))).await {
            Interception::Responded(resolved) => {
                assert_eq!(resolved.source, ResponseSource::Fallback);
                assert_eq!(resolved.response.body.as_ref(), b"<html>shell</html>");
            }
            other => panic!("expected offline fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fresh_store_does_not_resume() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(DiskStore::open_at(temp.path()).await.unwrap());
        let worker = disk_worker(store, shell_transport());

        assert!(!worker.resume().await.unwrap());
        assert_eq!(worker.state().await, WorkerState::Parsed);
        assert!(matches!(
            worker.fetch(&Request::get(url("/logo.png"))).await,
            Interception::PassThrough
        ));
    }
}
