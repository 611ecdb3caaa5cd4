//! HTTP-level tests: a real listener on 127.0.0.1, driven with reqwest

use bridge_traits::fakes::{FakeHttpClient, FakeResolver};
use core_runtime::config::{CoreConfig, InProgressPolicy};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_service::{CoreDependencies, CoreService};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

const SONG_URL: &str = "https://media.example.com/song.m4a";

struct TestServer {
    _temp: TempDir,
    base: String,
    service: CoreService,
    client: reqwest::Client,
}

fn audio(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

async fn start(policy: InProgressPolicy) -> TestServer {
    let temp = TempDir::new().unwrap();
    let config = CoreConfig::builder()
        .database_path(temp.path().join("index.db"))
        .cache_dir(temp.path().join("cache"))
        .retry_base_delay(Duration::from_millis(1))
        .in_progress_policy(policy)
        .build()
        .unwrap();

    let resolver = FakeResolver::new().with_track("Artist", "Song", SONG_URL);
    let http = FakeHttpClient::new()
        .with_body(SONG_URL, "audio/mp4", audio(1000))
        .with_status("https://media.example.com/forbidden.m4a", 403)
        .with_transport_failure("https://media.example.com/reset.m4a");
    let deps = CoreDependencies::new(Arc::new(http), Arc::new(resolver));
    let service = CoreService::bootstrap(config, deps).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = tunecache_server::build_router(service.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        _temp: temp,
        base: format!("http://{}", addr),
        service,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn cache_song(&self, id: &str) {
        self.client
            .get(self.url(&format!("/play?id={}&artist=Artist&title=Song", id)))
            .send()
            .await
            .unwrap();
        self.service.coordinator().wait_idle().await;
    }
}

#[tokio::test]
async fn test_ping() {
    let server = start(InProgressPolicy::StreamRemote).await;
    let resp = server.client.get(server.url("/ping")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "pong");
}

#[tokio::test]
async fn test_play_remote_then_local() {
    let server = start(InProgressPolicy::StreamRemote).await;

    let first: Value = server
        .client
        .get(server.url("/play?id=1001&artist=Artist&title=Song"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first, json!({"source": "remote", "url": SONG_URL}));

    server.service.coordinator().wait_idle().await;

    let second: Value = server
        .client
        .get(server.url("/play?id=1001&artist=Artist&title=Song"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second, json!({"source": "local", "url": "/media/1001.m4a"}));
}

#[tokio::test]
async fn test_play_retry_later_reports_queued() {
    let server = start(InProgressPolicy::RetryLater).await;

    let body: Value = server
        .client
        .get(server.url("/play?id=5&artist=Artist&title=Song"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "queued"}));
    server.service.coordinator().wait_idle().await;
}

#[tokio::test]
async fn test_play_errors() {
    let server = start(InProgressPolicy::StreamRemote).await;

    let missing = server.client.get(server.url("/play?artist=A")).send().await.unwrap();
    assert_eq!(missing.status(), 400);
    let body: Value = missing.json().await.unwrap();
    assert!(body["error"].is_string());

    let unknown = server
        .client
        .get(server.url("/play?id=9&artist=Nobody&title=Nothing"))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
    server.service.coordinator().wait_idle().await;
}

#[tokio::test]
async fn test_media_full_and_ranged() {
    let server = start(InProgressPolicy::StreamRemote).await;
    server.cache_song("1000").await;

    let full = server
        .client
        .get(server.url("/media/1000.m4a"))
        .send()
        .await
        .unwrap();
    assert_eq!(full.status(), 200);
    assert_eq!(full.headers()["accept-ranges"], "bytes");
    assert_eq!(full.headers()["content-type"], "audio/mp4");
    assert_eq!(full.bytes().await.unwrap().len(), 1000);

    let partial = server
        .client
        .get(server.url("/media/1000.m4a"))
        .header("Range", "bytes=100-199")
        .send()
        .await
        .unwrap();
    assert_eq!(partial.status(), 206);
    assert_eq!(partial.headers()["content-range"], "bytes 100-199/1000");
    assert_eq!(partial.headers()["accept-ranges"], "bytes");
    assert_eq!(&partial.bytes().await.unwrap()[..], &audio(1000)[100..200]);

    let tail = server
        .client
        .get(server.url("/media/1000.m4a"))
        .header("Range", "bytes=900-")
        .send()
        .await
        .unwrap();
    assert_eq!(tail.status(), 206);
    assert_eq!(tail.headers()["content-range"], "bytes 900-999/1000");
    assert_eq!(tail.bytes().await.unwrap().len(), 100);
}

#[tokio::test]
async fn test_media_errors() {
    let server = start(InProgressPolicy::StreamRemote).await;
    server.cache_song("1000").await;

    let unsatisfiable = server
        .client
        .get(server.url("/media/1000.m4a"))
        .header("Range", "bytes=5000-")
        .send()
        .await
        .unwrap();
    assert_eq!(unsatisfiable.status(), 416);
    assert_eq!(unsatisfiable.headers()["content-range"], "bytes */1000");

    let malformed = server
        .client
        .get(server.url("/media/1000.m4a"))
        .header("Range", "bytes=oops")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 200);

    let miss = server
        .client
        .get(server.url("/media/424242.m4a"))
        .send()
        .await
        .unwrap();
    assert_eq!(miss.status(), 404);
}

#[tokio::test]
async fn test_stream_proxy() {
    let server = start(InProgressPolicy::StreamRemote).await;

    let resp = server
        .client
        .get(server.url("/stream_proxy"))
        .query(&[("url", SONG_URL)])
        .header("Range", "bytes=0-99")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()["content-type"], "audio/mp4");
    assert_eq!(resp.headers()["content-range"], "bytes 0-99/1000");
    assert_eq!(resp.bytes().await.unwrap().len(), 100);

    let forbidden = server
        .client
        .get(server.url("/stream_proxy"))
        .query(&[("url", "https://media.example.com/forbidden.m4a")])
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    let reset = server
        .client
        .get(server.url("/stream_proxy"))
        .query(&[("url", "https://media.example.com/reset.m4a")])
        .send()
        .await
        .unwrap();
    assert_eq!(reset.status(), 502);

    let missing = server.client.get(server.url("/stream_proxy")).send().await.unwrap();
    assert_eq!(missing.status(), 400);
}

#[tokio::test]
async fn test_likes_and_admin() {
    let server = start(InProgressPolicy::StreamRemote).await;

    let created = server
        .client
        .post(server.url("/likes"))
        .json(&json!({"id": "77", "artist": "Artist", "title": "Song"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    server.service.coordinator().wait_idle().await;

    let likes: Value = server
        .client
        .get(server.url("/likes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(likes.as_array().unwrap().len(), 1);
    assert_eq!(likes[0]["track_id"], "77");
    assert_eq!(likes[0]["cached"], true);

    let summary: Value = server
        .client
        .post(server.url("/admin/cache/liked"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["queued"], 0);
    assert_eq!(summary["already_cached"], 1);

    let stats: Value = server
        .client
        .get(server.url("/admin/cache/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["entry_count"], 1);
    assert_eq!(stats["total_bytes"], 1000);

    let deleted: Value = server
        .client
        .delete(server.url("/admin/cache/77"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted, json!({"removed": true}));

    server.cache_song("78").await;
    let cleared: Value = server
        .client
        .delete(server.url("/admin/cache"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared, json!({"removed": 1}));

    let unliked: Value = server
        .client
        .delete(server.url("/likes/77"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unliked, json!({"removed": true}));
}

#[tokio::test]
async fn test_cache_single_track() {
    let server = start(InProgressPolicy::StreamRemote).await;
    let body = json!({"id": "55", "artist": "Artist", "title": "Song"});

    let queued: Value = server
        .client
        .post(server.url("/cache"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(queued, json!({"status": "queued"}));
    server.service.coordinator().wait_idle().await;

    let cached: Value = server
        .client
        .post(server.url("/cache"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cached, json!({"status": "already_cached"}));

    let invalid = server
        .client
        .post(server.url("/cache"))
        .json(&json!({"id": "..", "title": "Song"}))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);
}

#[tokio::test]
async fn test_event_log_stops_when_bus_closes() {
    let bus = EventBus::new(8);
    let handle = tunecache_server::spawn_event_log(&bus);

    bus.emit(CoreEvent::Cache(CacheEvent::Cleared { entries_removed: 3 }))
        .unwrap();
    drop(bus);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
