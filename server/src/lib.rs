//! HTTP surface for the media cache.
//!
//! Routes are thin: each one parses the request, calls [`CoreService`], and
//! maps [`core_service::CoreError`] onto a status code in [`response`].

pub mod response;
mod routes;

use axum::routing::{delete, get, post};
use axum::Router;
use core_runtime::events::{EventBus, EventSeverity, EventStream, RecvError};
use core_service::CoreService;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: CoreService,
}

/// Build the full router around `service`.
pub fn build_router(service: CoreService) -> Router {
    Router::new()
        .route("/ping", get(routes::ping))
        .route("/play", get(routes::play))
        .route("/media/:file", get(routes::media))
        .route("/stream_proxy", get(routes::stream_proxy))
        .route("/likes", get(routes::list_likes).post(routes::like))
        .route("/likes/:id", delete(routes::unlike))
        .route("/cache", post(routes::cache_track))
        .route("/admin/cache", delete(routes::clear_cache))
        .route("/admin/cache/stats", get(routes::cache_stats))
        .route("/admin/cache/liked", post(routes::cache_liked))
        .route("/admin/cache/:id", delete(routes::delete_cached))
        .with_state(AppState { service })
}

/// Log cache and playback events at `Info` severity and above.
///
/// Ends when every sender of `events` is dropped.
pub fn spawn_event_log(events: &EventBus) -> JoinHandle<()> {
    let mut stream = EventStream::new(events.subscribe())
        .filter(|event| event.severity() >= EventSeverity::Info);

    tokio::spawn(async move {
        loop {
            match stream.recv().await {
                Ok(event) => match event.severity() {
                    EventSeverity::Error => error!(?event, "{}", event.description()),
                    EventSeverity::Warning => warn!(?event, "{}", event.description()),
                    _ => info!(?event, "{}", event.description()),
                },
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Event log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Serve `service` on `listener` until `shutdown` resolves, then wait for
/// in-flight downloads.
pub async fn serve<F>(
    listener: TcpListener,
    service: CoreService,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Listening");
    }
    let event_log = spawn_event_log(service.events());

    axum::serve(listener, build_router(service.clone()))
        .with_graceful_shutdown(shutdown)
        .await?;

    service.shutdown().await;
    event_log.abort();
    Ok(())
}
