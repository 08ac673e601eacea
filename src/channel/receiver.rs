//! Notification receiver
//!
//! Hosts the loopback RPC endpoint, publishes its address through the
//! endpoint resolver, and republishes every inbound call as a local
//! [`ReceiverEvent`] before the call returns.
//!
//! Lifecycle: `Uninitialized → Listening → ShuttingDown → Stopped`.
//! `Listening` is entered at most once per instance.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::resolver::{DiscoveryFile, EndpointResolver};
use super::{
    Ack, PackGenerated, ReceiverCallback, ReceiverEvent, TrackPlayed, HEALTH_PATH,
    PACK_GENERATED_PATH, TRACK_PLAYED_PATH,
};
use crate::error::ChannelError;
use crate::paths::AppPaths;

/// Default bound on background teardown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Receiver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Uninitialized,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Shared state for RPC handlers
struct Dispatch {
    subscribers: RwLock<Vec<ReceiverCallback>>,
    token: CancellationToken,
}

impl Dispatch {
    /// Deliver an event to every subscriber, containing their failures
    fn deliver(&self, event: ReceiverEvent) -> bool {
        // Calls racing with teardown are dropped
        if self.token.is_cancelled() {
            return false;
        }

        let subscribers = self.subscribers.read().clone();
        for callback in subscribers {
            match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Receiver subscriber failed: {:#}", e),
                Err(_) => error!("Receiver subscriber panicked"),
            }
        }
        true
    }
}

/// Loopback notification receiver
pub struct NotificationReceiver {
    resolver: Arc<dyn EndpointResolver>,
    shutdown_timeout: Duration,
    state: Arc<RwLock<ReceiverState>>,
    dispatch: Arc<Dispatch>,
    server: Mutex<Option<JoinHandle<()>>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

static GLOBAL: Lazy<Arc<NotificationReceiver>> = Lazy::new(|| {
    let resolver = DiscoveryFile::new(AppPaths::discovery_file());
    Arc::new(NotificationReceiver::new(
        Arc::new(resolver),
        DEFAULT_SHUTDOWN_TIMEOUT,
    ))
});

impl NotificationReceiver {
    pub fn new(resolver: Arc<dyn EndpointResolver>, shutdown_timeout: Duration) -> Self {
        Self {
            resolver,
            shutdown_timeout,
            state: Arc::new(RwLock::new(ReceiverState::Uninitialized)),
            dispatch: Arc::new(Dispatch {
                subscribers: RwLock::new(Vec::new()),
                token: CancellationToken::new(),
            }),
            server: Mutex::new(None),
            local_addr: RwLock::new(None),
        }
    }

    /// Process-wide receiver publishing to the well-known discovery record
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Current lifecycle state.
    ///
    /// `dispose` returns while the state still reads `Listening`; the
    /// background teardown reports `ShuttingDown` and then `Stopped`.
    pub fn state(&self) -> ReceiverState {
        *self.state.read()
    }

    /// Address the server is bound to, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// Subscribe to inbound events
    pub fn subscribe(&self, callback: ReceiverCallback) {
        self.dispatch.subscribers.write().push(callback);
    }

    /// Start the server on an OS-assigned loopback port and publish its
    /// address.
    pub async fn initialize(&self) -> Result<SocketAddr, ChannelError> {
        {
            let mut state = self.state.write();
            if *state != ReceiverState::Uninitialized {
                return Err(ChannelError::AlreadyInitialized);
            }
            // Claimed before any await so a concurrent initialize fails fast
            *state = ReceiverState::Listening;
        }

        let listener = match tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
        {
            Ok(listener) => listener,
            Err(e) => {
                *self.state.write() = ReceiverState::Stopped;
                return Err(ChannelError::Bind(e));
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                *self.state.write() = ReceiverState::Stopped;
                return Err(ChannelError::Bind(e));
            }
        };
        *self.local_addr.write() = Some(addr);

        let router = build_router(Arc::clone(&self.dispatch));
        let token = self.dispatch.token.clone();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = result {
                error!("Notification receiver error: {}", e);
            }
        });
        *self.server.lock() = Some(server);
        info!("Notification receiver listening on http://{}", addr);

        if let Err(e) = self.resolver.publish(&format!("http://{}", addr)).await {
            self.dispose();
            return Err(e);
        }

        Ok(addr)
    }

    /// Begin teardown and return immediately.
    ///
    /// Inbound calls arriving after this point are not delivered. The server
    /// is given `shutdown_timeout` to drain in the background before it is
    /// aborted. Repeated calls are no-ops.
    pub fn dispose(&self) {
        {
            let state = self.state.write();
            if *state != ReceiverState::Listening || self.dispatch.token.is_cancelled() {
                return;
            }
            self.dispatch.token.cancel();
        }
        debug!("Notification receiver shutting down");

        let Some(server) = self.server.lock().take() else {
            *self.state.write() = ReceiverState::Stopped;
            return;
        };

        let state = Arc::clone(&self.state);
        let timeout = self.shutdown_timeout;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    *state.write() = ReceiverState::ShuttingDown;
                    let abort = server.abort_handle();
                    if tokio::time::timeout(timeout, server).await.is_err() {
                        warn!(
                            "Notification receiver did not stop within {:?}, aborting",
                            timeout
                        );
                        abort.abort();
                    }
                    *state.write() = ReceiverState::Stopped;
                    info!("Notification receiver stopped");
                });
            }
            Err(_) => {
                server.abort();
                *state.write() = ReceiverState::Stopped;
            }
        }
    }
}

impl Drop for NotificationReceiver {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Build the RPC router
fn build_router(dispatch: Arc<Dispatch>) -> Router {
    Router::new()
        .route(TRACK_PLAYED_PATH, post(track_played))
        .route(PACK_GENERATED_PATH, post(pack_generated))
        .route(HEALTH_PATH, get(health_check))
        .with_state(dispatch)
}

/// Reply for a call that arrived during teardown
fn shutting_down() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, Json(Ack { ok: false })).into_response()
}

/// POST /rpc/track-played
async fn track_played(
    State(dispatch): State<Arc<Dispatch>>,
    Json(message): Json<TrackPlayed>,
) -> Response {
    debug!(track = message.track_number, pack = %message.pack_name, "TrackPlayed received");
    if !dispatch.deliver(ReceiverEvent::TrackChanged(message)) {
        return shutting_down();
    }
    Json(Ack { ok: true }).into_response()
}

/// POST /rpc/pack-generated
async fn pack_generated(
    State(dispatch): State<Arc<Dispatch>>,
    Json(message): Json<PackGenerated>,
) -> Response {
    debug!(pack = %message.pack_name, "PackGenerated received");
    if !dispatch.deliver(ReceiverEvent::MsuGenerated(message)) {
        return shutting_down();
    }
    Json(Ack { ok: true }).into_response()
}

/// GET /health
async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_receiver(dir: &std::path::Path) -> NotificationReceiver {
        let resolver = Arc::new(DiscoveryFile::new(dir.join("receiver.endpoint")));
        NotificationReceiver::new(resolver, Duration::from_secs(1))
    }

    fn make_track() -> TrackPlayed {
        TrackPlayed {
            track_name: "Dark World".to_string(),
            track_number: 9,
            song_name: "Song".to_string(),
            album_name: None,
            artist_name: None,
            url: None,
            pack_name: "Pack".to_string(),
            pack_creator: Some("Someone".to_string()),
        }
    }

    #[tokio::test]
    async fn test_initialize_publishes_record() {
        let dir = tempdir().unwrap();
        let receiver = make_receiver(dir.path());
        assert_eq!(receiver.state(), ReceiverState::Uninitialized);

        let addr = receiver.initialize().await.unwrap();
        assert_eq!(receiver.state(), ReceiverState::Listening);
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);

        let record = std::fs::read_to_string(dir.path().join("receiver.endpoint")).unwrap();
        assert_eq!(record.trim(), format!("http://{}", addr));

        assert!(matches!(
            receiver.initialize().await,
            Err(ChannelError::AlreadyInitialized)
        ));
        receiver.dispose();
    }

    #[tokio::test]
    async fn test_inbound_call_reaches_subscribers() {
        let dir = tempdir().unwrap();
        let receiver = make_receiver(dir.path());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        receiver.subscribe(Arc::new(move |event: &ReceiverEvent| {
            sink.lock().push(event.clone());
            Ok(())
        }));
        let addr = receiver.initialize().await.unwrap();

        let response = reqwest::Client::new()
            .post(format!("http://{}{}", addr, TRACK_PLAYED_PATH))
            .json(&make_track())
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let ack: Ack = response.json().await.unwrap();
        assert!(ack.ok);

        // Delivered before the call returned
        assert_eq!(*seen.lock(), vec![ReceiverEvent::TrackChanged(make_track())]);
        receiver.dispose();
    }

    #[tokio::test]
    async fn test_subscriber_failures_do_not_cross_boundary() {
        let dir = tempdir().unwrap();
        let receiver = make_receiver(dir.path());
        let delivered = Arc::new(Mutex::new(0usize));

        receiver.subscribe(Arc::new(|_: &ReceiverEvent| -> anyhow::Result<()> {
            anyhow::bail!("subscriber failed")
        }));
        receiver.subscribe(Arc::new(|_: &ReceiverEvent| -> anyhow::Result<()> {
            panic!("subscriber panicked")
        }));
        let counter = Arc::clone(&delivered);
        receiver.subscribe(Arc::new(move |_: &ReceiverEvent| {
            *counter.lock() += 1;
            Ok(())
        }));
        let addr = receiver.initialize().await.unwrap();

        let message = PackGenerated {
            pack_name: "Pack".to_string(),
            pack_creator: None,
            pack_path: "/packs/pack".to_string(),
            pack_type_name: "Super Metroid".to_string(),
        };
        let response = reqwest::Client::new()
            .post(format!("http://{}{}", addr, PACK_GENERATED_PATH))
            .json(&message)
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(*delivered.lock(), 1);
        receiver.dispose();
    }

    #[tokio::test]
    async fn test_dispose_is_non_blocking_and_stops_delivery() {
        let dir = tempdir().unwrap();
        let receiver = make_receiver(dir.path());
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        receiver.subscribe(Arc::new(move |_: &ReceiverEvent| {
            *sink.lock() += 1;
            Ok(())
        }));
        let addr = receiver.initialize().await.unwrap();

        let started = std::time::Instant::now();
        receiver.dispose();
        assert!(started.elapsed() < Duration::from_millis(100));
        // Teardown progress comes from the background task only
        assert_eq!(receiver.state(), ReceiverState::Listening);
        receiver.dispose();

        tokio::task::yield_now().await;
        assert!(matches!(
            receiver.state(),
            ReceiverState::ShuttingDown | ReceiverState::Stopped
        ));

        // Either refused or rejected; never delivered
        let _ = reqwest::Client::new()
            .post(format!("http://{}{}", addr, TRACK_PLAYED_PATH))
            .json(&make_track())
            .send()
            .await;
        assert_eq!(*seen.lock(), 0);

        for _ in 0..100 {
            if receiver.state() == ReceiverState::Stopped {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(receiver.state(), ReceiverState::Stopped);

        // No way back to listening
        assert!(receiver.initialize().await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_calls() {
        let dir = tempdir().unwrap();
        let receiver = make_receiver(dir.path());
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        receiver.subscribe(Arc::new(move |_: &ReceiverEvent| {
            *sink.lock() += 1;
            Ok(())
        }));
        let addr = receiver.initialize().await.unwrap();

        let client = reqwest::Client::new();
        let calls = (0..16).map(|_| {
            client
                .post(format!("http://{}{}", addr, TRACK_PLAYED_PATH))
                .json(&make_track())
                .send()
        });
        for response in join_all(calls).await {
            assert!(response.unwrap().status().is_success());
        }
        assert_eq!(*seen.lock(), 16);
        receiver.dispose();
    }

    /// Await a batch of futures concurrently
    async fn join_all<F>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handles: Vec<_> = futures.map(tokio::spawn).collect();
        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            outputs.push(handle.await.unwrap());
        }
        outputs
    }
}
