//! Fire-and-forget notification sender
//!
//! Resolves the receiver through an [`EndpointResolver`] on every send and
//! reuses one HTTP client per resolved address. A missing receiver or a
//! failed call is logged and dropped; callers never see an error.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::resolver::EndpointResolver;
use super::{PackGenerated, TrackLookup, TrackPlayed, PACK_GENERATED_PATH, TRACK_PLAYED_PATH};
use crate::connectors::{Connector, TrackChangeEvent};

/// Default per-call timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

struct BoundClient {
    address: String,
    client: reqwest::Client,
}

/// Publishes track and pack notifications to the active receiver
pub struct NotificationSender {
    resolver: Arc<dyn EndpointResolver>,
    bound: Mutex<Option<BoundClient>>,
    request_timeout: Duration,
    clients_built: AtomicUsize,
}

impl NotificationSender {
    pub fn new(resolver: Arc<dyn EndpointResolver>) -> Self {
        Self::with_timeout(resolver, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(resolver: Arc<dyn EndpointResolver>, request_timeout: Duration) -> Self {
        Self {
            resolver,
            bound: Mutex::new(None),
            request_timeout,
            clients_built: AtomicUsize::new(0),
        }
    }

    /// Number of HTTP clients constructed so far
    pub fn clients_built(&self) -> usize {
        self.clients_built.load(Ordering::Relaxed)
    }

    /// Announce a played track. Completes once the call succeeded or was
    /// dropped.
    pub async fn track_played(&self, message: &TrackPlayed) {
        self.send(TRACK_PLAYED_PATH, message).await;
    }

    /// Announce a generated pack. Completes once the call succeeded or was
    /// dropped.
    pub async fn pack_generated(&self, message: &PackGenerated) {
        self.send(PACK_GENERATED_PATH, message).await;
    }

    /// Send in the background without waiting
    pub fn spawn_track_played(self: &Arc<Self>, message: TrackPlayed) -> JoinHandle<()> {
        let sender = Arc::clone(self);
        tokio::spawn(async move { sender.track_played(&message).await })
    }

    /// Send in the background without waiting
    pub fn spawn_pack_generated(self: &Arc<Self>, message: PackGenerated) -> JoinHandle<()> {
        let sender = Arc::clone(self);
        tokio::spawn(async move { sender.pack_generated(&message).await })
    }

    /// Forward a connector's track changes as `TrackPlayed` notifications.
    ///
    /// Connector callbacks may fire on threads outside the runtime, so the
    /// current runtime handle is captured here. Tracks the lookup does not
    /// know are skipped.
    pub fn forward_from(self: &Arc<Self>, connector: &dyn Connector, lookup: TrackLookup) {
        let sender = Arc::clone(self);
        let runtime = tokio::runtime::Handle::current();

        connector.subscribe_track_changed(Arc::new(move |event: TrackChangeEvent| {
            let Some(message) = lookup(event.track_number) else {
                trace!(track = event.track_number, "No track info, skipping notification");
                return;
            };
            let sender = Arc::clone(&sender);
            runtime.spawn(async move { sender.track_played(&message).await });
        }));
    }

    /// Resolve the receiver and return a client bound to it
    async fn client(&self) -> Option<(String, reqwest::Client)> {
        let address = self.resolver.resolve().await?;

        let mut bound = self.bound.lock().await;
        if let Some(existing) = bound.as_ref() {
            if existing.address == address {
                return Some((address, existing.client.clone()));
            }
        }

        let client = match reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to build notification client: {}", e);
                return None;
            }
        };
        self.clients_built.fetch_add(1, Ordering::Relaxed);
        debug!(address = %address, "Bound notification client");

        *bound = Some(BoundClient {
            address: address.clone(),
            client: client.clone(),
        });
        Some((address, client))
    }

    async fn send<T: Serialize + ?Sized>(&self, path: &str, body: &T) {
        let Some((address, client)) = self.client().await else {
            trace!("No active receiver, dropping {}", path);
            return;
        };

        let url = format!("{}{}", address, path);
        let result = client
            .post(&url)
            .json(body)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => trace!("Delivered {}", url),
            Err(e) => debug!("Notification to {} dropped: {}", url, e),
        }
    }
}
