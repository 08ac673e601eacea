//! Cross-process notification channel
//!
//! The receiver hosts a loopback HTTP endpoint and publishes its address in
//! a discovery record; senders resolve that record and post JSON messages to
//! it. Delivery is at-most-once and best-effort: nothing is queued, retried,
//! or acknowledged beyond the single call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod receiver;
pub mod resolver;
pub mod sender;

pub use receiver::{NotificationReceiver, ReceiverState};
pub use resolver::{DiscoveryFile, EndpointResolver};
pub use sender::NotificationSender;

/// RPC route for [`TrackPlayed`]
pub const TRACK_PLAYED_PATH: &str = "/rpc/track-played";
/// RPC route for [`PackGenerated`]
pub const PACK_GENERATED_PATH: &str = "/rpc/pack-generated";
/// Liveness route
pub const HEALTH_PATH: &str = "/health";

/// A track started playing in the producer process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPlayed {
    pub track_name: String,
    pub track_number: i32,
    pub song_name: String,
    #[serde(default)]
    pub album_name: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub pack_name: String,
    #[serde(default)]
    pub pack_creator: Option<String>,
}

/// A pack was generated and written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackGenerated {
    pub pack_name: String,
    #[serde(default)]
    pub pack_creator: Option<String>,
    pub pack_path: String,
    pub pack_type_name: String,
}

/// Acknowledgement returned by every RPC call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

/// Local event republished by the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    TrackChanged(TrackPlayed),
    MsuGenerated(PackGenerated),
}

/// In-process subscriber for receiver events
///
/// Errors and panics are caught and logged by the receiver.
pub type ReceiverCallback = Arc<dyn Fn(&ReceiverEvent) -> anyhow::Result<()> + Send + Sync>;

/// Maps a connector track number to the message announcing it
pub type TrackLookup = Arc<dyn Fn(i32) -> Option<TrackPlayed> + Send + Sync>;
