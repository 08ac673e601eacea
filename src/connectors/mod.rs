//! Memory-polling connectors
//!
//! A connector decides *what* console memory to read and *how* to interpret
//! the bytes. The host (see [`scheduler::PollScheduler`]) issues the reads at
//! the declared frequency and hands responses back through each
//! descriptor's handler.
//!
//! Read failures, empty responses, and out-of-range values never surface as
//! errors; the only observable failure mode is silence.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

pub mod multi;
pub mod scheduler;
pub mod single;

pub use multi::MultiStateConnector;
pub use scheduler::PollScheduler;
pub use single::SingleStateConnector;

/// Track number announced when a session reaches its ending
pub const END_OF_SESSION_TRACK: i32 = 99;

/// Track change detected in console memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackChangeEvent {
    pub track_number: i32,
}

/// Callback invoked for every detected track change
pub type TrackChangedCallback = Arc<dyn Fn(TrackChangeEvent) + Send + Sync>;

/// Callback invoked with (current, previous) bytes for a completed read
pub type ResponseHandler = Arc<dyn Fn(&[u8], Option<&[u8]>) + Send + Sync>;

/// Memory region a read targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryDomain {
    Wram,
    Sram,
    Rom,
}

/// Cartridge address mapping used to translate addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMapping {
    LoRom,
    HiRom,
    ExHiRom,
}

/// Address notation the connector writes its addresses in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFormat {
    Snes9x,
    BizHawk,
    FxPakPro,
}

/// One memory read as understood by a [`MemorySource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRead {
    pub address: u32,
    pub length: usize,
    pub domain: MemoryDomain,
    pub mapping: AddressMapping,
    pub format: AddressFormat,
}

/// Game mode tracked by connectors for multi-game sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameState {
    #[default]
    Neither,
    GameA,
    GameB,
    Terminal,
}

/// Gate deciding whether a descriptor's read is issued on a given tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollCondition {
    Always,
    InStates(Vec<GameState>),
}

impl PollCondition {
    pub fn evaluate(&self, state: GameState) -> bool {
        match self {
            PollCondition::Always => true,
            PollCondition::InStates(states) => states.contains(&state),
        }
    }
}

/// Recurring memory read owned by the connector that created it
#[derive(Clone)]
pub struct MemoryPollDescriptor {
    pub read: MemoryRead,
    /// `None` polls as fast as the host permits
    pub frequency: Option<Duration>,
    pub respond_on_change_only: bool,
    pub condition: PollCondition,
    pub on_response: ResponseHandler,
}

impl std::fmt::Debug for MemoryPollDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPollDescriptor")
            .field("read", &self.read)
            .field("frequency", &self.frequency)
            .field("respond_on_change_only", &self.respond_on_change_only)
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}

/// External memory-access capability (emulator bridge, flash cart, ...)
#[async_trait]
pub trait MemorySource: Send + Sync {
    /// Read the requested bytes. `Ok(None)` means the device had nothing to
    /// report (disconnected, not ready).
    async fn read(&self, request: &MemoryRead) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Connector trait - every supported game implements this
///
/// All methods take &self so connectors can be shared as `Arc<dyn Connector>`
/// across poll tasks; mutable state uses interior mutability.
pub trait Connector: Send + Sync {
    /// Game identifier (e.g., "alttp", "smz3")
    fn game_id(&self) -> &str;

    /// Reads this connector wants scheduled
    fn memory_requests(&self) -> Vec<MemoryPollDescriptor>;

    /// Current game mode, consulted when evaluating poll conditions
    ///
    /// Default implementation: single-game connectors never change mode
    fn game_state(&self) -> GameState {
        GameState::Neither
    }

    /// Subscribe to track changes raised by this connector
    fn subscribe_track_changed(&self, callback: TrackChangedCallback);
}

/// Subscriber list shared between a connector and its response handlers
#[derive(Default, Clone)]
pub struct TrackEvents {
    subscribers: Arc<RwLock<Vec<TrackChangedCallback>>>,
}

impl TrackEvents {
    pub fn subscribe(&self, callback: TrackChangedCallback) {
        self.subscribers.write().push(callback);
    }

    pub fn emit(&self, track_number: i32) {
        trace!(track_number, "track changed");
        let event = TrackChangeEvent { track_number };
        // Clone the list so callbacks may subscribe without deadlocking
        let subscribers = self.subscribers.read().clone();
        for callback in subscribers {
            callback(event);
        }
    }
}

/// Game identifiers with a built-in connector
pub fn available_games() -> &'static [&'static str] {
    &[single::ALTTP, single::SUPER_METROID, multi::SMZ3]
}

/// Build the connector registered for `game_id`
pub fn connector_for(game_id: &str) -> Option<Arc<dyn Connector>> {
    match game_id {
        single::ALTTP => Some(Arc::new(SingleStateConnector::alttp())),
        single::SUPER_METROID => Some(Arc::new(SingleStateConnector::super_metroid())),
        multi::SMZ3 => Some(Arc::new(MultiStateConnector::smz3())),
        _ => None,
    }
}
