//! Multi-state connector for combined two-game sessions
//!
//! A sentinel cell tells which game is currently running:
//! - `0x00` → [`GameState::GameA`]
//! - `0xFF` → [`GameState::GameB`]
//! - `0x11` → [`GameState::Terminal`], raising the end-of-session track
//!
//! Each game's track cell is only polled while its state is active. The
//! game-B descriptor also runs while the state is still `Neither`. Once
//! `Terminal` is reached neither track descriptor runs again, so polling
//! freezes at the end of the session.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    AddressFormat, AddressMapping, Connector, GameState, MemoryDomain, MemoryPollDescriptor,
    MemoryRead, PollCondition, TrackChangedCallback, TrackEvents, END_OF_SESSION_TRACK,
};

pub const SMZ3: &str = "smz3";

const SENTINEL_GAME_A: u8 = 0x00;
const SENTINEL_GAME_B: u8 = 0xFF;
const SENTINEL_TERMINAL: u8 = 0x11;

/// Highest track number accepted from a track cell
const MAX_TRACK_NUMBER: i32 = 200;

const SMZ3_SENTINEL_ADDRESS: u32 = 0xA173FE;
const SMZ3_GAME_A_TRACK_ADDRESS: u32 = 0x7E010B;
const SMZ3_GAME_B_TRACK_ADDRESS: u32 = 0x7E0332;

/// Memory layout of a two-game session
#[derive(Debug, Clone, Copy)]
pub struct MultiStateLayout {
    pub sentinel_address: u32,
    pub game_a_track_address: u32,
    pub game_b_track_address: u32,
    pub mapping: AddressMapping,
}

/// Connector tracking which of two games is active
pub struct MultiStateConnector {
    game_id: String,
    layout: MultiStateLayout,
    state: Arc<Mutex<GameState>>,
    events: TrackEvents,
}

impl MultiStateConnector {
    pub fn new(game_id: impl Into<String>, layout: MultiStateLayout) -> Self {
        Self {
            game_id: game_id.into(),
            layout,
            state: Arc::new(Mutex::new(GameState::Neither)),
            events: TrackEvents::default(),
        }
    }

    /// Super Metroid + A Link to the Past combo randomizer
    pub fn smz3() -> Self {
        Self::new(
            SMZ3,
            MultiStateLayout {
                sentinel_address: SMZ3_SENTINEL_ADDRESS,
                game_a_track_address: SMZ3_GAME_A_TRACK_ADDRESS,
                game_b_track_address: SMZ3_GAME_B_TRACK_ADDRESS,
                mapping: AddressMapping::ExHiRom,
            },
        )
    }

    fn sentinel_descriptor(&self) -> MemoryPollDescriptor {
        let state = Arc::clone(&self.state);
        let events = self.events.clone();

        MemoryPollDescriptor {
            read: MemoryRead {
                address: self.layout.sentinel_address,
                length: 1,
                domain: MemoryDomain::Sram,
                mapping: self.layout.mapping,
                format: AddressFormat::Snes9x,
            },
            frequency: None,
            respond_on_change_only: false,
            condition: PollCondition::Always,
            on_response: Arc::new(move |current: &[u8], _previous: Option<&[u8]>| {
                let Some(&byte) = current.first() else {
                    return;
                };

                let next = match byte {
                    SENTINEL_GAME_A => GameState::GameA,
                    SENTINEL_GAME_B => GameState::GameB,
                    SENTINEL_TERMINAL => GameState::Terminal,
                    _ => return,
                };

                // Transition under the lock, emit after releasing it
                let previous = std::mem::replace(&mut *state.lock(), next);
                if previous == next {
                    return;
                }

                debug!("Game state {:?} → {:?}", previous, next);
                if next == GameState::Terminal {
                    info!("Session reached its ending");
                    events.emit(END_OF_SESSION_TRACK);
                }
            }),
        }
    }

    fn track_descriptor(&self, address: u32, condition: PollCondition) -> MemoryPollDescriptor {
        let events = self.events.clone();

        MemoryPollDescriptor {
            read: MemoryRead {
                address,
                length: 1,
                domain: MemoryDomain::Wram,
                mapping: self.layout.mapping,
                format: AddressFormat::Snes9x,
            },
            frequency: Some(Duration::from_secs(1)),
            respond_on_change_only: true,
            condition,
            on_response: Arc::new(move |current: &[u8], _previous: Option<&[u8]>| {
                let Some(&byte) = current.first() else {
                    return;
                };
                let track = i32::from(byte);
                if track <= 0 || track > MAX_TRACK_NUMBER {
                    return;
                }
                events.emit(track);
            }),
        }
    }
}

impl Connector for MultiStateConnector {
    fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Sentinel descriptor first, then the game-A and game-B track cells
    fn memory_requests(&self) -> Vec<MemoryPollDescriptor> {
        vec![
            self.sentinel_descriptor(),
            self.track_descriptor(
                self.layout.game_a_track_address,
                PollCondition::InStates(vec![GameState::GameA]),
            ),
            self.track_descriptor(
                self.layout.game_b_track_address,
                PollCondition::InStates(vec![GameState::GameB, GameState::Neither]),
            ),
        ]
    }

    fn game_state(&self) -> GameState {
        *self.state.lock()
    }

    fn subscribe_track_changed(&self, callback: TrackChangedCallback) {
        self.events.subscribe(callback);
    }
}
