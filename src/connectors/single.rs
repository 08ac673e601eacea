//! Single-state connector
//!
//! Polls one byte once per second (on change only) and reports it directly as
//! the current track number. A zero byte means no track and is ignored.

use std::time::Duration;
use tracing::debug;

use super::{
    AddressFormat, AddressMapping, Connector, MemoryDomain, MemoryPollDescriptor, MemoryRead,
    PollCondition, TrackChangedCallback, TrackEvents,
};

pub const ALTTP: &str = "alttp";
pub const SUPER_METROID: &str = "sm";

const ALTTP_TRACK_ADDRESS: u32 = 0x7E0130;
const SUPER_METROID_TRACK_ADDRESS: u32 = 0x7E0332;

/// Connector for games with a single music-track cell
pub struct SingleStateConnector {
    game_id: String,
    address: u32,
    mapping: AddressMapping,
    events: TrackEvents,
}

impl SingleStateConnector {
    pub fn new(game_id: impl Into<String>, address: u32, mapping: AddressMapping) -> Self {
        Self {
            game_id: game_id.into(),
            address,
            mapping,
            events: TrackEvents::default(),
        }
    }

    /// A Link to the Past
    pub fn alttp() -> Self {
        Self::new(ALTTP, ALTTP_TRACK_ADDRESS, AddressMapping::LoRom)
    }

    /// Super Metroid
    pub fn super_metroid() -> Self {
        Self::new(SUPER_METROID, SUPER_METROID_TRACK_ADDRESS, AddressMapping::LoRom)
    }
}

impl Connector for SingleStateConnector {
    fn game_id(&self) -> &str {
        &self.game_id
    }

    fn memory_requests(&self) -> Vec<MemoryPollDescriptor> {
        let events = self.events.clone();
        let game_id = self.game_id.clone();

        vec![MemoryPollDescriptor {
            read: MemoryRead {
                address: self.address,
                length: 1,
                domain: MemoryDomain::Wram,
                mapping: self.mapping,
                format: AddressFormat::Snes9x,
            },
            frequency: Some(Duration::from_secs(1)),
            respond_on_change_only: true,
            condition: PollCondition::Always,
            on_response: std::sync::Arc::new(move |current: &[u8], _previous: Option<&[u8]>| {
                let Some(&byte) = current.first() else {
                    return;
                };
                if byte == 0 {
                    return;
                }
                debug!(game = %game_id, track = byte, "track cell changed");
                events.emit(i32::from(byte));
            }),
        }]
    }

    fn subscribe_track_changed(&self, callback: TrackChangedCallback) {
        self.events.subscribe(callback);
    }
}
