//! Host-side polling loop
//!
//! Spawns one task per descriptor. Each tick evaluates the descriptor's
//! condition against the connector's current game state, issues the read,
//! applies change detection, and hands the bytes to the descriptor's
//! handler. Read failures are logged and otherwise ignored, so a device that
//! disconnects and reconnects between polls only produces silence.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{Connector, MemoryPollDescriptor, MemorySource};

/// Tick used for descriptors that ask to be polled as fast as possible
pub const FASTEST_POLL: Duration = Duration::from_millis(50);

/// Running set of poll tasks for one connector
pub struct PollScheduler {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PollScheduler {
    /// Start polling every descriptor the connector requests
    pub fn start(connector: Arc<dyn Connector>, source: Arc<dyn MemorySource>) -> Self {
        let token = CancellationToken::new();
        let requests = connector.memory_requests();
        info!(
            "Polling {} memory regions for {}",
            requests.len(),
            connector.game_id()
        );

        let tasks = requests
            .into_iter()
            .map(|descriptor| {
                tokio::spawn(poll_loop(
                    Arc::clone(&connector),
                    Arc::clone(&source),
                    descriptor,
                    token.clone(),
                ))
            })
            .collect();

        Self { token, tasks }
    }

    /// Cancel all poll tasks and wait for them to finish
    pub async fn stop(self) {
        self.token.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        debug!("Poll scheduler stopped");
    }
}

async fn poll_loop(
    connector: Arc<dyn Connector>,
    source: Arc<dyn MemorySource>,
    descriptor: MemoryPollDescriptor,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(descriptor.frequency.unwrap_or(FASTEST_POLL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut previous: Option<Vec<u8>> = None;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !descriptor.condition.evaluate(connector.game_state()) {
            continue;
        }

        let bytes = match source.read(&descriptor.read).await {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => continue,
            Err(e) => {
                debug!(address = descriptor.read.address, "Memory read failed: {}", e);
                continue;
            }
        };

        if descriptor.respond_on_change_only && previous.as_deref() == Some(bytes.as_slice()) {
            continue;
        }

        trace!(
            address = descriptor.read.address,
            bytes = %hex::encode(&bytes),
            "memory response"
        );
        let prior = previous.replace(bytes);
        if let Some(current) = previous.as_deref() {
            (descriptor.on_response)(current, prior.as_deref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{
        GameState, MemoryRead, MultiStateConnector, SingleStateConnector, TrackChangeEvent,
        END_OF_SESSION_TRACK,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Memory backed by a map of address → byte, with a read log
    #[derive(Default)]
    struct FakeMemory {
        cells: Mutex<HashMap<u32, u8>>,
        reads: Mutex<Vec<u32>>,
        offline: Mutex<bool>,
    }

    impl FakeMemory {
        fn set(&self, address: u32, value: u8) {
            self.cells.lock().insert(address, value);
        }
    }

    #[async_trait]
    impl MemorySource for FakeMemory {
        async fn read(&self, request: &MemoryRead) -> anyhow::Result<Option<Vec<u8>>> {
            self.reads.lock().push(request.address);
            if *self.offline.lock() {
                anyhow::bail!("device disconnected");
            }
            Ok(self.cells.lock().get(&request.address).map(|b| vec![*b]))
        }
    }

    fn capture(connector: &dyn Connector) -> Arc<Mutex<Vec<i32>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        connector.subscribe_track_changed(Arc::new(move |e: TrackChangeEvent| {
            sink.lock().push(e.track_number)
        }));
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_only_polling() {
        let connector = Arc::new(SingleStateConnector::alttp());
        let seen = capture(connector.as_ref());
        let memory = Arc::new(FakeMemory::default());
        let address = connector.memory_requests()[0].read.address;
        memory.set(address, 3);

        let scheduler = PollScheduler::start(connector.clone(), memory.clone());
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(*seen.lock(), vec![3]);

        memory.set(address, 9);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*seen.lock(), vec![3, 9]);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failures_are_silent() {
        let connector = Arc::new(SingleStateConnector::super_metroid());
        let seen = capture(connector.as_ref());
        let memory = Arc::new(FakeMemory::default());
        *memory.offline.lock() = true;

        let scheduler = PollScheduler::start(connector.clone(), memory.clone());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(seen.lock().is_empty());
        assert!(!memory.reads.lock().is_empty());

        // Reconnect and observe the current value
        memory.set(connector.memory_requests()[0].read.address, 4);
        *memory.offline.lock() = false;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*seen.lock(), vec![4]);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_conditions_gate_reads() {
        let connector = Arc::new(MultiStateConnector::smz3());
        let seen = capture(connector.as_ref());
        let requests = connector.memory_requests();
        let sentinel = requests[0].read.address;
        let game_a = requests[1].read.address;
        let game_b = requests[2].read.address;

        let memory = Arc::new(FakeMemory::default());
        memory.set(sentinel, 0x00);
        memory.set(game_a, 12);
        memory.set(game_b, 30);

        let scheduler = PollScheduler::start(connector.clone(), memory.clone());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(connector.game_state(), GameState::GameA);
        assert!(seen.lock().contains(&12));

        memory.set(sentinel, 0x11);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(connector.game_state(), GameState::Terminal);
        assert_eq!(seen.lock().last(), Some(&END_OF_SESSION_TRACK));

        // Frozen: track cells are no longer read
        let reads_before = memory.reads.lock().iter().filter(|a| **a != sentinel).count();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let reads_after = memory.reads.lock().iter().filter(|a| **a != sentinel).count();
        assert_eq!(reads_before, reads_after);

        scheduler.stop().await;
    }
}
