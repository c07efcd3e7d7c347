//! Tracker side of the pipeline: zones in, record batches out.

use anyhow::Result;

use crate::classify::classify_frame;
use crate::client::{ChannelClient, ConnectionState};
use crate::geometry::Point;
use crate::protocol::TrackerRecord;
use crate::zone::ZoneStore;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutcome {
    pub records: Vec<TrackerRecord>,
    /// False when the client was not connected and the frame was skipped.
    pub sent: bool,
}

pub struct TrackerEmitter {
    store: ZoneStore,
    client: ChannelClient,
}

impl TrackerEmitter {
    pub fn new(store: ZoneStore, client: ChannelClient) -> Self {
        Self { store, client }
    }

    /// Classify one frame of detections and send the whole batch.
    ///
    /// Frames are never queued: a frame produced while disconnected is lost
    /// and the next connected frame carries the current state.
    pub fn process_frame(&self, points: &[Point]) -> FrameOutcome {
        let records = classify_frame(points, &self.store);
        let sent = self.client.send_frame(&records);
        if !sent {
            log::debug!(
                "frame with {} record(s) skipped while {:?}",
                records.len(),
                self.client.state()
            );
        }
        FrameOutcome { records, sent }
    }

    pub fn store(&self) -> &ZoneStore {
        &self.store
    }

    pub fn client(&self) -> &ChannelClient {
        &self.client
    }

    pub fn is_connected(&self) -> bool {
        self.client.state() == ConnectionState::Connected
    }

    pub fn stop(self) -> Result<()> {
        self.client.stop()
    }
}
