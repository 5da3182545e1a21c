use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::sample::PositionSample;

/// Receives every state change the reconciler makes. Drawing is entirely the
/// sink's business.
pub trait RenderSink {
    fn on_channel_updated(&self, channel_id: &str, sample: &PositionSample, connected: bool);
    fn on_track_extended(&self, track_id: &str, sample: &PositionSample);
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema, strum_macros::IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RenderEvent {
    ChannelUpdated {
        channel_id: String,
        sample: PositionSample,
        connected: bool,
    },
    TrackExtended {
        track_id: String,
        sample: PositionSample,
    },
}

impl RenderEvent {
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

/// Fans render events out to any number of subscribers. Events sent while
/// nobody listens are discarded.
pub struct BroadcastSink {
    tx: broadcast::Sender<RenderEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: RenderEvent) {
        // No receivers is not an error.
        let _ = self.tx.send(event);
    }
}

impl RenderSink for BroadcastSink {
    fn on_channel_updated(&self, channel_id: &str, sample: &PositionSample, connected: bool) {
        self.publish(RenderEvent::ChannelUpdated {
            channel_id: channel_id.to_string(),
            sample: sample.clone(),
            connected,
        });
    }

    fn on_track_extended(&self, track_id: &str, sample: &PositionSample) {
        self.publish(RenderEvent::TrackExtended {
            track_id: track_id.to_string(),
            sample: sample.clone(),
        });
    }
}
