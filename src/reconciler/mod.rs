#[allow(clippy::module_inception)]
mod reconciler;
mod sink;
mod tasks;

pub use reconciler::{
    ChannelStatus, Ingest, PlaybackFrame, Reconciler, ReconcilerSettings, TrackSummary,
};
pub use sink::{BroadcastSink, RenderEvent};
pub use tasks::{load_history, spawn_sweeper};
