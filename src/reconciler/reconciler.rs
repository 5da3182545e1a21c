use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use utoipa::ToSchema;

use super::sink::RenderSink;
use crate::history::History;
use crate::live::{Channel, ChannelStore};
use crate::playback::{Track, TrackIndexer};
use crate::sample::{FieldOrder, HeadingUnits, PositionEvent, PositionSample, SampleError};

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub stale_timeout: Duration,
    /// Field order for channels that have no loaded track.
    pub default_field_order: FieldOrder,
    pub heading_units: HeadingUnits,
    pub interpolate_max_gap: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            stale_timeout: Duration::from_secs(10),
            default_field_order: FieldOrder::default(),
            heading_units: HeadingUnits::Degrees,
            interpolate_max_gap: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub enum Ingest {
    Dropped(SampleError),
    Recorded {
        first_seen: bool,
        track_extended: bool,
        connected: bool,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChannelStatus {
    pub id: String,
    pub last_sample: Option<PositionSample>,
    pub last_received_at: Option<DateTime<Utc>>,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrackSummary {
    pub id: String,
    pub samples: usize,
    pub field_order: FieldOrder,
    pub interval_estimate_seconds: Option<f64>,
    pub first: Option<PositionSample>,
    pub last: Option<PositionSample>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlaybackFrame {
    pub index: usize,
    pub sample: PositionSample,
    /// Radians.
    pub heading: Option<f64>,
}

/// Merges live samples and loaded histories into channel and track state and
/// reports each change to the sink.
pub struct Reconciler<S> {
    channels: ChannelStore,
    tracks: TrackIndexer,
    reported: HashMap<String, bool>,
    settings: ReconcilerSettings,
    sink: S,
}

impl<S: RenderSink> Reconciler<S> {
    pub fn new(settings: ReconcilerSettings, sink: S) -> Self {
        Self {
            channels: ChannelStore::new(),
            tracks: TrackIndexer::new(),
            reported: HashMap::new(),
            settings,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Validates and records one live position. Malformed payloads leave all
    /// state untouched.
    pub fn on_position_event(
        &mut self,
        channel_id: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Ingest {
        let order = self
            .tracks
            .track(channel_id)
            .map(|track| track.field_order())
            .unwrap_or(&self.settings.default_field_order);

        let sample = match PositionEvent::from_json(payload).and_then(|e| e.validate(order)) {
            Ok(sample) => sample,
            Err(e) => {
                log::debug!("Dropping position for {}: {}", channel_id, e);
                return Ingest::Dropped(e);
            }
        };

        self.record(channel_id, sample, now)
    }

    fn record(&mut self, channel_id: &str, sample: PositionSample, now: DateTime<Utc>) -> Ingest {
        let first_seen = !self.channels.contains(channel_id);
        self.channels.record_sample(channel_id, sample.clone(), now);

        let track_extended = self.tracks.contains(channel_id);
        if track_extended {
            self.tracks.append_sample(channel_id, sample.clone());
            self.sink.on_track_extended(channel_id, &sample);
        }

        let connected = !self
            .channels
            .is_stale(channel_id, now, self.settings.stale_timeout);
        self.reported.insert(channel_id.to_string(), connected);
        self.sink.on_channel_updated(channel_id, &sample, connected);

        if first_seen {
            log::info!("New channel {}", channel_id);
        }

        Ingest::Recorded {
            first_seen,
            track_extended,
            connected,
        }
    }

    /// Installs a loaded history as the channel's track. Whichever load
    /// completes last wins. Returns the number of samples installed.
    pub fn apply_history(&mut self, track_id: &str, history: History) -> usize {
        self.channels.ensure_channel(track_id);
        let track = history.into_track();
        let count = track.len();
        if track.is_empty() {
            log::warn!("History for track {} has no samples", track_id);
        }
        self.tracks.replace_track(track_id, track);
        log::info!("Loaded {} samples for track {}", count, track_id);
        count
    }

    /// Recomputes connectivity for every channel and reports the ones that
    /// changed since their last report. Returns the number of changes.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        if self.channels.is_empty() {
            return 0;
        }
        let timeout = self.settings.stale_timeout;
        let mut changes = Vec::new();
        self.channels.for_each_channel(|channel| {
            let Some(sample) = &channel.last_sample else {
                return;
            };
            let connected = !channel.is_stale(now, timeout);
            if self.reported.get(&channel.id) != Some(&connected) {
                changes.push((channel.id.clone(), sample.clone(), connected));
            }
        });

        for (channel_id, sample, connected) in &changes {
            if !connected {
                log::info!("Channel {} went stale", channel_id);
            }
            self.reported.insert(channel_id.clone(), *connected);
            self.sink.on_channel_updated(channel_id, sample, *connected);
        }
        changes.len()
    }

    pub fn scrub(&self, track_id: &str, time: DateTime<Utc>) -> Option<PlaybackFrame> {
        let track = self.tracks.track(track_id)?;
        let index = self.tracks.find_nearest_index(track_id, time)?;
        let sample = self.tracks.sample_at(track_id, index)?.clone();
        let heading = sample.heading(track.field_order(), self.settings.heading_units);
        Some(PlaybackFrame {
            index,
            sample,
            heading,
        })
    }

    pub fn interpolate(&self, track_id: &str, time: DateTime<Utc>) -> Option<PositionSample> {
        self.tracks.track(track_id)?.interpolate(
            time,
            self.settings.interpolate_max_gap,
            self.settings.heading_units,
        )
    }

    pub fn sample_at(&self, track_id: &str, index: usize) -> Option<&PositionSample> {
        self.tracks.sample_at(track_id, index)
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.track(track_id)
    }

    pub fn track_summary(&self, track_id: &str) -> Option<TrackSummary> {
        let track = self.tracks.track(track_id)?;
        Some(TrackSummary {
            id: track_id.to_string(),
            samples: track.len(),
            field_order: track.field_order().clone(),
            interval_estimate_seconds: track.interval_estimate(),
            first: track.get(0).cloned(),
            last: track.last().cloned(),
        })
    }

    pub fn channel(&self, channel_id: &str, now: DateTime<Utc>) -> Option<ChannelStatus> {
        self.channels
            .get(channel_id)
            .map(|channel| self.status(channel, now))
    }

    /// Every known channel, in the order first seen.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<ChannelStatus> {
        let mut statuses = Vec::with_capacity(self.channels.len());
        self.channels
            .for_each_channel(|channel| statuses.push(self.status(channel, now)));
        statuses
    }

    fn status(&self, channel: &Channel, now: DateTime<Utc>) -> ChannelStatus {
        ChannelStatus {
            id: channel.id.clone(),
            last_sample: channel.last_sample.clone(),
            last_received_at: channel.last_received_at,
            connected: !channel.is_stale(now, self.settings.stale_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::sink::{BroadcastSink, RenderEvent};
    use tokio::sync::broadcast::Receiver;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn payload(secs: i64, lon: f64) -> String {
        format!(
            r#"{{"timestamp": "{}", "lon": {}, "lat": 37.0}}"#,
            at(secs).to_rfc3339(),
            lon
        )
    }

    fn reconciler() -> (Reconciler<BroadcastSink>, Receiver<RenderEvent>) {
        let settings = ReconcilerSettings {
            stale_timeout: Duration::from_secs(5),
            ..ReconcilerSettings::default()
        };
        let sink = BroadcastSink::new(64);
        let rx = sink.subscribe();
        (Reconciler::new(settings, sink), rx)
    }

    fn drain(rx: &mut Receiver<RenderEvent>) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn history(stamps: &[i64], field_order: FieldOrder) -> History {
        let aux = vec![0.0; field_order.len()];
        History {
            vehicle: None,
            samples: stamps
                .iter()
                .map(|&s| PositionSample::new(at(s), -122.0, 37.0).with_aux(aux.clone()))
                .collect(),
            field_order,
        }
    }

    #[test]
    fn live_sample_updates_channel_and_notifies() {
        let (mut reconciler, mut rx) = reconciler();

        let ingest = reconciler.on_position_event("rover1", &payload(0, -122.0), at(0));
        assert!(matches!(
            ingest,
            Ingest::Recorded {
                first_seen: true,
                track_extended: false,
                connected: true
            }
        ));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RenderEvent::ChannelUpdated { channel_id, connected: true, .. } if channel_id == "rover1"
        ));

        let ingest = reconciler.on_position_event("rover1", &payload(1, -122.1), at(1));
        assert!(matches!(ingest, Ingest::Recorded { first_seen: false, .. }));
    }

    #[test]
    fn malformed_payload_changes_nothing() {
        let (mut reconciler, mut rx) = reconciler();
        reconciler.on_position_event("rover1", &payload(0, -122.0), at(0));
        drain(&mut rx);

        let ingest = reconciler.on_position_event("rover1", r#"{"lon": 1.0}"#, at(1));
        assert!(matches!(ingest, Ingest::Dropped(SampleError::MissingTimestamp)));
        let ingest = reconciler.on_position_event("rover2", "not json", at(1));
        assert!(matches!(ingest, Ingest::Dropped(SampleError::Json(_))));

        assert!(drain(&mut rx).is_empty());
        assert!(reconciler.channel("rover2", at(1)).is_none());
        let status = reconciler.channel("rover1", at(1)).unwrap();
        assert_eq!(status.last_sample.unwrap().lon, -122.0);
    }

    #[test]
    fn live_samples_extend_loaded_track() {
        let (mut reconciler, mut rx) = reconciler();
        reconciler.apply_history("rover1", history(&[0, 10], FieldOrder::default()));

        let ingest = reconciler.on_position_event("rover1", &payload(20, -122.5), at(20));
        assert!(matches!(
            ingest,
            Ingest::Recorded {
                first_seen: false,
                track_extended: true,
                ..
            }
        ));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "track_extended");
        assert_eq!(events[1].kind(), "channel_updated");

        let track = reconciler.track("rover1").unwrap();
        assert_eq!(track.len(), 3);
        assert_eq!(track.interval_estimate(), Some(10.0));
        assert_eq!(reconciler.sample_at("rover1", 2).unwrap().lon, -122.5);
    }

    #[test]
    fn live_samples_without_track_do_not_create_one() {
        let (mut reconciler, _rx) = reconciler();
        reconciler.on_position_event("rover1", &payload(0, -122.0), at(0));
        assert!(reconciler.track("rover1").is_none());
        assert!(reconciler.scrub("rover1", at(0)).is_none());
    }

    #[test]
    fn live_samples_validate_against_track_field_order() {
        let (mut reconciler, _rx) = reconciler();
        reconciler.apply_history("rover1", history(&[0, 10], FieldOrder::new(["heading"])));

        let ingest = reconciler.on_position_event("rover1", &payload(20, -122.0), at(20));
        assert!(matches!(ingest, Ingest::Dropped(SampleError::MissingField(_))));

        let with_heading = format!(
            r#"{{"timestamp": "{}", "lon": -122.0, "lat": 37.0, "heading": 90}}"#,
            at(20).to_rfc3339()
        );
        let ingest = reconciler.on_position_event("rover1", &with_heading, at(20));
        assert!(matches!(ingest, Ingest::Recorded { track_extended: true, .. }));
    }

    #[test]
    fn history_registers_channel_as_stale() {
        let (mut reconciler, mut rx) = reconciler();
        assert_eq!(
            reconciler.apply_history("rover1", history(&[0, 10, 20], FieldOrder::default())),
            3
        );

        let status = reconciler.channel("rover1", at(20)).unwrap();
        assert!(!status.connected);
        assert!(status.last_sample.is_none());
        // A channel with nothing to draw produces no render events.
        assert_eq!(reconciler.sweep(at(30)), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn later_history_completion_overwrites_earlier() {
        let (mut reconciler, _rx) = reconciler();
        reconciler.apply_history("A", history(&[100, 101, 102], FieldOrder::default()));
        reconciler.apply_history("A", history(&[0, 10], FieldOrder::default()));

        let summary = reconciler.track_summary("A").unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.interval_estimate_seconds, Some(10.0));
        assert_eq!(summary.first.unwrap().timestamp, at(0));
    }

    #[test]
    fn empty_history_installs_an_empty_track() {
        let (mut reconciler, mut rx) = reconciler();
        assert_eq!(reconciler.sweep(at(100)), 0);

        assert_eq!(reconciler.apply_history("A", History::default()), 0);
        assert!(reconciler.track("A").unwrap().is_empty());
        assert!(reconciler.scrub("A", at(0)).is_none());
        assert_eq!(reconciler.sweep(at(100)), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn sweep_reports_transitions_once() {
        let (mut reconciler, mut rx) = reconciler();
        reconciler.on_position_event("rover1", &payload(0, -122.0), at(0));
        reconciler.on_position_event("rover2", &payload(4, -121.0), at(4));
        drain(&mut rx);

        assert_eq!(reconciler.sweep(at(4)), 0);
        assert_eq!(reconciler.sweep(at(6)), 1);
        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [RenderEvent::ChannelUpdated { channel_id, connected: false, .. }] if channel_id == "rover1"
        ));

        // Nothing changed since the last sweep.
        assert_eq!(reconciler.sweep(at(7)), 0);
        assert_eq!(reconciler.sweep(at(10)), 1);

        // A fresh sample brings the channel back.
        reconciler.on_position_event("rover1", &payload(11, -122.0), at(11));
        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(RenderEvent::ChannelUpdated { connected: true, .. })
        ));
        assert_eq!(reconciler.sweep(at(12)), 0);
    }

    #[test]
    fn scrub_reports_index_and_heading() {
        let (mut reconciler, _rx) = reconciler();
        let mut loaded = history(&[0, 10], FieldOrder::new(["heading"]));
        loaded.samples[1].aux = vec![90.0];
        reconciler.apply_history("rover1", loaded);

        let frame = reconciler.scrub("rover1", at(12)).unwrap();
        assert_eq!(frame.index, 1);
        assert!((frame.heading.unwrap() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!(reconciler.scrub("rover1", at(25)).is_none());
        assert!(reconciler.scrub("ghost", at(0)).is_none());
    }

    #[test]
    fn interpolate_uses_settings_gap() {
        let (mut reconciler, _rx) = reconciler();
        reconciler.apply_history("rover1", history(&[0, 10], FieldOrder::default()));
        assert!(reconciler.interpolate("rover1", at(5)).is_some());

        reconciler.apply_history("rover2", history(&[0, 120], FieldOrder::default()));
        assert!(reconciler.interpolate("rover2", at(60)).is_none());
    }

    #[test]
    fn snapshot_lists_channels_in_first_seen_order() {
        let (mut reconciler, _rx) = reconciler();
        reconciler.on_position_event("zulu", &payload(0, 0.0), at(0));
        reconciler.apply_history("alpha", history(&[0, 1], FieldOrder::default()));
        reconciler.on_position_event("mike", &payload(0, 0.0), at(0));

        let snapshot = reconciler.snapshot(at(3));
        let ids: Vec<&str> = snapshot.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["zulu", "alpha", "mike"]);
        assert_eq!(
            snapshot.iter().map(|s| s.connected).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }
}
