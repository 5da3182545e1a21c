use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::track::Track;
use crate::sample::{FieldOrder, PositionSample};

/// One flattened track per track id. Lookups on unknown ids come back empty
/// rather than failing; the caller draws nothing for that frame.
#[derive(Debug, Default)]
pub struct TrackIndexer {
    tracks: HashMap<String, Track>,
}

impl TrackIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_sample(&mut self, track_id: &str, sample: PositionSample) {
        self.tracks
            .entry(track_id.to_string())
            .or_insert_with(|| Track::new(FieldOrder::default()))
            .push(sample);
    }

    pub fn find_nearest_index(&self, track_id: &str, query: DateTime<Utc>) -> Option<usize> {
        self.tracks.get(track_id)?.find_nearest_index(query)
    }

    pub fn sample_at(&self, track_id: &str, index: usize) -> Option<&PositionSample> {
        self.tracks.get(track_id)?.get(index)
    }

    /// Installs a freshly loaded track, dropping whatever was there before.
    pub fn replace_track(&mut self, track_id: &str, track: Track) {
        self.tracks.insert(track_id.to_string(), track);
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.get(track_id)
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.tracks.contains_key(track_id)
    }
}
