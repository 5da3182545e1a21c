use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use super::error::HistoryError;
use crate::playback::Track;
use crate::sample::{FieldOrder, PositionSample};

/// One track document as served by the history endpoint. `times` and
/// `coords` are split into line segments; both have the same shape.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackDocument {
    #[serde(default)]
    pub vehicle: Option<String>,
    pub coords_array_order: Vec<String>,
    #[serde(default)]
    pub times: Vec<Vec<String>>,
    #[serde(default)]
    pub coords: Vec<Vec<Vec<f64>>>,
}

/// A loaded history, flattened across documents and segments.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub vehicle: Option<String>,
    pub samples: Vec<PositionSample>,
    pub field_order: FieldOrder,
}

impl History {
    pub fn from_json(content: &str) -> Result<Self, HistoryError> {
        let documents: Vec<TrackDocument> = serde_json::from_str(content)?;
        History::from_documents(&documents)
    }

    pub fn from_documents(documents: &[TrackDocument]) -> Result<Self, HistoryError> {
        let Some(first) = documents.first() else {
            return Ok(History::default());
        };

        let layout = &first.coords_array_order;
        let slot = |name: &str| {
            layout.iter().position(|n| n == name).ok_or_else(|| {
                HistoryError::Malformed(format!("coords_array_order lacks {}", name))
            })
        };
        let lon_slot = slot("lon")?;
        let lat_slot = slot("lat")?;
        let field_order = FieldOrder::from_coords_order(layout);
        let aux_slots = field_order
            .iter()
            .map(|name| slot(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut samples = Vec::new();
        for (doc_index, document) in documents.iter().enumerate() {
            if document.coords_array_order != *layout {
                return Err(HistoryError::Malformed(format!(
                    "document {} has a different coords_array_order",
                    doc_index
                )));
            }
            if document.times.len() != document.coords.len() {
                return Err(HistoryError::Malformed(format!(
                    "document {}: {} time segments but {} coordinate segments",
                    doc_index,
                    document.times.len(),
                    document.coords.len()
                )));
            }

            for (times, coords) in document.times.iter().zip(&document.coords) {
                if times.len() != coords.len() {
                    return Err(HistoryError::Malformed(format!(
                        "document {}: segment with {} times and {} coordinates",
                        doc_index,
                        times.len(),
                        coords.len()
                    )));
                }

                for (time, row) in times.iter().zip(coords) {
                    if row.len() != layout.len() {
                        return Err(HistoryError::Malformed(format!(
                            "coordinate row of length {}, expected {}",
                            row.len(),
                            layout.len()
                        )));
                    }
                    let timestamp = parse_time(time)?;
                    let sample = PositionSample::new(timestamp, row[lon_slot], row[lat_slot])
                        .with_aux(aux_slots.iter().map(|&i| row[i]).collect());
                    if !sample.has_valid_position() {
                        return Err(HistoryError::Malformed(format!(
                            "position out of range at {}",
                            time
                        )));
                    }
                    samples.push(sample);
                }
            }
        }

        Ok(History {
            vehicle: first.vehicle.clone(),
            samples,
            field_order,
        })
    }

    pub fn into_track(self) -> Track {
        Track::from_samples(self.samples, self.field_order)
    }
}

// RFC3339 first; timestamps without an offset are taken as UTC.
fn parse_time(raw: &str) -> Result<DateTime<Utc>, HistoryError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| HistoryError::Malformed(format!("bad time {}: {}", raw, e)))
}
