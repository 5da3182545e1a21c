use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::error::SampleError;
use super::types::{FieldOrder, PositionSample};

/// A position event as published by the live transport. Anything besides
/// `timestamp`, `lon` and `lat` lands in `fields` and must be declared by the
/// channel's field order.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionEvent {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl PositionEvent {
    pub fn from_json(payload: &str) -> Result<Self, SampleError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn validate(&self, order: &FieldOrder) -> Result<PositionSample, SampleError> {
        let raw = self
            .timestamp
            .as_deref()
            .ok_or(SampleError::MissingTimestamp)?;
        let timestamp = DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| SampleError::InvalidTimestamp(format!("{}: {}", raw, e)))?;

        let (lon, lat) = match (self.lon, self.lat) {
            (Some(lon), Some(lat)) => (lon, lat),
            _ => return Err(SampleError::MissingCoordinates),
        };
        let sample = PositionSample::new(timestamp, lon, lat);
        if !sample.has_valid_position() {
            return Err(SampleError::InvalidCoordinates { lon, lat });
        }

        if let Some(name) = self.fields.keys().find(|name| !order.contains(name)) {
            return Err(SampleError::UndeclaredField(name.clone()));
        }

        let aux = order
            .iter()
            .map(|name| {
                let value = self
                    .fields
                    .get(name)
                    .ok_or_else(|| SampleError::MissingField(name.to_string()))?;
                value
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| SampleError::InvalidField(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sample.with_aux(aux))
    }
}
