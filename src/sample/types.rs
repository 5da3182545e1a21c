use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One observation of a tracked entity. `aux` holds one value per entry of the
/// owning channel's [`FieldOrder`], in that order.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PositionSample {
    pub timestamp: DateTime<Utc>,
    pub lon: f64,
    pub lat: f64,
    pub aux: Vec<f64>,
}

impl PositionSample {
    pub fn new(timestamp: DateTime<Utc>, lon: f64, lat: f64) -> Self {
        Self {
            timestamp,
            lon,
            lat,
            aux: Vec::new(),
        }
    }

    pub fn with_aux(mut self, aux: Vec<f64>) -> Self {
        self.aux = aux;
        self
    }

    pub fn has_valid_position(&self) -> bool {
        (-180.0..=180.0).contains(&self.lon) && (-90.0..=90.0).contains(&self.lat)
    }

    /// Heading in radians, if the field order declares one.
    pub fn heading(&self, order: &FieldOrder, units: HeadingUnits) -> Option<f64> {
        let value = *self.aux.get(order.heading_index()?)?;
        Some(match units {
            HeadingUnits::Degrees => value.to_radians(),
            HeadingUnits::Radians => value,
        })
    }
}

/// Names of the auxiliary coordinate slots that follow the (lon, lat) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldOrder(Vec<String>);

impl FieldOrder {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldOrder(names.into_iter().map(Into::into).collect())
    }

    /// Builds a field order from a full coordinate layout such as
    /// `["lon", "lat", "heading"]`, dropping the base pair.
    pub fn from_coords_order(order: &[String]) -> Self {
        FieldOrder(
            order
                .iter()
                .filter(|name| !matches!(name.as_str(), "lon" | "lat"))
                .cloned()
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn heading_index(&self) -> Option<usize> {
        self.0
            .iter()
            .position(|n| n == "heading")
            .or_else(|| self.0.iter().position(|n| n == "yaw"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingUnits {
    #[default]
    Degrees,
    Radians,
}

/// Signed seconds from `earlier` to `later`; `None` if the span does not fit.
pub fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> Option<f64> {
    later
        .signed_duration_since(earlier)
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
}
