use chrono::{DateTime, Utc};
use std::f64::consts::TAU;
use std::time::Duration;

use crate::sample::{seconds_between, FieldOrder, HeadingUnits, PositionSample};

/// Append-only time series for one channel.
#[derive(Debug, Clone, Default)]
pub struct Track {
    samples: Vec<PositionSample>,
    field_order: FieldOrder,
    interval_estimate: Option<f64>,
}

impl Track {
    pub fn new(field_order: FieldOrder) -> Self {
        Self {
            samples: Vec::new(),
            field_order,
            interval_estimate: None,
        }
    }

    pub fn from_samples(samples: Vec<PositionSample>, field_order: FieldOrder) -> Self {
        let mut track = Track::new(field_order);
        for sample in samples {
            track.push(sample);
        }
        track
    }

    /// Appends a sample. The interval estimate is taken from the first two
    /// samples and never revised.
    pub fn push(&mut self, sample: PositionSample) {
        self.samples.push(sample);
        if self.samples.len() == 2 {
            self.interval_estimate =
                seconds_between(self.samples[1].timestamp, self.samples[0].timestamp)
                    .map(f64::abs);
        }
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[PositionSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn field_order(&self) -> &FieldOrder {
        &self.field_order
    }

    /// Seconds between the first two samples.
    pub fn interval_estimate(&self) -> Option<f64> {
        self.interval_estimate
    }

    pub fn get(&self, index: usize) -> Option<&PositionSample> {
        self.samples.get(index)
    }

    pub fn last(&self) -> Option<&PositionSample> {
        self.samples.last()
    }

    /// Index of the first sample, in insertion order, that lies strictly
    /// within one interval estimate of `query`. This is the first match inside
    /// the tolerance window, not the closest sample.
    pub fn find_nearest_index(&self, query: DateTime<Utc>) -> Option<usize> {
        let tolerance = self.interval_estimate?;
        self.samples.iter().position(|sample| {
            seconds_between(sample.timestamp, query)
                .map(|delta| delta.abs() < tolerance)
                .unwrap_or(false)
        })
    }

    /// Position at `query`, linearly interpolated between the first pair of
    /// consecutive samples that brackets it. Pairs further apart than
    /// `max_gap` are not interpolated across.
    pub fn interpolate(
        &self,
        query: DateTime<Utc>,
        max_gap: Duration,
        units: HeadingUnits,
    ) -> Option<PositionSample> {
        if let Some(exact) = self.samples.iter().find(|s| s.timestamp == query) {
            return Some(exact.clone());
        }

        let heading_index = self.field_order.heading_index();
        self.samples.windows(2).find_map(|pair| {
            let (before, after) = (&pair[0], &pair[1]);
            if !(before.timestamp < query && query < after.timestamp) {
                return None;
            }
            let span = seconds_between(after.timestamp, before.timestamp)?;
            if span > max_gap.as_secs_f64() {
                return None;
            }
            let weight = seconds_between(query, before.timestamp)? / span;

            let aux = before
                .aux
                .iter()
                .zip(&after.aux)
                .enumerate()
                .map(|(i, (&a, &b))| {
                    if Some(i) == heading_index {
                        lerp_angle(a, b, weight, units)
                    } else {
                        lerp(a, b, weight)
                    }
                })
                .collect();

            Some(
                PositionSample::new(
                    query,
                    lerp(before.lon, after.lon, weight),
                    lerp(before.lat, after.lat, weight),
                )
                .with_aux(aux),
            )
        })
    }
}

fn lerp(a: f64, b: f64, weight: f64) -> f64 {
    a + (b - a) * weight
}

// Takes the short way round, so 350 -> 10 passes through 0 rather than 180.
fn lerp_angle(a: f64, b: f64, weight: f64, units: HeadingUnits) -> f64 {
    let full = match units {
        HeadingUnits::Degrees => 360.0,
        HeadingUnits::Radians => TAU,
    };
    let half = full / 2.0;
    let delta = (b - a + half).rem_euclid(full) - half;
    (a + delta * weight).rem_euclid(full)
}
