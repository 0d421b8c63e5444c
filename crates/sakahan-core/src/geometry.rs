//! # Geometry Module
//!
//! Polygon rings submitted with a contribution.
//!
//! A contribution carries a list of polygons; each polygon is one exterior
//! ring of `[longitude, latitude]` positions, exactly as it appears inside a
//! GeoJSON `Polygon`'s `coordinates` array.

use crate::error::FieldErrors;
use crate::primitives::MIN_RING_POSITIONS;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// A `[longitude, latitude]` pair in WGS84.
pub type Position = [f64; 2];

const LONGITUDE: RangeInclusive<f64> = -180.0..=180.0;
const LATITUDE: RangeInclusive<f64> = -90.0..=90.0;

/// A simple polygon described by its closed exterior ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub ring: Vec<Position>,
}

impl Polygon {
    /// Wrap a ring without validating it.
    #[must_use]
    pub fn new(ring: Vec<Position>) -> Self {
        Self { ring }
    }

    /// Check the ring, returning a description of the first problem.
    pub fn check(&self) -> Result<(), String> {
        if self.ring.len() < MIN_RING_POSITIONS {
            return Err(format!(
                "A polygon ring needs at least {} positions, got {}.",
                MIN_RING_POSITIONS,
                self.ring.len()
            ));
        }

        for (index, [lng, lat]) in self.ring.iter().enumerate() {
            if !lng.is_finite() || !lat.is_finite() {
                return Err(format!("Position {} is not a finite coordinate.", index));
            }
            if !LONGITUDE.contains(lng) || !LATITUDE.contains(lat) {
                return Err(format!(
                    "Position {} is outside the WGS84 bounds ([{}, {}]).",
                    index, lng, lat
                ));
            }
        }

        if self.ring.first() != self.ring.last() {
            return Err("A polygon ring must be closed (first position equals last).".to_string());
        }

        let mut distinct: Vec<&Position> = Vec::with_capacity(self.ring.len());
        for position in &self.ring {
            if !distinct.contains(&position) {
                distinct.push(position);
            }
        }
        if distinct.len() < 3 {
            return Err("A polygon ring needs at least three distinct positions.".to_string());
        }

        Ok(())
    }
}

/// Validate the polygon list of a contribution under the `geom` field.
pub fn validate_polygons(polygons: &[Polygon], errors: &mut FieldErrors) {
    if polygons.is_empty() {
        errors.add("geom", "At least one polygon is required.");
        return;
    }
    for (index, polygon) in polygons.iter().enumerate() {
        if let Err(problem) = polygon.check() {
            errors.add("geom", format!("Polygon {}: {}", index, problem));
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
