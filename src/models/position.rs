// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Simulated tourist position.

use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct Coordinates {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Reject out-of-range or non-finite coordinates.
    pub fn validated(self) -> Result<Self, AppError> {
        // Range checks let NaN through
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(AppError::Validation(
                "Coordinates must be finite numbers".to_string(),
            ));
        }
        self.validate().map_err(|e| {
            AppError::Validation(format!(
                "Latitude must be within [-90, 90] and longitude within [-180, 180]: {}",
                e
            ))
        })?;
        Ok(self)
    }

    /// As a `geo` point (x = longitude, y = latitude).
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Last known position of a tourist (document ID = tourist ID).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub tourist_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        assert!(Coordinates::new(90.0, 180.0).validated().is_ok());
        assert!(Coordinates::new(-90.0, -180.0).validated().is_ok());
    }

    #[test]
    fn test_out_of_range_rejected() {
        for (lat, lon) in [(90.0001, 0.0), (-91.0, 0.0), (0.0, 180.5), (0.0, -181.0)] {
            let err = Coordinates::new(lat, lon).validated().unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "({lat}, {lon})");
        }
    }

    #[test]
    fn test_nan_rejected() {
        assert!(Coordinates::new(f64::NAN, 0.0).validated().is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).validated().is_err());
    }
}
