//! Eye aspect ratio and the displacement-to-velocity transform.

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

/// Six eye landmarks: outer corner, two upper lid points, inner corner,
/// two lower lid points.
pub type EyeRegion<'a> = &'a [Point; 6];

/// `(|P1-P5| + |P2-P4|) / (2 |P0-P3|)`
pub fn ear(eye: EyeRegion<'_>) -> Result<f64, EngineError> {
    let h = eye[0].distance(&eye[3]);
    if h == 0.0 {
        return Err(EngineError::Geometry);
    }
    let v1 = eye[1].distance(&eye[5]);
    let v2 = eye[2].distance(&eye[4]);
    Ok((v1 + v2) / (2.0 * h))
}

/// Sub-pixel jitter becomes a unit step, larger moves grow as `|d|^1.5`.
/// Exactly 0 and exactly ±1 map to 0.
pub fn dampen(delta: f64) -> f64 {
    if delta > 1.0 {
        delta.powf(1.5)
    } else if delta < -1.0 {
        -delta.abs().powf(1.5)
    } else if delta > 0.0 && delta < 1.0 {
        1.0
    } else if delta < 0.0 && delta > -1.0 {
        -1.0
    } else {
        0.0
    }
}
