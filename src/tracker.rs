//! Nose-tip tracking for relative cursor motion.

use crate::geometry::{Point, dampen};

#[derive(Debug)]
pub struct CursorTracker {
    scale: f64,
    last: Option<Point>,
}

impl CursorTracker {
    pub fn new(scale: f64) -> Self {
        Self { scale, last: None }
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// Forget the baseline; the next position is a calibration frame.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Relative move for this frame. The x axis is flipped because the
    /// camera image is mirrored relative to the screen.
    pub fn update(&mut self, p: Point) -> (i32, i32) {
        let Some(last) = self.last.replace(p) else {
            return (0, 0);
        };
        let dx = p.x - last.x;
        let dy = p.y - last.y;
        (
            (dampen(-dx) * self.scale).round() as i32,
            (dampen(dy) * self.scale).round() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_calibrates() {
        let mut t = CursorTracker::new(5.0);
        assert_eq!(t.update(Point::new(300.0, 200.0)), (0, 0));
    }

    #[test]
    fn still_head_is_still_cursor() {
        let mut t = CursorTracker::new(5.0);
        t.update(Point::new(300.0, 200.0));
        assert_eq!(t.update(Point::new(300.0, 200.0)), (0, 0));
    }

    #[test]
    fn motion_is_dampened_scaled_and_mirrored() {
        let mut t = CursorTracker::new(5.0);
        t.update(Point::new(100.0, 100.0));
        // dx = +4 -> dampen(-4) = -8, dy = +0.3 -> 1
        assert_eq!(t.update(Point::new(104.0, 100.3)), (-40, 5));
        // dx = -0.5 -> dampen(0.5) = 1, dy = -9 -> -27
        assert_eq!(t.update(Point::new(103.5, 91.3)), (5, -135));
    }

    #[test]
    fn reset_suppresses_jump_after_gap() {
        let mut t = CursorTracker::new(5.0);
        t.update(Point::new(0.0, 0.0));
        t.reset();
        assert_eq!(t.update(Point::new(500.0, 500.0)), (0, 0));
        assert_eq!(t.update(Point::new(500.0, 500.0)), (0, 0));
    }
}
