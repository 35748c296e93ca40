//! 68-point landmark frames and the line-delimited JSON stream that carries them.

use anyhow::{Result, anyhow};
use log::{trace, warn};
use serde::Deserialize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use crate::error::EngineError;
use crate::geometry::Point;

pub const LANDMARK_COUNT: usize = 68;

const RIGHT_EYE: usize = 36;
const LEFT_EYE: usize = 42;
const NOSE: usize = 27;
// nose bridge is 27..31, the tip is the fourth nose point
const NOSE_TIP: usize = NOSE + 3;

/// One detected face. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    points: [Point; LANDMARK_COUNT],
}

impl LandmarkFrame {
    pub fn from_points(points: &[[f64; 2]]) -> Result<Self> {
        if points.len() != LANDMARK_COUNT {
            return Err(anyhow!(
                "expected {LANDMARK_COUNT} landmarks, got {}",
                points.len()
            ));
        }
        let mut out = [Point::default(); LANDMARK_COUNT];
        for (dst, src) in out.iter_mut().zip(points) {
            *dst = Point::from(*src);
        }
        Ok(Self { points: out })
    }

    fn eye(&self, start: usize) -> [Point; 6] {
        let mut eye = [Point::default(); 6];
        eye.copy_from_slice(&self.points[start..start + 6]);
        eye
    }

    pub fn left_eye(&self) -> [Point; 6] {
        self.eye(LEFT_EYE)
    }

    pub fn right_eye(&self) -> [Point; 6] {
        self.eye(RIGHT_EYE)
    }

    pub fn nose_tip(&self) -> Point {
        self.points[NOSE_TIP]
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    faces: Vec<Vec<[f64; 2]>>,
}

/// What a landmark provider yields per video frame.
#[derive(Debug, Clone, Default)]
pub struct Detections {
    pub faces: Vec<LandmarkFrame>,
}

impl Detections {
    pub fn primary(&self) -> Option<&LandmarkFrame> {
        self.faces.first()
    }
}

pub trait LandmarkSource {
    /// `Ok(None)` is end of stream. Errors are fatal for the frame loop.
    fn next_frame(&mut self) -> Result<Option<Detections>, EngineError>;
}

/// Reads one JSON object per line: `{"faces": [[[x, y], ...68]]}`.
pub struct JsonLinesSource<R> {
    reader: R,
    line: String,
    line_no: u64,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
        }
    }
}

impl JsonLinesSource<Box<dyn BufRead + Send>> {
    /// `-` is stdin, anything else is a file or FIFO path.
    pub fn open(path: &str) -> Result<Self> {
        let reader: Box<dyn BufRead + Send> = if path == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let f = File::open(Path::new(path))
                .map_err(|e| anyhow!("failed to open landmark source {path}: {e}"))?;
            Box::new(BufReader::new(f))
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> LandmarkSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<Detections>, EngineError> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .map_err(|e| EngineError::Acquisition(e.to_string()))?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if self.line.trim().is_empty() {
                continue;
            }
            let raw: RawFrame = serde_json::from_str(&self.line).map_err(|e| {
                EngineError::Acquisition(format!("line {}: {e}", self.line_no))
            })?;

            let mut faces = Vec::with_capacity(raw.faces.len());
            for (i, pts) in raw.faces.iter().enumerate() {
                match LandmarkFrame::from_points(pts) {
                    Ok(f) => faces.push(f),
                    Err(e) => warn!("line {}: skipping face {i}: {e}", self.line_no),
                }
            }
            trace!("line {}: {} face(s)", self.line_no, faces.len());
            return Ok(Some(Detections { faces }));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// A face with both eyes open (EAR 2/3), nose tip at `nose`.
    pub(crate) fn face_points(nose: (f64, f64), eye_height: f64) -> Vec<[f64; 2]> {
        let mut pts = vec![[0.0, 0.0]; LANDMARK_COUNT];
        for start in [RIGHT_EYE, LEFT_EYE] {
            let x0 = start as f64 * 10.0;
            let eye = [
                [x0, 0.0],
                [x0 + 1.0, -eye_height],
                [x0 + 2.0, -eye_height],
                [x0 + 3.0, 0.0],
                [x0 + 2.0, eye_height],
                [x0 + 1.0, eye_height],
            ];
            pts[start..start + 6].copy_from_slice(&eye);
        }
        pts[NOSE_TIP] = [nose.0, nose.1];
        pts
    }

    fn line(faces: &[Vec<[f64; 2]>]) -> String {
        serde_json::json!({ "faces": faces }).to_string()
    }

    #[test]
    fn parses_frames_and_regions() {
        let text = format!("{}\n", line(&[face_points((320.0, 240.0), 1.0)]));
        let mut src = JsonLinesSource::new(Cursor::new(text));

        let det = src.next_frame().unwrap().unwrap();
        let face = det.primary().unwrap();
        assert_eq!(face.nose_tip(), Point::new(320.0, 240.0));
        assert_eq!(face.right_eye()[0], Point::new(360.0, 0.0));
        assert_eq!(face.left_eye()[3], Point::new(423.0, 0.0));
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_and_missing_faces_are_not_errors() {
        let text = "{\"faces\": []}\n\n{}\n";
        let mut src = JsonLinesSource::new(Cursor::new(text));
        assert!(src.next_frame().unwrap().unwrap().faces.is_empty());
        assert!(src.next_frame().unwrap().unwrap().faces.is_empty());
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn short_faces_are_skipped() {
        let short = vec![[1.0, 1.0]; 5];
        let text = format!("{}\n", line(&[short, face_points((1.0, 2.0), 1.0)]));
        let mut src = JsonLinesSource::new(Cursor::new(text));
        let det = src.next_frame().unwrap().unwrap();
        assert_eq!(det.faces.len(), 1);
        assert_eq!(det.primary().unwrap().nose_tip(), Point::new(1.0, 2.0));
    }

    #[test]
    fn malformed_line_is_an_acquisition_failure() {
        let mut src = JsonLinesSource::new(Cursor::new("{not json\n"));
        assert!(matches!(
            src.next_frame(),
            Err(EngineError::Acquisition(_))
        ));
    }
}
