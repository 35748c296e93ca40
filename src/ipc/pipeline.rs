use log::{debug, info, trace};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::Receiver,
};

use crate::config::Thresholds;
use crate::debounce::GestureDebouncer;
use crate::error::EngineError;
use crate::geometry::ear;
use crate::gestures::{BlinkClassifier, BlinkParams};
use crate::landmarks::{Detections, LandmarkFrame, LandmarkSource};
use crate::tracker::CursorTracker;

pub enum PipelineMsg {
    Thresholds(Thresholds),
    /// Mode toggled or restarted: forget closure runs and the cursor baseline.
    Reset,
}

/// Per-frame state owned by the frame loop.
pub struct FrameLoop {
    classifier: BlinkClassifier,
    tracker: CursorTracker,
    engine: Arc<GestureDebouncer>,
}

impl FrameLoop {
    pub fn new(th: &Thresholds, engine: Arc<GestureDebouncer>) -> Self {
        Self {
            classifier: BlinkClassifier::new(BlinkParams::from(th)),
            tracker: CursorTracker::new(th.cursor_scale),
            engine,
        }
    }

    pub fn apply(&mut self, msg: PipelineMsg) {
        match msg {
            PipelineMsg::Thresholds(th) => {
                self.classifier.set_params(BlinkParams::from(&th));
                self.tracker.set_scale(th.cursor_scale);
                self.engine.set_settle(th.settle());
            }
            PipelineMsg::Reset => {
                self.classifier.reset();
                self.tracker.reset();
            }
        }
    }

    pub fn process(&mut self, det: &Detections) {
        let Some(face) = det.primary() else {
            // a gap: the next face is a calibration frame
            self.tracker.reset();
            return;
        };

        let (dx, dy) = self.tracker.update(face.nose_tip());
        self.engine.move_relative(dx, dy);

        let Some(avg) = averaged_ear(face) else {
            return;
        };
        trace!("ear {avg:.3} run {}", self.classifier.closed_run());
        if let Some(ev) = self.classifier.update(avg) {
            self.engine.on_blink(ev);
        }
    }
}

/// Mean EAR over the eyes with usable geometry; `None` if neither is.
fn averaged_ear(face: &LandmarkFrame) -> Option<f64> {
    let eyes = [("left", ear(&face.left_eye())), ("right", ear(&face.right_eye()))];
    let mut sum = 0.0;
    let mut n = 0;
    for (side, r) in eyes {
        match r {
            Ok(v) => {
                sum += v;
                n += 1;
            }
            Err(e) => debug!("{side} eye skipped: {e}"),
        }
    }
    (n > 0).then(|| sum / n as f64)
}

/// Drive the engine from `source` until end of stream, `stop`, or an
/// acquisition failure. No retries.
pub fn run_pipeline(
    mut source: impl LandmarkSource,
    th: &Thresholds,
    engine: Arc<GestureDebouncer>,
    control: Receiver<PipelineMsg>,
    stop: Arc<AtomicBool>,
) -> Result<u64, EngineError> {
    let mut frame_loop = FrameLoop::new(th, engine);
    let mut frames = 0u64;

    while !stop.load(Ordering::Relaxed) {
        while let Ok(msg) = control.try_recv() {
            frame_loop.apply(msg);
        }
        let Some(det) = source.next_frame()? else {
            info!("landmark stream ended after {frames} frame(s)");
            break;
        };
        frames += 1;
        frame_loop.process(&det);
    }
    Ok(frames)
}
