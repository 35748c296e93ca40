use log::trace;

use crate::config::Thresholds;

/// Terminal outcome of one eye-closure episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkEvent {
    /// Closed for `min_run..=max_run` frames: counts toward a gesture.
    ShortBlink,
    /// Closed for more than `max_run` frames: immediate right-click path.
    LongBlinkOverride,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkParams {
    pub ear_thresh: f64,
    pub min_run: u32,
    pub max_run: u32,
}

impl From<&Thresholds> for BlinkParams {
    fn from(th: &Thresholds) -> Self {
        Self {
            ear_thresh: th.ear_thresh,
            min_run: th.min_run,
            max_run: th.max_run,
        }
    }
}

/// Run-length classifier over the averaged EAR signal. The run length is the
/// only memory; every closure episode ends in exactly one transition.
#[derive(Debug)]
pub struct BlinkClassifier {
    params: BlinkParams,
    closed_run: u32,
}

impl BlinkClassifier {
    pub fn new(params: BlinkParams) -> Self {
        Self {
            params,
            closed_run: 0,
        }
    }

    pub fn set_params(&mut self, params: BlinkParams) {
        self.params = params;
    }

    pub fn closed_run(&self) -> u32 {
        self.closed_run
    }

    pub fn reset(&mut self) {
        self.closed_run = 0;
    }

    pub fn update(&mut self, ear: f64) -> Option<BlinkEvent> {
        if ear < self.params.ear_thresh {
            self.closed_run = self.closed_run.saturating_add(1);
            return None;
        }

        let run = std::mem::take(&mut self.closed_run);
        let event = if run > self.params.max_run {
            Some(BlinkEvent::LongBlinkOverride)
        } else if run >= self.params.min_run && run > 0 {
            Some(BlinkEvent::ShortBlink)
        } else {
            None
        };
        if let Some(ev) = event {
            trace!("closure of {run} frame(s) -> {ev:?}");
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> BlinkClassifier {
        BlinkClassifier::new(BlinkParams {
            ear_thresh: 0.20,
            min_run: 1,
            max_run: 5,
        })
    }

    fn feed(c: &mut BlinkClassifier, ears: &[f64]) -> Vec<BlinkEvent> {
        ears.iter().filter_map(|&e| c.update(e)).collect()
    }

    #[test]
    fn short_closure_is_one_short_blink() {
        let mut c = classifier();
        let ears = [0.1, 0.1, 0.1, 0.3];
        assert_eq!(feed(&mut c, &ears), vec![BlinkEvent::ShortBlink]);
        assert_eq!(c.closed_run(), 0);
    }

    #[test]
    fn long_closure_is_an_override_not_a_short_blink() {
        let mut c = classifier();
        let mut ears = vec![0.1; 7];
        ears.push(0.3);
        assert_eq!(feed(&mut c, &ears), vec![BlinkEvent::LongBlinkOverride]);
    }

    #[test]
    fn run_bounds_are_inclusive() {
        let mut c = classifier();
        let mut ears = vec![0.1; 5];
        ears.push(0.3);
        assert_eq!(feed(&mut c, &ears), vec![BlinkEvent::ShortBlink]);

        let mut ears = vec![0.1; 6];
        ears.push(0.3);
        assert_eq!(feed(&mut c, &ears), vec![BlinkEvent::LongBlinkOverride]);
    }

    #[test]
    fn open_eyes_emit_nothing() {
        let mut c = classifier();
        assert!(feed(&mut c, &[0.3, 0.35, 0.2, 0.4]).is_empty());
    }

    #[test]
    fn runs_below_min_are_dropped() {
        let mut c = BlinkClassifier::new(BlinkParams {
            ear_thresh: 0.20,
            min_run: 3,
            max_run: 5,
        });
        assert!(feed(&mut c, &[0.1, 0.1, 0.3]).is_empty());
        assert_eq!(c.closed_run(), 0);
        assert_eq!(feed(&mut c, &[0.1, 0.1, 0.1, 0.3]), vec![BlinkEvent::ShortBlink]);
    }

    #[test]
    fn each_episode_counts_once() {
        let mut c = classifier();
        let ears = [0.1, 0.1, 0.3, 0.3, 0.3, 0.1, 0.3, 0.3];
        assert_eq!(
            feed(&mut c, &ears),
            vec![BlinkEvent::ShortBlink, BlinkEvent::ShortBlink]
        );
    }
}
