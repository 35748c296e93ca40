//! Finalized gesture -> one concrete action, per mode.

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;

use crate::actions::{Button, InputCommand, InputSink};
use crate::error::EngineError;
use crate::media::{MediaCommand, MediaController, OVERRIDE_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Mouse,
    Media,
}

/// A finalized gesture, ready for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Settled run of short blinks.
    Blinks(u32),
    /// Long closure; bypasses the settle window.
    Override,
}

impl Gesture {
    fn media_count(&self) -> u32 {
        match self {
            Gesture::Blinks(n) => *n,
            Gesture::Override => OVERRIDE_COUNT,
        }
    }
}

/// What a dispatch did, for logging and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Click,
    DoubleClick,
    PressHold,
    ReleaseHold,
    RightClick,
    Media(MediaCommand),
}

pub struct ActionDispatcher {
    mode: Mode,
    held: bool,
    sink: Box<dyn InputSink>,
    media: Box<dyn MediaController>,
}

impl ActionDispatcher {
    pub fn new(sink: Box<dyn InputSink>, media: Box<dyn MediaController>) -> Self {
        Self {
            mode: Mode::Mouse,
            held: false,
            sink,
            media,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn held(&self) -> bool {
        self.held
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_enabled()
    }

    /// Disabling lets go of a held button first.
    pub fn set_enabled(&mut self, en: bool) -> Result<()> {
        if !en {
            self.release_hold()?;
        }
        self.sink.set_enabled(en);
        info!("action injection {}", if en { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn set_media(&mut self, media: Box<dyn MediaController>) {
        if self.mode == Mode::Media {
            self.media.close();
            self.mode = Mode::Mouse;
            warn!("media controller replaced; back to mouse mode");
        }
        self.media = media;
    }

    /// Flip between mouse and media mode. Entering media mode fails closed
    /// when the controller is unavailable or refuses to open.
    pub fn toggle_mode(&mut self) -> Result<Mode, EngineError> {
        match self.mode {
            Mode::Mouse => {
                if !self.media.is_available() {
                    return Err(EngineError::MediaUnavailable(
                        "no media bindings configured".into(),
                    ));
                }
                self.media
                    .open()
                    .map_err(|e| EngineError::MediaUnavailable(e.to_string()))?;
                if let Err(e) = self.release_hold() {
                    self.media.close();
                    return Err(e.into());
                }
                self.mode = Mode::Media;
            }
            Mode::Media => {
                self.media.close();
                self.mode = Mode::Mouse;
            }
        }
        info!("mode: {:?}", self.mode);
        Ok(self.mode)
    }

    /// Let go of a held button, if any. Used on mode change and shutdown.
    pub fn release_hold(&mut self) -> Result<()> {
        if self.held {
            self.sink.send(&InputCommand::Release(Button::Left))?;
            self.held = false;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.release_hold()?;
        if self.media.is_active() {
            self.media.close();
        }
        self.mode = Mode::Mouse;
        Ok(())
    }

    pub fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        self.sink.send(&InputCommand::MoveRelative { dx, dy })
    }

    /// Exactly one external action per call, or none for an empty gesture.
    pub fn dispatch(&mut self, g: Gesture) -> Result<Option<Action>> {
        if g == Gesture::Blinks(0) {
            return Ok(None);
        }

        if self.mode == Mode::Media {
            let count = g.media_count();
            if self.media.process_gesture(count, self.sink.as_mut())? {
                let cmd = MediaCommand::for_count(count);
                info!("media gesture: {count} blink(s) -> {cmd:?}");
                return Ok(cmd.map(Action::Media));
            }
        }

        if self.held {
            self.sink.send(&InputCommand::Release(Button::Left))?;
            self.held = false;
            info!("gesture {g:?} -> release hold");
            return Ok(Some(Action::ReleaseHold));
        }

        let (cmd, action) = match g {
            Gesture::Blinks(1) => (InputCommand::Click(Button::Left), Action::Click),
            Gesture::Blinks(2) => (InputCommand::DoubleClick(Button::Left), Action::DoubleClick),
            Gesture::Blinks(3) => (InputCommand::Press(Button::Left), Action::PressHold),
            _ => (InputCommand::Click(Button::Right), Action::RightClick),
        };
        self.sink.send(&cmd)?;
        if action == Action::PressHold {
            self.held = true;
        }
        info!("gesture {g:?} -> {action:?}");
        Ok(Some(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::RecordingSink;
    use crate::media::{KeyMediaController, NoMedia};
    use std::collections::HashMap;

    fn mouse_only() -> (ActionDispatcher, RecordingSink) {
        let sink = RecordingSink::default();
        let d = ActionDispatcher::new(Box::new(sink.clone()), Box::new(NoMedia));
        (d, sink)
    }

    fn with_media(pairs: &[(&str, &str)]) -> (ActionDispatcher, RecordingSink) {
        let sink = RecordingSink::default();
        let bindings: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let media = KeyMediaController::from_bindings(&bindings).unwrap();
        let d = ActionDispatcher::new(Box::new(sink.clone()), Box::new(media));
        (d, sink)
    }

    #[test]
    fn mouse_table() {
        let (mut d, sink) = mouse_only();
        assert_eq!(d.dispatch(Gesture::Blinks(1)).unwrap(), Some(Action::Click));
        assert_eq!(d.dispatch(Gesture::Blinks(2)).unwrap(), Some(Action::DoubleClick));
        for n in [4, 5, 8, 12] {
            assert_eq!(d.dispatch(Gesture::Blinks(n)).unwrap(), Some(Action::RightClick));
        }
        assert_eq!(d.dispatch(Gesture::Override).unwrap(), Some(Action::RightClick));
        assert_eq!(
            sink.commands(),
            vec![
                InputCommand::Click(Button::Left),
                InputCommand::DoubleClick(Button::Left),
                InputCommand::Click(Button::Right),
                InputCommand::Click(Button::Right),
                InputCommand::Click(Button::Right),
                InputCommand::Click(Button::Right),
                InputCommand::Click(Button::Right),
            ]
        );
    }

    #[test]
    fn press_then_any_gesture_releases() {
        let (mut d, sink) = mouse_only();
        assert_eq!(d.dispatch(Gesture::Blinks(3)).unwrap(), Some(Action::PressHold));
        assert!(d.held());
        assert_eq!(sink.commands(), vec![InputCommand::Press(Button::Left)]);

        sink.clear();
        assert_eq!(d.dispatch(Gesture::Blinks(2)).unwrap(), Some(Action::ReleaseHold));
        assert!(!d.held());
        assert_eq!(sink.commands(), vec![InputCommand::Release(Button::Left)]);
    }

    #[test]
    fn held_release_ignores_count() {
        for g in [
            Gesture::Blinks(1),
            Gesture::Blinks(3),
            Gesture::Blinks(6),
            Gesture::Override,
        ] {
            let (mut d, sink) = mouse_only();
            d.dispatch(Gesture::Blinks(3)).unwrap();
            sink.clear();
            assert_eq!(d.dispatch(g).unwrap(), Some(Action::ReleaseHold), "{g:?}");
            assert_eq!(sink.commands(), vec![InputCommand::Release(Button::Left)]);
        }
    }

    #[test]
    fn empty_gesture_does_nothing() {
        let (mut d, sink) = mouse_only();
        assert_eq!(d.dispatch(Gesture::Blinks(0)).unwrap(), None);
        assert!(sink.commands().is_empty());
    }

    #[test]
    fn media_toggle_fails_closed_without_controller() {
        let (mut d, _sink) = mouse_only();
        assert!(matches!(
            d.toggle_mode(),
            Err(EngineError::MediaUnavailable(_))
        ));
        assert_eq!(d.mode(), Mode::Mouse);
    }

    #[test]
    fn media_mode_uses_media_table() {
        let (mut d, sink) = with_media(&[("play_pause", "K"), ("subscribe", "ALT+S")]);
        assert_eq!(d.toggle_mode().unwrap(), Mode::Media);

        assert_eq!(
            d.dispatch(Gesture::Blinks(1)).unwrap(),
            Some(Action::Media(MediaCommand::PlayPause))
        );
        assert_eq!(
            d.dispatch(Gesture::Override).unwrap(),
            Some(Action::Media(MediaCommand::Subscribe))
        );
        assert_eq!(
            sink.commands(),
            vec![
                InputCommand::KeyChord("K".into()),
                InputCommand::KeyChord("ALT+S".into()),
            ]
        );
    }

    #[test]
    fn unhandled_media_gesture_falls_back_to_mouse() {
        let (mut d, sink) = with_media(&[("play_pause", "K")]);
        d.toggle_mode().unwrap();
        assert_eq!(d.dispatch(Gesture::Blinks(2)).unwrap(), Some(Action::DoubleClick));
        assert_eq!(sink.commands(), vec![InputCommand::DoubleClick(Button::Left)]);
    }

    #[test]
    fn entering_media_mode_releases_hold() {
        let (mut d, sink) = with_media(&[("mute", "M")]);
        d.dispatch(Gesture::Blinks(3)).unwrap();
        d.toggle_mode().unwrap();
        assert!(!d.held());
        assert_eq!(sink.commands().last(), Some(&InputCommand::Release(Button::Left)));

        assert_eq!(d.toggle_mode().unwrap(), Mode::Mouse);
        assert_eq!(d.dispatch(Gesture::Blinks(1)).unwrap(), Some(Action::Click));
    }

    #[test]
    fn disabling_while_held_releases_the_button() {
        let (mut d, sink) = mouse_only();
        d.dispatch(Gesture::Blinks(3)).unwrap();
        sink.clear();

        d.set_enabled(false).unwrap();
        assert!(!d.held());
        assert!(!d.is_enabled());
        assert_eq!(sink.commands(), vec![InputCommand::Release(Button::Left)]);

        // gated from here on
        sink.clear();
        d.dispatch(Gesture::Blinks(1)).unwrap();
        d.move_relative(3, 3).unwrap();
        assert!(sink.commands().is_empty());

        d.set_enabled(true).unwrap();
        d.dispatch(Gesture::Blinks(1)).unwrap();
        assert_eq!(sink.commands(), vec![InputCommand::Click(Button::Left)]);
    }

    /// Presses fine, refuses to let go.
    struct StuckSink;

    impl InputSink for StuckSink {
        fn send(&mut self, cmd: &InputCommand) -> Result<()> {
            match cmd {
                InputCommand::Release(_) => Err(anyhow::anyhow!("device gone")),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn failed_release_leaves_media_closed_and_mode_unchanged() {
        let bindings: HashMap<String, String> = [("mute".to_string(), "M".to_string())].into();
        let media = KeyMediaController::from_bindings(&bindings).unwrap();
        let mut d = ActionDispatcher::new(Box::new(StuckSink), Box::new(media));
        d.dispatch(Gesture::Blinks(3)).unwrap();

        assert!(matches!(d.toggle_mode(), Err(EngineError::Injector(_))));
        assert_eq!(d.mode(), Mode::Mouse);
        assert!(!d.media.is_active());
    }

    #[test]
    fn zero_motion_is_not_sent() {
        let (mut d, sink) = mouse_only();
        d.move_relative(0, 0).unwrap();
        d.move_relative(-5, 10).unwrap();
        assert_eq!(sink.commands(), vec![InputCommand::MoveRelative { dx: -5, dy: 10 }]);
    }
}
