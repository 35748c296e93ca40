//! Media player control through keyboard shortcuts.

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::collections::HashMap;

use crate::actions::{InputCommand, InputSink, parse_chord};

/// Count the long-blink override is presented as when a media controller is
/// asked to handle it.
pub const OVERRIDE_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaCommand {
    PlayPause,
    Next,
    Mute,
    Fullscreen,
    Like,
    VolumeUp,
    VolumeDown,
    Subscribe,
    ContextMenu,
}

impl MediaCommand {
    pub const ALL: [MediaCommand; 9] = [
        Self::PlayPause,
        Self::Next,
        Self::Mute,
        Self::Fullscreen,
        Self::Like,
        Self::VolumeUp,
        Self::VolumeDown,
        Self::Subscribe,
        Self::ContextMenu,
    ];

    pub fn for_count(count: u32) -> Option<Self> {
        Some(match count {
            0 => return None,
            1 => Self::PlayPause,
            2 => Self::Next,
            3 => Self::Mute,
            4 => Self::Fullscreen,
            5 => Self::Like,
            6 => Self::VolumeUp,
            7 => Self::VolumeDown,
            _ => Self::Subscribe,
        })
    }

    /// Key used in the profile `[media]` table.
    pub fn key(&self) -> &'static str {
        match self {
            Self::PlayPause => "play_pause",
            Self::Next => "next",
            Self::Mute => "mute",
            Self::Fullscreen => "fullscreen",
            Self::Like => "like",
            Self::VolumeUp => "volume_up",
            Self::VolumeDown => "volume_down",
            Self::Subscribe => "subscribe",
            Self::ContextMenu => "context_menu",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

pub trait MediaController: Send {
    /// Checked once, when media mode is entered.
    fn is_available(&self) -> bool;
    fn is_active(&self) -> bool;
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);

    /// `Ok(false)` means the command is not handled by this controller.
    fn send(&mut self, cmd: MediaCommand, sink: &mut dyn InputSink) -> Result<bool>;

    fn process_gesture(&mut self, count: u32, sink: &mut dyn InputSink) -> Result<bool> {
        match MediaCommand::for_count(count) {
            Some(cmd) => self.send(cmd, sink),
            None => Ok(false),
        }
    }
}

/// Stand-in when no media bindings are configured.
#[derive(Debug, Default)]
pub struct NoMedia;

impl MediaController for NoMedia {
    fn is_available(&self) -> bool {
        false
    }

    fn is_active(&self) -> bool {
        false
    }

    fn open(&mut self) -> Result<()> {
        Err(anyhow!("no media controller configured"))
    }

    fn close(&mut self) {}

    fn send(&mut self, _cmd: MediaCommand, _sink: &mut dyn InputSink) -> Result<bool> {
        Ok(false)
    }
}

/// Sends the player's keyboard shortcuts, one chord per command.
#[derive(Debug, Default)]
pub struct KeyMediaController {
    bindings: HashMap<MediaCommand, String>,
    active: bool,
}

impl KeyMediaController {
    /// `bindings` maps profile keys (`play_pause`, `next`, ...) to chords.
    pub fn from_bindings(bindings: &HashMap<String, String>) -> Result<Self> {
        let mut out = HashMap::new();
        for (k, chord) in bindings {
            let cmd = MediaCommand::from_key(k)
                .ok_or_else(|| anyhow!("unknown media command '{k}'"))?;
            parse_chord(chord).map_err(|e| anyhow!("media.{k}: {e}"))?;
            out.insert(cmd, chord.clone());
        }
        Ok(Self {
            bindings: out,
            active: false,
        })
    }

    pub fn binding(&self, cmd: MediaCommand) -> Option<&str> {
        self.bindings.get(&cmd).map(String::as_str)
    }
}

impl MediaController for KeyMediaController {
    fn is_available(&self) -> bool {
        !self.bindings.is_empty()
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn open(&mut self) -> Result<()> {
        if self.bindings.is_empty() {
            return Err(anyhow!("no media bindings configured"));
        }
        self.active = true;
        info!("media: {} binding(s) active", self.bindings.len());
        Ok(())
    }

    fn close(&mut self) {
        self.active = false;
    }

    fn send(&mut self, cmd: MediaCommand, sink: &mut dyn InputSink) -> Result<bool> {
        if !self.active {
            debug!("media: {cmd:?} ignored, controller closed");
            return Ok(false);
        }
        let Some(chord) = self.bindings.get(&cmd) else {
            warn!("media: no binding for {}", cmd.key());
            return Ok(false);
        };
        sink.send(&InputCommand::KeyChord(chord.clone()))?;
        Ok(true)
    }
}
