use anyhow::{Result, anyhow};
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
    Middle,
}

impl Button {
    pub fn parse(which: &str) -> Result<Self> {
        match which.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other => Err(anyhow!("unknown mouse button: {other}")),
        }
    }
}

/// Discrete commands accepted by an input injector.
#[derive(Debug, Clone, PartialEq)]
pub enum InputCommand {
    Click(Button),
    DoubleClick(Button),
    Press(Button),
    Release(Button),
    MoveRelative { dx: i32, dy: i32 },
    /// Chord like "SHIFT+N" or single "K"; validated by `parse_chord`.
    KeyChord(String),
}

pub trait InputSink: Send {
    fn send(&mut self, cmd: &InputCommand) -> Result<()>;

    fn is_enabled(&self) -> bool {
        true
    }

    fn set_enabled(&mut self, _en: bool) {}
}

/// A disabled sink still lets button releases through so a pressed button
/// can always be let go.
fn passes_gate(enabled: bool, cmd: &InputCommand) -> bool {
    enabled || matches!(cmd, InputCommand::Release(_))
}

const KEY_TOKENS: &[&str] = &[
    "CTRL", "CONTROL", "ALT", "SHIFT", "SUPER", "META", "WIN", "TAB", "MINUS", "-", "EQUAL",
    "=", "SPACE", "ENTER", "ESC", "UP", "DOWN", "LEFT", "RIGHT", "HOME", "END", "PAGEUP",
    "PAGEDOWN", "COMMA", "DOT", "SLASH",
];

fn known_token(tok: &str) -> bool {
    let single_alnum = tok.len() == 1 && tok.chars().all(|c| c.is_ascii_alphanumeric());
    let function_key = tok
        .strip_prefix('F')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=12).contains(&n));
    single_alnum || function_key || KEY_TOKENS.contains(&tok)
}

/// Split and validate a chord; tokens come back upper-cased in press order.
pub fn parse_chord(chord: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = chord
        .split('+')
        .map(|s| s.trim().to_ascii_uppercase())
        .collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(anyhow!("malformed key chord '{chord}'"));
    }
    for p in &parts {
        if !known_token(p) {
            return Err(anyhow!("unsupported key token: {p}"));
        }
    }
    Ok(parts)
}

/// Name of the injected device; keyboard discovery skips it.
pub const VIRTUAL_DEVICE_NAME: &str = "Facectl Virtual Input";

pub struct UinputSink {
    enabled: bool,
    #[allow(dead_code)]
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    pub fn new() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create()?;
            return Ok(Self {
                enabled: true,
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self::noop())
        }
    }

    pub fn noop() -> Self {
        Self {
            enabled: true,
            linux: None,
        }
    }
}

impl InputSink for UinputSink {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, en: bool) {
        self.enabled = en;
    }

    fn send(&mut self, cmd: &InputCommand) -> Result<()> {
        if !passes_gate(self.enabled, cmd) {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            match cmd {
                InputCommand::Click(b) => dev.click(*b)?,
                InputCommand::DoubleClick(b) => {
                    dev.click(*b)?;
                    dev.click(*b)?;
                }
                InputCommand::Press(b) => dev.button(*b, 1)?,
                InputCommand::Release(b) => dev.button(*b, 0)?,
                InputCommand::MoveRelative { dx, dy } => dev.move_relative(*dx, *dy)?,
                InputCommand::KeyChord(chord) => dev.key_chord(&parse_chord(chord)?)?,
            }
        }
        #[cfg(not(target_os = "linux"))]
        let _ = cmd;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn map_key(tok: &str) -> Result<uinput::event::keyboard::Key> {
    use uinput::event::keyboard::Key as K;
    let k = match tok {
        "CTRL" | "CONTROL" => K::LeftControl,
        "ALT" => K::LeftAlt,
        "SHIFT" => K::LeftShift,
        "SUPER" | "META" | "WIN" => K::LeftMeta,
        "TAB" => K::Tab,
        "MINUS" | "-" => K::Minus,
        "EQUAL" | "=" => K::Equal,
        "SPACE" => K::Space,
        "ENTER" => K::Enter,
        "ESC" => K::Esc,
        "UP" => K::Up,
        "DOWN" => K::Down,
        "LEFT" => K::Left,
        "RIGHT" => K::Right,
        "HOME" => K::Home,
        "END" => K::End,
        "PAGEUP" => K::PageUp,
        "PAGEDOWN" => K::PageDown,
        "COMMA" => K::Comma,
        "DOT" => K::Dot,
        "SLASH" => K::Slash,
        "A" => K::A,
        "B" => K::B,
        "C" => K::C,
        "D" => K::D,
        "E" => K::E,
        "F" => K::F,
        "G" => K::G,
        "H" => K::H,
        "I" => K::I,
        "J" => K::J,
        "K" => K::K,
        "L" => K::L,
        "M" => K::M,
        "N" => K::N,
        "O" => K::O,
        "P" => K::P,
        "Q" => K::Q,
        "R" => K::R,
        "S" => K::S,
        "T" => K::T,
        "U" => K::U,
        "V" => K::V,
        "W" => K::W,
        "X" => K::X,
        "Y" => K::Y,
        "Z" => K::Z,
        "0" => K::_0,
        "1" => K::_1,
        "2" => K::_2,
        "3" => K::_3,
        "4" => K::_4,
        "5" => K::_5,
        "6" => K::_6,
        "7" => K::_7,
        "8" => K::_8,
        "9" => K::_9,
        "F1" => K::F1,
        "F2" => K::F2,
        "F3" => K::F3,
        "F4" => K::F4,
        "F5" => K::F5,
        "F6" => K::F6,
        "F7" => K::F7,
        "F8" => K::F8,
        "F9" => K::F9,
        "F10" => K::F10,
        "F11" => K::F11,
        "F12" => K::F12,
        other => return Err(anyhow!("unsupported key token: {other}")),
    };
    Ok(k)
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create() -> Result<Self> {
        use uinput::event::{Keyboard, controller::Mouse, relative};

        let dev = uinput::default()?
            .name(VIRTUAL_DEVICE_NAME)?
            // relative pointer motion
            .event(relative::Position::X)?
            .event(relative::Position::Y)?
            // mouse buttons
            .event(Mouse::Left)?
            .event(Mouse::Right)?
            .event(Mouse::Middle)?
            // whole keyboard, media bindings are user defined
            .event(Keyboard::All)?
            .create()?;

        info!("uinput: created virtual device");
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn button(&mut self, b: Button, val: i32) -> Result<()> {
        use uinput::event::controller::Mouse;
        let m = match b {
            Button::Left => Mouse::Left,
            Button::Right => Mouse::Right,
            Button::Middle => Mouse::Middle,
        };
        self.dev.send(m, val)?;
        self.sync()
    }

    fn click(&mut self, b: Button) -> Result<()> {
        self.button(b, 1)?;
        self.button(b, 0)
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        use uinput::event::relative::Position;
        if dx != 0 {
            self.dev.send(Position::X, dx)?;
        }
        if dy != 0 {
            self.dev.send(Position::Y, dy)?;
        }
        self.sync()
    }

    fn key_chord(&mut self, tokens: &[String]) -> Result<()> {
        let mut keys = Vec::with_capacity(tokens.len());
        for t in tokens {
            keys.push(map_key(t)?);
        }
        // press in order
        for k in &keys {
            self.dev.send(*k, 1)?;
        }
        self.sync()?;
        // release in reverse
        for k in keys.iter().rev() {
            self.dev.send(*k, 0)?;
        }
        self.sync()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    };

    /// Captures every command that passes the gate; clones share the log.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        log: Arc<Mutex<Vec<InputCommand>>>,
        disabled: Arc<AtomicBool>,
    }

    impl RecordingSink {
        pub(crate) fn commands(&self) -> Vec<InputCommand> {
            self.log.lock().unwrap().clone()
        }

        pub(crate) fn clear(&self) {
            self.log.lock().unwrap().clear();
        }
    }

    impl InputSink for RecordingSink {
        fn send(&mut self, cmd: &InputCommand) -> Result<()> {
            if passes_gate(self.is_enabled(), cmd) {
                self.log.lock().unwrap().push(cmd.clone());
            }
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            !self.disabled.load(Ordering::SeqCst)
        }

        fn set_enabled(&mut self, en: bool) {
            self.disabled.store(!en, Ordering::SeqCst);
        }
    }
}
