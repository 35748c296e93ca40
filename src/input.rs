//! Keyboard discovery & the mode-toggle hotkey (evdev 0.13.2 compatible)

use anyhow::{Result, anyhow};
use evdev::{Device, EventType, KeyCode};
use log::{info, warn};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crate::actions::VIRTUAL_DEVICE_NAME;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
}

pub fn parse_hotkey(name: &str) -> Result<KeyCode> {
    let k = match name.trim().to_ascii_uppercase().as_str() {
        "F1" => KeyCode::KEY_F1,
        "F2" => KeyCode::KEY_F2,
        "F3" => KeyCode::KEY_F3,
        "F4" => KeyCode::KEY_F4,
        "F5" => KeyCode::KEY_F5,
        "F6" => KeyCode::KEY_F6,
        "F7" => KeyCode::KEY_F7,
        "F8" => KeyCode::KEY_F8,
        "F9" => KeyCode::KEY_F9,
        "F10" => KeyCode::KEY_F10,
        "F11" => KeyCode::KEY_F11,
        "F12" => KeyCode::KEY_F12,
        "PAUSE" => KeyCode::KEY_PAUSE,
        "SCROLLLOCK" => KeyCode::KEY_SCROLLLOCK,
        "INSERT" => KeyCode::KEY_INSERT,
        other => return Err(anyhow!("unsupported hotkey: {other}")),
    };
    Ok(k)
}

/// Our own uinput device advertises every key; never listen to it.
fn is_own_device(name: Option<&str>) -> bool {
    name == Some(VIRTUAL_DEVICE_NAME)
}

fn is_keyboard(dev: &Device) -> bool {
    !is_own_device(dev.name())
        && dev.supported_events().contains(EventType::KEY)
        && dev
            .supported_keys()
            .is_some_and(|k| k.contains(KeyCode::KEY_A) && k.contains(KeyCode::KEY_ENTER))
}

pub fn discover_keyboards() -> Vec<DeviceInfo> {
    let mut out = vec![];
    if let Ok(rd) = std::fs::read_dir("/dev/input") {
        for e in rd.flatten() {
            let p = e.path();
            if p.file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.starts_with("event"))
                .unwrap_or(false)
            {
                if let Ok(dev) = Device::open(&p) {
                    if is_keyboard(&dev) {
                        out.push(DeviceInfo {
                            path: p.display().to_string(),
                            name: dev.name().unwrap_or("unknown").to_string(),
                        });
                    }
                }
            }
        }
    }
    out
}

/// Poll every keyboard for presses of `key` until `stop` is set.
/// Without readable keyboards this idles; the IPC toggle still works.
pub fn watch_hotkey(key: KeyCode, stop: Arc<AtomicBool>, mut on_press: impl FnMut()) {
    let mut devs: Vec<Device> = vec![];
    for d in discover_keyboards() {
        match Device::open(&d.path) {
            Ok(mut dev) => {
                if let Err(e) = dev.set_nonblocking(true) {
                    warn!("failed to set {} nonblocking: {e}", d.path);
                    continue;
                }
                devs.push(dev);
            }
            Err(e) => warn!("failed to open {}: {e}", d.path),
        }
    }
    if devs.is_empty() {
        warn!("no readable keyboards; hotkey {key:?} disabled");
    } else {
        info!("watching {} keyboard(s) for {key:?}", devs.len());
    }

    while !stop.load(Ordering::Relaxed) {
        let mut any_event = false;
        for dev in devs.iter_mut() {
            if let Ok(events) = dev.fetch_events() {
                for ev in events {
                    any_event = true;
                    if ev.event_type() == EventType::KEY && ev.code() == key.0 && ev.value() == 1
                    {
                        on_press();
                    }
                }
            }
        }
        if !any_event {
            thread::sleep(Duration::from_millis(10));
        }
    }
}
