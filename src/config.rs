use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::actions::parse_chord;
use crate::input;
use crate::media::MediaCommand;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    /// Landmark stream: `-` for stdin, otherwise a file or FIFO path.
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "-".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    pub ear_thresh: f64,
    pub min_run: u32,
    pub max_run: u32,
    pub settle_ms: u64,
    pub cursor_scale: f64,
}

impl Thresholds {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hotkeys {
    #[serde(default = "default_toggle_key")]
    pub toggle_mode: String,
}

fn default_toggle_key() -> String {
    "F9".to_string()
}

impl Default for Hotkeys {
    fn default() -> Self {
        Self {
            toggle_mode: default_toggle_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub hotkeys: Hotkeys,

    // Accept nested/dotted tables; bindings are keyed by their leaf name
    #[serde(default, deserialize_with = "deserialize_bindings_flat")]
    pub media: HashMap<String, String>,
}

// --------- media bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "media must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                if out.insert(k.clone(), s.clone()).is_some() {
                    return Err(format!("media binding '{k}' is set more than once ({key})"));
                }
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "media binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot locate home directory"))?;
    Ok(dirs.home_dir().join(".config").join("facectl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir()?;
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir.join(format!("{active_name}.toml")))?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    /// Keeps the last good profile when the file on disk is invalid.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.active_path())?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&p)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        let source = &self.profile.meta.source;
        let source_ok = source == "-" || Path::new(source).exists();
        let keyboards: Vec<String> = input::discover_keyboards()
            .into_iter()
            .map(|d| format!("{} ({})", d.name, d.path))
            .collect();
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "landmark_source": source,
            "landmark_source_present": source_ok,
            "keyboards": keyboards,
            "media_bindings": self.profile.media.len(),
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
            }
        })
    }
}

pub fn load_profile(path: &Path) -> Result<Profile> {
    let txt = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    parse_profile(&txt).map_err(|e| anyhow!("{}: {e}", path.display()))
}

pub fn parse_profile(txt: &str) -> Result<Profile> {
    let profile: Profile = toml::from_str(txt).map_err(|e| anyhow!("failed to parse: {e}"))?;
    validate_profile(&profile)?;
    Ok(profile)
}

fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if !(th.ear_thresh > 0.0 && th.ear_thresh < 1.0) {
        return Err(anyhow!("thresholds.ear_thresh must be in (0,1)"));
    }
    if th.min_run == 0 || th.min_run > th.max_run {
        return Err(anyhow!(
            "thresholds must satisfy 1 <= min_run <= max_run"
        ));
    }
    if th.settle_ms == 0 {
        return Err(anyhow!("thresholds.settle_ms must be a positive duration"));
    }
    if !(th.cursor_scale > 0.0) {
        return Err(anyhow!("thresholds.cursor_scale must be positive"));
    }
    if p.meta.source.trim().is_empty() {
        return Err(anyhow!("meta.source must not be empty"));
    }
    input::parse_hotkey(&p.hotkeys.toggle_mode)?;

    for (k, v) in &p.media {
        if MediaCommand::from_key(k).is_none() {
            return Err(anyhow!("unknown media command '{}'", k));
        }
        if v.trim().is_empty() {
            return Err(anyhow!("media binding '{}' is empty", k));
        }
        parse_chord(v).map_err(|e| anyhow!("media binding '{}': {e}", k))?;
    }
    Ok(())
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:") {
                if line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
                {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_valid() {
        let p = parse_profile(default_profile_text()).unwrap();
        assert_eq!(p.meta.source, "-");
        assert_eq!(p.thresholds.ear_thresh, 0.20);
        assert_eq!((p.thresholds.min_run, p.thresholds.max_run), (1, 5));
        assert_eq!(p.thresholds.settle(), Duration::from_millis(700));
        assert_eq!(p.thresholds.cursor_scale, 5.0);
        assert_eq!(p.hotkeys.toggle_mode, "F9");
        assert_eq!(p.media.get("next").map(String::as_str), Some("SHIFT+N"));
    }

    const MINIMAL: &str = r#"
        [meta]
        [thresholds]
        ear_thresh = 0.2
        min_run = 1
        max_run = 5
        settle_ms = 700
        cursor_scale = 5.0
    "#;

    #[test]
    fn optional_sections_default() {
        let p = parse_profile(MINIMAL).unwrap();
        assert_eq!(p.meta.source, "-");
        assert_eq!(p.hotkeys.toggle_mode, "F9");
        assert!(p.media.is_empty());
    }

    #[test]
    fn nested_media_tables_resolve_to_leaf_commands() {
        let txt = format!(
            "{MINIMAL}\n[media]\nmute = \"M\"\n[media.player]\nplay_pause = \"K\"\n[media.player.seek]\nnext = \"SHIFT+N\"\n"
        );
        let p = parse_profile(&txt).unwrap();
        assert_eq!(p.media.len(), 3);
        assert_eq!(p.media.get("play_pause").map(String::as_str), Some("K"));
        assert_eq!(p.media.get("next").map(String::as_str), Some("SHIFT+N"));
        assert_eq!(p.media.get("mute").map(String::as_str), Some("M"));
    }

    #[test]
    fn duplicate_leaf_bindings_are_rejected() {
        let txt = format!(
            "{MINIMAL}\n[media]\nmute = \"M\"\n[media.player]\nmute = \"F10\"\n"
        );
        assert!(parse_profile(&txt).is_err());
    }

    #[test]
    fn bad_thresholds_are_rejected() {
        for (from, to) in [
            ("ear_thresh = 0.2", "ear_thresh = 1.5"),
            ("min_run = 1", "min_run = 0"),
            ("max_run = 5", "max_run = 0"),
            ("settle_ms = 700", "settle_ms = 0"),
            ("cursor_scale = 5.0", "cursor_scale = -1.0"),
        ] {
            let txt = MINIMAL.replace(from, to);
            assert!(parse_profile(&txt).is_err(), "accepted {to}");
        }
    }

    #[test]
    fn bad_media_bindings_are_rejected() {
        let unknown = format!("{MINIMAL}\n[media]\nrewind = \"J\"\n");
        assert!(parse_profile(&unknown).is_err());
        let bad_chord = format!("{MINIMAL}\n[media]\nmute = \"HYPER+M\"\n");
        assert!(parse_profile(&bad_chord).is_err());
        let not_string = format!("{MINIMAL}\n[media]\nmute = 3\n");
        assert!(parse_profile(&not_string).is_err());
    }

    #[test]
    fn bad_hotkey_is_rejected() {
        let txt = format!("{MINIMAL}\n[hotkeys]\ntoggle_mode = \"NOPE\"\n");
        assert!(parse_profile(&txt).is_err());
    }
}
