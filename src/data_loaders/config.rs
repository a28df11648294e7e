use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde_yaml::{Mapping, Value};

use super::yaml::read_yaml;
use crate::{controller::ControllerSettings, hotkey::HotkeyStrategy, warn};

#[derive(Debug, Clone)]
pub struct SwitcherConfig {
    pub debug: bool,
    pub log_level: String,
    pub hotkey: HotkeySettings,
    pub catalog: CatalogSettings,
    pub watcher: WatcherSettings,
    pub icons: IconSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeySettings {
    /// Raw chord text; parsed at startup so a typo is reported instead of ignored.
    pub chord: String,
    pub strategy: HotkeyStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSettings {
    pub excluded_classes: Vec<String>,
    pub excluded_processes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconSettings {
    pub fallback: Option<PathBuf>,
    pub emit: bool,
}

/// `development:` block, folded into the top-level `debug`/`log_level`.
struct DevelopmentSettings {
    debug: bool,
    log_level: String,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        let development = DevelopmentSettings::default();
        Self {
            debug: development.debug,
            log_level: development.log_level,
            hotkey: HotkeySettings::default(),
            catalog: CatalogSettings::default(),
            watcher: WatcherSettings::default(),
            icons: IconSettings::default(),
        }
    }
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self {
            chord: "win+s".to_string(),
            strategy: HotkeyStrategy::Hook,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            timeout_ms: 5000,
        }
    }
}

impl Default for IconSettings {
    fn default() -> Self {
        Self {
            fallback: None,
            emit: true,
        }
    }
}

impl Default for DevelopmentSettings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

impl SwitcherConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let value = read_yaml(path)?;
        Self::from_yaml(&value)
            .ok_or_else(|| format!("{}: top level is not a mapping", path.display()))
    }

    /// Missing, unreadable or malformed files yield the defaults with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("[SWITCHER][CONFIG] Using defaults, config not loaded: {}", e);
            Self::default()
        })
    }

    pub fn from_yaml(root: &Value) -> Option<Self> {
        if root.is_null() {
            return Some(Self::default());
        }
        let map = root.as_mapping()?;

        let development = parse_development(map);
        Some(Self {
            debug: development.debug,
            log_level: development.log_level,
            hotkey: parse_hotkey(map),
            catalog: parse_catalog(map),
            watcher: parse_watcher(map),
            icons: parse_icons(map),
        })
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            poll_interval: Duration::from_millis(self.watcher.poll_interval_ms),
            close_timeout: Duration::from_millis(self.watcher.timeout_ms),
            emit_icons: self.icons.emit,
        }
    }
}

fn parse_development(root: &Mapping) -> DevelopmentSettings {
    let mut dev = DevelopmentSettings::default();

    dev.debug = bool_at(root, "debug").unwrap_or(dev.debug);
    dev.log_level = str_at(root, "log_level").unwrap_or(&dev.log_level).to_lowercase();

    if let Some(section) = mapping_at(root, "development") {
        dev.debug = bool_any(section, &["debug", "debug_mode"]).unwrap_or(dev.debug);
        dev.log_level = str_any(section, &["log_level", "logging"])
            .unwrap_or(&dev.log_level)
            .trim()
            .to_lowercase();
    }

    dev
}

fn parse_hotkey(root: &Mapping) -> HotkeySettings {
    let mut hotkey = HotkeySettings::default();

    // legacy: `hotkey: "win+s"`
    if let Some(chord) = str_at(root, "hotkey") {
        hotkey.chord = chord.trim().to_string();
    }

    if let Some(section) = mapping_at(root, "hotkey") {
        if let Some(chord) = str_any(section, &["chord", "keys", "shortcut"]) {
            hotkey.chord = chord.trim().to_string();
        }
        hotkey.strategy = str_any(section, &["strategy", "mode"])
            .and_then(HotkeyStrategy::parse)
            .unwrap_or(hotkey.strategy);
    }

    hotkey
}

fn parse_catalog(root: &Mapping) -> CatalogSettings {
    let Some(section) = mapping_at(root, "catalog") else {
        return CatalogSettings::default();
    };

    CatalogSettings {
        excluded_classes: string_list_at(section, "excluded_classes").unwrap_or_default(),
        excluded_processes: string_list_at(section, "excluded_processes")
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .collect(),
    }
}

fn parse_watcher(root: &Mapping) -> WatcherSettings {
    let mut watcher = WatcherSettings::default();

    if let Some(section) = mapping_at(root, "watcher") {
        watcher.poll_interval_ms = u64_any(section, &["poll_interval_ms", "interval_ms"])
            .unwrap_or(watcher.poll_interval_ms)
            .max(1);
        watcher.timeout_ms = u64_any(section, &["timeout_ms", "give_up_ms"])
            .unwrap_or(watcher.timeout_ms)
            .max(100);
    }

    watcher
}

fn parse_icons(root: &Mapping) -> IconSettings {
    let mut icons = IconSettings::default();

    if let Some(section) = mapping_at(root, "icons") {
        icons.fallback = str_at(section, "fallback")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        icons.emit = bool_any(section, &["emit", "enabled"]).unwrap_or(icons.emit);
    }

    icons
}

fn bool_at(map: &Mapping, key: &str) -> Option<bool> {
    map.get(Value::String(key.to_string()))?.as_bool()
}

fn bool_any(map: &Mapping, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| bool_at(map, k))
}

fn str_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(Value::String(key.to_string()))?.as_str()
}

fn str_any<'a>(map: &'a Mapping, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| str_at(map, k))
}

fn mapping_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    map.get(Value::String(key.to_string()))?.as_mapping()
}

fn u64_at(map: &Mapping, key: &str) -> Option<u64> {
    map.get(Value::String(key.to_string()))?
        .as_i64()
        .and_then(|v| if v >= 0 { Some(v as u64) } else { None })
}

fn u64_any(map: &Mapping, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| u64_at(map, k))
}

fn string_list_at(map: &Mapping, key: &str) -> Option<Vec<String>> {
    let list = map.get(Value::String(key.to_string()))?.as_sequence()?;
    Some(
        list.iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
