//! TotalXP configuration
//!
//! Config file: `totalxp.toml` next to the database, unless the adapter
//! points elsewhere.

use crate::error::ConfigError;
use crate::host::{BarColor, BarStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "totalxp.toml";
pub const DEFAULT_TITLE: &str = "&bNext Rank: &e%next_rank% &7(&a%xp%&7/&c%required_xp%&7)";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Seconds between background saves of every cached player; 0 disables
    #[serde(default = "default_autosave_secs")]
    pub autosave_secs: u64,
}

fn default_database() -> PathBuf {
    PathBuf::from("totalxp.db")
}

fn default_autosave_secs() -> u64 {
    300
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            autosave_secs: default_autosave_secs(),
        }
    }
}

/// Progress bar settings as written in the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Auto-hide the bar `timeout_secs` after the last update
    #[serde(default)]
    pub dynamic_mode: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_style")]
    pub style: String,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_color() -> String {
    "BLUE".to_string()
}

fn default_style() -> String {
    "SOLID".to_string()
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dynamic_mode: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            title: default_title(),
            color: default_color(),
            style: default_style(),
        }
    }
}

/// Resolved progress bar settings used at runtime
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSettings {
    pub enabled: bool,
    pub dynamic_mode: bool,
    pub timeout: Duration,
    pub title: String,
    pub max_rank_title: String,
    pub color: BarColor,
    pub style: BarStyle,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dynamic_mode: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            title: default_title(),
            max_rank_title: default_max_rank_title(),
            color: BarColor::default(),
            style: BarStyle::default(),
        }
    }
}

/// A single `[rewards.<threshold>]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    /// Legacy single command, used when `commands` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<String>,
}

impl RewardEntry {
    /// Decode one raw `[rewards.<threshold>]` value
    pub fn from_value(value: &toml::Value) -> Result<Self, ConfigError> {
        Ok(value.clone().try_into()?)
    }
}

/// Operator and broadcast message templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_max_rank_title")]
    pub max_rank_title: String,

    /// Overrides for operator replies, keyed like `xp-view`
    #[serde(flatten)]
    pub replies: BTreeMap<String, String>,
}

fn default_prefix() -> String {
    "&7[&aTotalXP&7] ".to_string()
}

fn default_max_rank_title() -> String {
    "&aMax Rank Reached".to_string()
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            max_rank_title: default_max_rank_title(),
            replies: BTreeMap::new(),
        }
    }
}

impl Messages {
    /// Reply template for `key`, falling back to the built-in English text
    pub fn reply(&self, key: &str) -> String {
        if let Some(text) = self.replies.get(key) {
            return text.clone();
        }
        let text = match key {
            "no-permission" => "&cYou do not have permission.",
            "player-not-found" => "&cPlayer not found.",
            "invalid-number" => "&cPlease enter a valid number.",
            "negative-amount" => "&cAmount must not be negative.",
            "not-online" => "&cThat player is not online.",
            "xp-view" => "&a%player% has &e%xp% &atotal XP.",
            "xp-set" => "&aSet &e%player%&a's XP to &e%amount%.",
            "xp-reset" => "&aReset XP of &e%player%&a.",
            "reload-done" => "&aTotal XP Rewards config and language reloaded.",
            "bar-shown" => "BossBar shown.",
            "bar-hidden" => "BossBar hidden.",
            _ => "",
        };
        text.to_string()
    }
}

/// Main TotalXP configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalXpConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub indicator: IndicatorConfig,

    #[serde(default)]
    pub messages: Messages,

    /// Keyed by threshold. Kept raw so one bad key or badly typed entry is
    /// skipped by the ladder instead of failing the whole file.
    #[serde(default)]
    pub rewards: BTreeMap<String, toml::Value>,
}

impl TotalXpConfig {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from file, or defaults if the file is absent
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Write defaults on first run. Returns true if a file was created.
    pub fn write_default_if_missing(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(&Self::default())?;
        fs::write(path, toml_string)?;
        info!("Wrote default config to {}", path.display());
        Ok(true)
    }

    /// Resolve colour and style names, falling back to defaults on bad input
    pub fn indicator_settings(&self) -> IndicatorSettings {
        let raw = &self.indicator;
        let color = BarColor::parse(&raw.color).unwrap_or_else(|| {
            warn!("Invalid bar color: {}. Defaulting to BLUE.", raw.color);
            BarColor::Blue
        });
        let style = BarStyle::parse(&raw.style).unwrap_or_else(|| {
            warn!("Invalid bar style: {}. Defaulting to SOLID.", raw.style);
            BarStyle::Solid
        });

        IndicatorSettings {
            enabled: raw.enabled,
            dynamic_mode: raw.dynamic_mode,
            timeout: Duration::from_secs(raw.timeout_secs),
            title: raw.title.clone(),
            max_rank_title: self.messages.max_rank_title.clone(),
            color,
            style,
        }
    }
}

/// Bring an older config file up to date in place.
///
/// Adds a missing `[indicator]` table, missing `dynamic_mode`/`timeout_secs`
/// keys, and a `name` for every reward lacking one. Unknown keys are left
/// untouched. Returns true if the file was rewritten.
pub fn migrate_file(path: &Path) -> Result<bool, ConfigError> {
    if !path.exists() {
        return Ok(false);
    }

    info!("Checking config for migration...");
    let contents = fs::read_to_string(path)?;
    let mut doc: toml::Table = contents.parse()?;
    let mut changed = false;

    match doc.get_mut("indicator").and_then(toml::Value::as_table_mut) {
        Some(indicator) => {
            if !indicator.contains_key("dynamic_mode") {
                info!("Migrating config: adding missing 'indicator.dynamic_mode'");
                indicator.insert("dynamic_mode".into(), toml::Value::Boolean(false));
                changed = true;
            }
            if !indicator.contains_key("timeout_secs") {
                info!("Migrating config: adding missing 'indicator.timeout_secs'");
                indicator.insert(
                    "timeout_secs".into(),
                    toml::Value::Integer(DEFAULT_TIMEOUT_SECS as i64),
                );
                changed = true;
            }
        }
        None => {
            info!("Migrating config: adding missing 'indicator' section");
            let section = toml::Value::try_from(IndicatorConfig::default())?;
            doc.insert("indicator".into(), section);
            changed = true;
        }
    }

    if let Some(rewards) = doc.get_mut("rewards").and_then(toml::Value::as_table_mut) {
        for (key, value) in rewards.iter_mut() {
            if let Some(reward) = value.as_table_mut() {
                if !reward.contains_key("name") {
                    info!("Migrating config: adding missing name for reward {}", key);
                    reward.insert("name".into(), toml::Value::String(format!("Rank {}", key)));
                    changed = true;
                }
            }
        }
    }

    if changed {
        fs::write(path, toml::to_string_pretty(&doc)?)?;
        info!("Config migration complete");
    } else {
        info!("Config is up to date");
    }
    Ok(changed)
}
