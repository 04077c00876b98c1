//! Porter configuration (~/.porter/config.yaml)

mod loader;

pub use loader::ConfigLoader;

use crate::error::{Error, Result};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time allowed for a plugin to start
pub const DEFAULT_PLUGIN_START_TIMEOUT: Duration = Duration::from_secs(1);

/// Default time allowed for a plugin to stop before it is killed
pub const DEFAULT_PLUGIN_STOP_TIMEOUT: Duration = Duration::from_millis(100);

/// A named plugin configuration, e.g. an entry under `signing:`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    /// Plugin key such as `signing.cosign`
    pub plugin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Porter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PorterConfig {
    /// Porter home, where mixins and plugins are installed
    pub home_dir: Utf8PathBuf,

    /// Overrides `<home>/mixins`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixins_dir: Option<Utf8PathBuf>,

    /// Overrides `<home>/plugins`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<Utf8PathBuf>,

    pub debug: bool,

    /// Name of the `signing` entry to use by default
    pub default_signing: String,

    /// Plugin key used when no named signing entry is selected
    pub default_signing_plugin: String,

    pub signing: Vec<PluginConfig>,

    pub default_sbom_generator: String,

    pub default_sbom_generator_plugin: String,

    pub sbom_generators: Vec<PluginConfig>,

    #[serde(with = "duration_str")]
    pub plugin_start_timeout: Duration,

    #[serde(with = "duration_str")]
    pub plugin_stop_timeout: Duration,
}

impl Default for PorterConfig {
    fn default() -> Self {
        Self {
            home_dir: Utf8PathBuf::from(".porter"),
            mixins_dir: None,
            plugins_dir: None,
            debug: false,
            default_signing: String::new(),
            default_signing_plugin: String::new(),
            signing: Vec::new(),
            default_sbom_generator: String::new(),
            default_sbom_generator_plugin: String::new(),
            sbom_generators: Vec::new(),
            plugin_start_timeout: DEFAULT_PLUGIN_START_TIMEOUT,
            plugin_stop_timeout: DEFAULT_PLUGIN_STOP_TIMEOUT,
        }
    }
}

impl PorterConfig {
    /// Directory holding installed mixins
    pub fn mixins_dir(&self) -> Utf8PathBuf {
        self.mixins_dir
            .clone()
            .unwrap_or_else(|| self.home_dir.join("mixins"))
    }

    /// Directory holding installed plugins
    pub fn plugins_dir(&self) -> Utf8PathBuf {
        self.plugins_dir
            .clone()
            .unwrap_or_else(|| self.home_dir.join("plugins"))
    }

    /// Look up a named signing configuration
    pub fn signing_config(&self, name: &str) -> Option<&PluginConfig> {
        self.signing.iter().find(|p| p.name == name)
    }

    /// Look up a named SBOM generator configuration
    pub fn sbom_generator_config(&self, name: &str) -> Option<&PluginConfig> {
        self.sbom_generators.iter().find(|p| p.name == name)
    }
}

/// Parse a Go-style duration such as `1s`, `100ms`, `1m30s` or `2h`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::invalid_config("duration is empty"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || Error::invalid_config(format!("invalid duration {:?}", s));
    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let amount = &rest[..digits];
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_nanos: u128 = match &rest[..unit_len] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return Err(invalid()),
        };

        let (whole, frac) = amount.split_once('.').unwrap_or((amount, ""));
        if frac.contains('.') {
            return Err(invalid());
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole * unit_nanos;
        if !frac.is_empty() {
            let frac_value: u128 = frac.parse().map_err(|_| invalid())?;
            nanos += frac_value * unit_nanos / 10u128.pow(frac.len() as u32);
        }
        let nanos = u64::try_from(nanos).map_err(|_| invalid())?;
        total += Duration::from_nanos(nanos);
        rest = &rest[unit_len..];
    }
    Ok(total)
}

/// Format a duration the way [`parse_duration`] reads it
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else if d.as_nanos() % 1_000_000 == 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}ns", d.as_nanos())
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
