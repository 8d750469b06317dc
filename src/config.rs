/// Analyzer configuration, persisted as TOML in the user's config directory.
///
/// Typically:
///   $XDG_CONFIG_HOME/combat-ledger-analyzer/config.toml
///   (falls back to ~/.config, or %APPDATA% on Windows)
///
/// Every field has a default, so a missing file or a partial file both load.
///
/// Example:
///
///   modules          = ["essence_font", "healing_done"]
///   max_events       = 500000
///   run_timeout_secs = 10
///
///   [log]
///   level = "debug"
///
///   [thresholds.essence_font]
///   minor = 16
use crate::{context::RunContext, specs, threshold::ThresholdOverrides};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory for the daily rolling log file. None = stderr only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Default `EnvFilter` level for this crate; `RUST_LOG` still wins.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String { "info".to_owned() }

impl Default for LogConfig {
    fn default() -> Self {
        Self { directory: None, level: default_level() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Module ids to run. Empty = derive from the observed actor's spec profile.
    #[serde(default)]
    pub modules: Vec<String>,

    /// Longest event stream a run will dispatch.
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Wall-clock budget per run in a batch.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    #[serde(default)]
    pub log: LogConfig,

    /// Per-module severity band overrides, keyed by module id.
    #[serde(default)]
    pub thresholds: ThresholdOverrides,
}

fn default_max_events() -> usize { 2_000_000 }
fn default_run_timeout_secs() -> u64 { 30 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            modules:          Vec::new(),
            max_events:       default_max_events(),
            run_timeout_secs: default_run_timeout_secs(),
            log:              LogConfig::default(),
            thresholds:       ThresholdOverrides::new(),
        }
    }
}

impl AnalysisConfig {
    /// Modules to request for `ctx`: the configured list, else the spec
    /// profile of the observed combatant, else the shared list.
    pub fn requested_modules(&self, ctx: &RunContext) -> Vec<String> {
        if !self.modules.is_empty() {
            return self.modules.clone();
        }
        match ctx.selected_combatant() {
            Some(c) => specs::modules_for(&c.class, &c.spec),
            None => specs::shared_modules(),
        }
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn default_config_dir() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("APPDATA").map(PathBuf::from))
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("combat-ledger-analyzer")
}

pub fn load_or_default(config_dir: &Path) -> Result<AnalysisConfig> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let cfg: AnalysisConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error in {}: {}", path.display(), e))?;
        Ok(cfg)
    } else {
        Ok(AnalysisConfig::default())
    }
}

pub fn save(config: &AnalysisConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join(CONFIG_FILE), raw)?;
    Ok(())
}
