//! Process settings: an optional `stockmove.toml` plus `STOCKMOVE__*`
//! environment overrides (e.g. `STOCKMOVE__ENGINE__BATCH_REUSE=allow_after_terminal`).

use anyhow::Context;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use stockmove_observability::LogSettings;
use stockmove_transfers::BatchReusePolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Whether a batch number closed by an ACCEPTED/RESOLVED transaction may be claimed again.
    pub batch_reuse: BatchReusePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub logging: LogSettings,
}

impl Settings {
    /// Load from `stockmove.toml` (if present) and the environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("stockmove")
    }

    /// Load from `<file_stem>.{toml,json,yaml,...}` (if present) and the environment.
    pub fn load_from(file_stem: &str) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(file_stem).required(false))
            .add_source(
                Environment::with_prefix("STOCKMOVE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read settings from '{file_stem}'"))?;

        settings
            .try_deserialize()
            .context("invalid stockmove settings")
    }
}

/// Process entry point: load settings from `<file_stem>` and the environment,
/// then install the tracing subscriber they describe.
pub fn bootstrap(file_stem: &str) -> anyhow::Result<Settings> {
    let settings = Settings::load_from(file_stem)?;
    stockmove_observability::init(&settings.logging);
    tracing::info!(
        batch_reuse = ?settings.engine.batch_reuse,
        log_level = %settings.logging.level,
        "stockmove settings loaded"
    );
    Ok(settings)
}
