use std::path::{Path, PathBuf};

use score_indexer_core::{Error, Settings};
use serde::Deserialize;

fn default_mapping_path() -> PathBuf {
    PathBuf::from("schemas/scores.json")
}

fn default_coordination_key_prefix() -> String {
    "score-indexer".to_string()
}

fn default_rulesets() -> Vec<String> {
    vec!["osu".into(), "taiko".into(), "fruits".into(), "mania".into()]
}

/// Process-wide configuration: the core [`Settings`] bundle plus the
/// handful of options that belong to this binary rather than the pipeline
/// (the mapping file, the coordination key namespace, which rulesets the
/// Scheduler should run an Indexer for).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub settings: Settings,

    #[serde(default = "default_mapping_path")]
    pub mapping_path: PathBuf,

    #[serde(default = "default_coordination_key_prefix")]
    pub coordination_key_prefix: String,

    #[serde(default = "default_rulesets")]
    pub rulesets: Vec<String>,
}

impl AppConfig {
    /// Loads configuration from `path` (TOML or JSON, by extension), then
    /// from environment variables prefixed `SCOREIDX_` (e.g.
    /// `SCOREIDX_SCHEMA_TAG`), then validates. Mirrors the
    /// `config::Config::builder()` + `config::File::with_name` pattern used
    /// elsewhere in this codebase's test harness.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).required(true),
            );
        } else {
            builder = builder.add_source(config::File::with_name("score-indexer").required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SCOREIDX")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder.build().map_err(Error::config)?;
        let config: AppConfig = raw.try_deserialize().map_err(Error::config)?;
        config.settings.validate()?;

        Ok(config)
    }

    /// One [`AliasSpec`] per configured ruleset: `{alias_prefix}_{ruleset}`.
    pub fn alias_specs(&self) -> Vec<AliasSpec> {
        self.rulesets
            .iter()
            .map(|ruleset| AliasSpec {
                alias: score_indexer_core::Alias::new(format!(
                    "{}_{}",
                    self.settings.alias_prefix, ruleset
                )),
                ruleset: ruleset.clone(),
            })
            .collect()
    }
}

/// One alias target the Scheduler drives an Indexer for.
#[derive(Debug, Clone)]
pub struct AliasSpec {
    pub alias: score_indexer_core::Alias,
    pub ruleset: String,
}

/// CLI-level overrides applied on top of the loaded [`AppConfig`] before an
/// Indexer run, matching the `run` subcommand's flags to the Settings
/// fields they shadow.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub is_rebuild: Option<bool>,
    pub is_new: Option<bool>,
    pub is_prep_mode: Option<bool>,
    pub resume_from: Option<i64>,
    pub switch_on_complete: Option<bool>,
    pub read_delay_ms: Option<u64>,
}

impl RunOverrides {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(v) = self.is_rebuild {
            settings.is_rebuild = v;
        }
        if let Some(v) = self.is_new {
            settings.is_new = v;
        }
        if let Some(v) = self.is_prep_mode {
            settings.is_prep_mode = v;
        }
        if self.resume_from.is_some() {
            settings.resume_from = self.resume_from;
        }
        if let Some(v) = self.switch_on_complete {
            settings.switch_on_complete = v;
        }
        if let Some(v) = self.read_delay_ms {
            settings.read_delay_ms = v;
        }
    }
}
