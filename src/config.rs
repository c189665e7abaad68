//! Ingestion configuration.
//!
//! Settings come from three layers, later layers winning:
//!
//! ```text
//! stock defaults  →  photo-ingest.toml (or --config FILE)  →  CLI flags
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional except the drop/append choice.
//!
//! source = "photos"               # Directory tree to ingest
//! destination = "static/photos"   # Where staged images end up
//! batch_size = 1000               # Documents per bulk insert (> 0)
//! drop_existing = true            # true = drop collection first, false = append
//! dataset = "prod"                # "prod" → photos_prod, "test" → photos_test
//! # collection = "photos_prod"    # Explicit collection, overrides dataset
//! skip_existing_names = false     # Append mode: skip names already recorded
//!
//! [database]
//! path = "photo-ingest.db"
//!
//! [naming]
//! strategy = "preserve"           # "preserve" or "rewrite"
//! on_conflict = "overwrite"       # "overwrite" or "prefer_richer"
//!
//! [staging]
//! mode = "copy"                   # "copy" or "move"
//! replace_destination = false
//! delete_rejected = false
//!
//! [metadata]
//! require_metadata = true
//! nested_cities = false
//! min_year = 1970
//! reject_future_years = true
//! year_options = false
//! # seed = 42
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::metadata::{CityDepth, MIN_YEAR, YearPolicy, current_year};
use crate::naming::{ConflictPolicy, NamingStrategy};
use crate::pipeline::{PipelineOptions, YearOptions};
use crate::stage::{DocumentPolicy, StageMode};
use crate::writer::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "photo-ingest.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full ingestion configuration as read from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Accepts `1000` or `"1000"` so values from text sources validate the same way.
    pub batch_size: BatchSize,
    /// No default: must be set here or via `--drop` / `--append`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_existing: Option<bool>,
    pub dataset: Dataset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub skip_existing_names: bool,
    pub database: DatabaseConfig,
    pub naming: NamingConfig,
    pub staging: StagingConfig,
    pub metadata: MetadataConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("photos"),
            destination: PathBuf::from("static/photos"),
            batch_size: BatchSize::Count(DEFAULT_BATCH_SIZE as i64),
            drop_existing: None,
            dataset: Dataset::default(),
            collection: None,
            skip_existing_names: false,
            database: DatabaseConfig::default(),
            naming: NamingConfig::default(),
            staging: StagingConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }
}

/// Batch size as written by the user, validated by [`BatchSize::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchSize {
    Count(i64),
    Text(String),
}

impl BatchSize {
    pub fn resolve(&self) -> Result<NonZeroUsize, ConfigError> {
        match self {
            Self::Count(n) => usize::try_from(*n)
                .ok()
                .and_then(NonZeroUsize::new)
                .ok_or_else(|| invalid_batch_size(&n.to_string())),
            Self::Text(s) => parse_batch_size(s),
        }
    }
}

/// Parse a batch size from text. Must be a positive integer.
pub fn parse_batch_size(raw: &str) -> Result<NonZeroUsize, ConfigError> {
    raw.trim()
        .parse::<NonZeroUsize>()
        .map_err(|_| invalid_batch_size(raw))
}

fn invalid_batch_size(raw: &str) -> ConfigError {
    ConfigError::Validation(format!(
        "batch_size must be a positive integer, got '{raw}'"
    ))
}

/// Which dataset's collection to write when none is named explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    #[default]
    Prod,
    Test,
}

impl Dataset {
    pub fn collection(self) -> &'static str {
        match self {
            Self::Prod => "photos_prod",
            Self::Test => "photos_test",
        }
    }
}

impl std::str::FromStr for Dataset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prod" => Ok(Self::Prod),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::Validation(format!(
                "dataset must be 'prod' or 'test', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file holding the document collections.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("photo-ingest.db"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyName {
    #[default]
    Preserve,
    Rewrite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    pub strategy: StrategyName,
    /// Only used by the preserve strategy.
    pub on_conflict: ConflictPolicy,
}

impl NamingConfig {
    pub fn strategy(&self) -> NamingStrategy {
        match self.strategy {
            StrategyName::Preserve => NamingStrategy::PreserveName(self.on_conflict),
            StrategyName::Rewrite => NamingStrategy::RewriteName,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagingConfig {
    pub mode: StageMode,
    /// Clear the destination and replace it with this run's files.
    pub replace_destination: bool,
    /// Delete non-image files from the source tree instead of skipping them.
    pub delete_rejected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    /// Drop documents with neither a year nor a city.
    pub require_metadata: bool,
    /// Take the city from the first folder at any depth, not just depth one.
    pub nested_cities: bool,
    pub min_year: i32,
    /// Ignore date tokens later than the current year.
    pub reject_future_years: bool,
    /// Attach shuffled `yearOptions` to documents with a year.
    pub year_options: bool,
    /// Seed for `yearOptions` shuffling; random when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            require_metadata: true,
            nested_cities: false,
            min_year: MIN_YEAR,
            reject_future_years: true,
            year_options: false,
            seed: None,
        }
    }
}

impl MetadataConfig {
    pub fn document_policy(&self, current_year: i32) -> DocumentPolicy {
        DocumentPolicy {
            years: YearPolicy {
                min: self.min_year,
                max: self.reject_future_years.then_some(current_year),
            },
            city_depth: if self.nested_cities {
                CityDepth::Any
            } else {
                CityDepth::DepthOne
            },
            require_metadata: self.require_metadata,
        }
    }
}

/// Values given on the command line, applied over the file config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub batch_size: Option<String>,
    pub drop_existing: Option<bool>,
    pub collection: Option<String>,
    pub dataset: Option<Dataset>,
    pub database: Option<PathBuf>,
    pub strategy: Option<StrategyName>,
    pub stage_mode: Option<StageMode>,
    pub replace_destination: bool,
    pub delete_rejected: bool,
}

impl IngestConfig {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(source) = overrides.source {
            self.source = source;
        }
        if let Some(destination) = overrides.destination {
            self.destination = destination;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = BatchSize::Text(batch_size);
        }
        if let Some(drop_existing) = overrides.drop_existing {
            self.drop_existing = Some(drop_existing);
        }
        if let Some(collection) = overrides.collection {
            self.collection = Some(collection);
        }
        if let Some(dataset) = overrides.dataset {
            self.dataset = dataset;
        }
        if let Some(database) = overrides.database {
            self.database.path = database;
        }
        if let Some(strategy) = overrides.strategy {
            self.naming.strategy = strategy;
        }
        if let Some(mode) = overrides.stage_mode {
            self.staging.mode = mode;
        }
        self.staging.replace_destination |= overrides.replace_destination;
        self.staging.delete_rejected |= overrides.delete_rejected;
    }

    /// Target collection: explicit name, else derived from the dataset.
    pub fn collection_name(&self) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| self.dataset.collection().to_string())
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batch_size.resolve()?;
        if self.collection.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "collection must not be empty".into(),
            ));
        }
        if self.source.as_os_str().is_empty() || self.destination.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "source and destination must both be set".into(),
            ));
        }
        Ok(())
    }

    /// Lower into the plain values the pipeline consumes.
    ///
    /// Fails when the drop/append choice was never made.
    pub fn to_options(&self) -> Result<PipelineOptions, ConfigError> {
        self.validate()?;
        let drop_existing = self.drop_existing.ok_or_else(|| {
            ConfigError::Validation(
                "drop_existing is not set: pass --drop or --append, or set drop_existing in the config file"
                    .into(),
            )
        })?;
        Ok(PipelineOptions {
            source: self.source.clone(),
            destination: self.destination.clone(),
            batch_size: self.batch_size.resolve()?,
            drop_existing,
            collection: self.collection_name(),
            naming: self.naming.strategy(),
            stage_mode: self.staging.mode,
            replace_destination: self.staging.replace_destination,
            delete_rejected: self.staging.delete_rejected,
            documents: self.metadata.document_policy(current_year()),
            skip_existing_names: self.skip_existing_names,
            year_options: self.metadata.year_options.then_some(YearOptions {
                seed: self.metadata.seed,
            }),
        })
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(IngestConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<IngestConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: IngestConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, which must exist.
pub fn load_config(path: &Path) -> Result<IngestConfig, ConfigError> {
    let overlay = load_raw_config(path)?;
    resolve_config(stock_defaults_value(), Some(overlay))
}

/// Load config from `path` if it exists, stock defaults otherwise.
pub fn load_config_or_default(path: &Path) -> Result<IngestConfig, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        resolve_config(stock_defaults_value(), None)
    }
}

/// Returns a fully-commented stock `photo-ingest.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Photo Ingest Configuration
# ==========================
# All settings are optional except drop_existing, which may instead be
# given on the command line with --drop or --append.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Directory tree to ingest.
source = "photos"

# Directory that receives the staged images. Must not be the source
# directory or nested inside it (or vice versa).
destination = "static/photos"

# Documents per bulk insert. Must be a positive integer.
batch_size = 1000

# true  = delete every document in the collection before inserting
# false = add new documents alongside existing ones
# drop_existing = true

# Dataset selects the collection when `collection` is not set:
#   prod -> photos_prod, test -> photos_test
dataset = "prod"
# collection = "photos_prod"

# Append mode only: skip (preserve naming) or avoid (rewrite naming)
# names that are already recorded in the collection.
skip_existing_names = false

# ---------------------------------------------------------------------------
# Document store
# ---------------------------------------------------------------------------
[database]
path = "photo-ingest.db"

# ---------------------------------------------------------------------------
# Destination naming
# ---------------------------------------------------------------------------
[naming]
# preserve: keep the source filename
# rewrite:  {city}_{year}_{n}.ext with a per-run counter
strategy = "preserve"

# When a preserved name already exists in the destination:
# overwrite:     replace it
# prefer_richer: keep it if its name carries more metadata
on_conflict = "overwrite"

# ---------------------------------------------------------------------------
# Staging
# ---------------------------------------------------------------------------
[staging]
# copy: leave the source untouched; move: remove it once staged
mode = "copy"

# Replace the destination contents with exactly this run's images.
replace_destination = false

# Delete non-image files from the source tree instead of skipping them.
delete_rejected = false

# ---------------------------------------------------------------------------
# Metadata extraction
# ---------------------------------------------------------------------------
[metadata]
# Drop images whose filename has no date and that sit directly in the
# source root (no year and no city).
require_metadata = true

# false: city only for source/<city>/file.jpg
# true:  city is the first folder at any depth
nested_cities = false

# Date tokens (YYYYMMDD) before this year are ignored.
min_year = 1970

# Ignore date tokens later than the current year.
reject_future_years = true

# Attach yearOptions (true year + 3 decoys within 4 years, shuffled).
year_options = false
# seed = 42
"##
}
