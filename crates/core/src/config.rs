use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An inclusive ratio interval, expressed as fractions of 1.0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatioBand {
    pub lower: f64,
    pub upper: f64,
}

impl RatioBand {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub bands: BandConfig,
    pub split: SplitConfig,
    pub cache: CacheConfig,
    pub service: ServiceConfig,
}

/// Conversion-ratio bands per step depth. The numbers are simulation
/// defaults tuned to look like a believable funnel, not a contract; callers
/// with real event data replace the ratio source entirely.
#[derive(Clone, Debug, PartialEq)]
pub struct BandConfig {
    /// Depth 0. Every tracked visitor lands in the entry step.
    pub entry: RatioBand,
    /// Depth 1.
    pub early: RatioBand,
    /// Depth 2.
    pub middle: RatioBand,
    /// Depth 3 and beyond.
    pub late: RatioBand,
    /// Completion band for optional actions, regardless of depth.
    pub optional_action: RatioBand,
}

impl BandConfig {
    pub fn required_band_for_depth(&self, depth: usize) -> RatioBand {
        match depth {
            0 => self.entry,
            1 => self.early,
            2 => self.middle,
            _ => self.late,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SplitConfig {
    /// Band the per-variation raw weights are drawn from before
    /// normalization.
    pub weight: RatioBand,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    /// Artificial delay applied once at the call boundary, standing in for
    /// the network latency of a real analytics backend. Zero disables it.
    pub simulated_latency_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bands: BandConfig {
                entry: RatioBand::new(1.0, 1.0),
                early: RatioBand::new(0.65, 0.85),
                middle: RatioBand::new(0.60, 0.80),
                late: RatioBand::new(0.55, 0.75),
                optional_action: RatioBand::new(0.35, 0.60),
            },
            split: SplitConfig { weight: RatioBand::new(0.25, 0.75) },
            cache: CacheConfig { enabled: true, max_entries: 64 },
            service: ServiceConfig { simulated_latency_ms: 0 },
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub cache_enabled: Option<bool>,
    pub cache_max_entries: Option<usize>,
    pub simulated_latency_ms: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    bands: Option<BandPatch>,
    split: Option<SplitPatch>,
    cache: Option<CachePatch>,
    service: Option<ServicePatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BandPatch {
    entry: Option<RatioBand>,
    early: Option<RatioBand>,
    middle: Option<RatioBand>,
    late: Option<RatioBand>,
    optional_action: Option<RatioBand>,
}

#[derive(Debug, Default, Deserialize)]
struct SplitPatch {
    weight: Option<RatioBand>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    enabled: Option<bool>,
    max_entries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServicePatch {
    simulated_latency_ms: Option<u64>,
}

impl EngineConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("funnelkit.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(bands) = patch.bands {
            if let Some(entry) = bands.entry {
                self.bands.entry = entry;
            }
            if let Some(early) = bands.early {
                self.bands.early = early;
            }
            if let Some(middle) = bands.middle {
                self.bands.middle = middle;
            }
            if let Some(late) = bands.late {
                self.bands.late = late;
            }
            if let Some(optional_action) = bands.optional_action {
                self.bands.optional_action = optional_action;
            }
        }

        if let Some(split) = patch.split {
            if let Some(weight) = split.weight {
                self.split.weight = weight;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(enabled) = cache.enabled {
                self.cache.enabled = enabled;
            }
            if let Some(max_entries) = cache.max_entries {
                self.cache.max_entries = max_entries;
            }
        }

        if let Some(service) = patch.service {
            if let Some(simulated_latency_ms) = service.simulated_latency_ms {
                self.service.simulated_latency_ms = simulated_latency_ms;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FUNNELKIT_CACHE_ENABLED") {
            self.cache.enabled = parse_bool("FUNNELKIT_CACHE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("FUNNELKIT_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_usize("FUNNELKIT_CACHE_MAX_ENTRIES", &value)?;
        }
        if let Some(value) = read_env("FUNNELKIT_SERVICE_SIMULATED_LATENCY_MS") {
            self.service.simulated_latency_ms =
                parse_u64("FUNNELKIT_SERVICE_SIMULATED_LATENCY_MS", &value)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(cache_enabled) = overrides.cache_enabled {
            self.cache.enabled = cache_enabled;
        }
        if let Some(cache_max_entries) = overrides.cache_max_entries {
            self.cache.max_entries = cache_max_entries;
        }
        if let Some(simulated_latency_ms) = overrides.simulated_latency_ms {
            self.service.simulated_latency_ms = simulated_latency_ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_band("bands.entry", self.bands.entry)?;
        validate_band("bands.early", self.bands.early)?;
        validate_band("bands.middle", self.bands.middle)?;
        validate_band("bands.late", self.bands.late)?;
        validate_band("bands.optional_action", self.bands.optional_action)?;
        validate_band("split.weight", self.split.weight)?;

        if self.split.weight.upper <= 0.0 {
            return Err(ConfigError::Validation(
                "split.weight must admit a positive weight".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Validation(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_band(name: &str, band: RatioBand) -> Result<(), ConfigError> {
    if !band.lower.is_finite() || !band.upper.is_finite() {
        return Err(ConfigError::Validation(format!("{name} must be finite")));
    }
    if band.lower < 0.0 || band.upper > 1.0 || band.lower > band.upper {
        return Err(ConfigError::Validation(format!(
            "{name} must satisfy 0 <= lower <= upper <= 1 (got {} .. {})",
            band.lower, band.upper
        )));
    }
    Ok(())
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("funnelkit.toml"), PathBuf::from("config/funnelkit.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw).map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}
