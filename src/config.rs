//! Resolver configuration
//!
//! Passed explicitly to the resolver and carried by every coverage, so tests
//! can pin thresholds without touching process-wide state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{ResolutionError, Result};
use crate::prioritizer::{RankingStrategy, DEFAULT_RANKING_STRATEGY};

/// Coverage proportions that decide whether a resolution is usable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageThresholds {
    /// Below this a coverage is empty.
    pub empty: f64,
    /// At or above this a candidate is worth keeping.
    pub relevant: f64,
    /// At or above this nothing else needs to be resolved.
    pub complete: f64,
}

impl Default for CoverageThresholds {
    fn default() -> Self {
        Self {
            empty: 0.01,
            relevant: 0.25,
            complete: 0.95,
        }
    }
}

impl CoverageThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("empty", self.empty), ("relevant", self.relevant), ("complete", self.complete)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ResolutionError::Config(format!("{name} threshold {value} is outside [0, 1]")));
            }
        }
        if self.empty > self.relevant || self.relevant > self.complete {
            return Err(ResolutionError::Config(format!(
                "thresholds must satisfy empty <= relevant <= complete (got {} / {} / {})",
                self.empty, self.relevant, self.complete
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub thresholds: CoverageThresholds,
    /// Minimum union gain for a relevant candidate to be merged.
    pub min_gain: f64,
    /// `im:<criterion> <weight>` pairs, ascending weight = higher priority.
    pub ranking_strategy: String,
    /// Sub-resolutions deeper than this resolve empty.
    pub max_depth: usize,
    /// Worker pool size of the resolver service.
    pub max_concurrent_resolutions: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            thresholds: CoverageThresholds::default(),
            min_gain: 0.0,
            ranking_strategy: DEFAULT_RANKING_STRATEGY.to_string(),
            max_depth: 32,
            max_concurrent_resolutions: 4,
        }
    }
}

impl ResolverConfig {
    pub fn with_thresholds(mut self, thresholds: CoverageThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_ranking_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.ranking_strategy = strategy.into();
        self
    }

    pub fn with_min_gain(mut self, min_gain: f64) -> Self {
        self.min_gain = min_gain;
        self
    }

    /// Load from a JSON or YAML file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ResolutionError::Config(format!("cannot read {}: {e}", path.display())))?;

        let config: ResolverConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
                .map_err(|e| ResolutionError::Config(format!("{}: {e}", path.display())))?,
            _ => serde_json::from_str(&text)
                .map_err(|e| ResolutionError::Config(format!("{}: {e}", path.display())))?,
        };

        debug!("Loaded resolver configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Apply `RESOLVER_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        fn parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
            match std::env::var(key) {
                Ok(raw) => raw
                    .trim()
                    .parse::<T>()
                    .map(Some)
                    .map_err(|_| ResolutionError::Config(format!("{key}={raw} is not a valid value"))),
                Err(_) => Ok(None),
            }
        }

        if let Some(v) = parse("RESOLVER_EMPTY_THRESHOLD")? {
            self.thresholds.empty = v;
        }
        if let Some(v) = parse("RESOLVER_RELEVANT_THRESHOLD")? {
            self.thresholds.relevant = v;
        }
        if let Some(v) = parse("RESOLVER_COMPLETE_THRESHOLD")? {
            self.thresholds.complete = v;
        }
        if let Some(v) = parse::<String>("RESOLVER_RANKING_STRATEGY")? {
            self.ranking_strategy = v;
        }
        if let Some(v) = parse("RESOLVER_MAX_DEPTH")? {
            self.max_depth = v;
        }
        if let Some(v) = parse("RESOLVER_WORKERS")? {
            self.max_concurrent_resolutions = v;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if !(0.0..=1.0).contains(&self.min_gain) {
            return Err(ResolutionError::Config(format!("min_gain {} is outside [0, 1]", self.min_gain)));
        }
        if self.max_concurrent_resolutions == 0 {
            return Err(ResolutionError::Config("max_concurrent_resolutions must be positive".into()));
        }
        self.ranking()?;
        Ok(())
    }

    pub fn ranking(&self) -> Result<RankingStrategy> {
        RankingStrategy::parse(&self.ranking_strategy)
    }
}
