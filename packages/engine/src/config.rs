//! Engine configuration.
//!
//! One TOML document with a section per crate. The built-in document
//! ([`DEFAULT_CONFIG`]) is embedded at compile time; a file given on the
//! command line or through `ZONE_SAFETY_CONFIG` replaces it. Sections and
//! keys missing from either fall back to each section's `Default`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zone_safety_database::StorageConfig;
use zone_safety_etl::{EtlConfig, PipelineSettings};
use zone_safety_insights::InsightsConfig;
use zone_safety_metrics::AggregationConfig;
use zone_safety_recommend::RecommendationConfig;
use zone_safety_scoring::ScoringConfig;
use zone_safety_source::SourcesConfig;

/// The built-in configuration document.
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Path of a config file to load instead of [`DEFAULT_CONFIG`].
pub const CONFIG_ENV: &str = "ZONE_SAFETY_CONFIG";

/// Overrides `etl.concurrency`.
pub const CONCURRENCY_ENV: &str = "ZONE_SAFETY_CONCURRENCY";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The document is not valid TOML for [`EngineConfig`].
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override has an unusable value.
    #[error("Invalid value for {name}: {message}")]
    Env {
        name: &'static str,
        message: String,
    },
}

/// Every configuration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub etl: EtlConfig,
    pub aggregation: AggregationConfig,
    pub scoring: ScoringConfig,
    pub recommendations: RecommendationConfig,
    pub insights: InsightsConfig,
    pub sources: SourcesConfig,
}

impl EngineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is malformed.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Loads `path`, else `$ZONE_SAFETY_CONFIG`, else the built-in
    /// document, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the chosen document cannot be loaded or
    /// an override is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::from_toml(DEFAULT_CONFIG)?,
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies environment-style overrides read through `lookup`.
    ///
    /// `ZONE_SAFETY_DATA_DIR` is not handled here; the storage layer reads
    /// it when resolving the default database path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if an override cannot be parsed.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(CONCURRENCY_ENV).filter(|v| !v.trim().is_empty()) {
            let concurrency: usize = value.trim().parse().map_err(|_| ConfigError::Env {
                name: CONCURRENCY_ENV,
                message: format!("expected a positive integer, got {value:?}"),
            })?;
            if concurrency == 0 {
                return Err(ConfigError::Env {
                    name: CONCURRENCY_ENV,
                    message: "must be at least 1".to_string(),
                });
            }
            self.etl.concurrency = concurrency;
        }
        Ok(())
    }

    /// The sections the ETL pipeline computes with.
    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            scoring: self.scoring,
            aggregation: self.aggregation.clone(),
            recommendations: self.recommendations.clone(),
            etl: self.etl.clone(),
        }
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`toml::ser::Error`] if a value cannot be represented.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_safety_insights::ClusterCount;
    use zone_safety_zone_models::ZoneKind;

    #[test]
    fn builtin_document_matches_defaults() {
        let config = EngineConfig::from_toml(DEFAULT_CONFIG).unwrap();

        assert_eq!(config.scoring, ScoringConfig::default());
        assert_eq!(config.aggregation, AggregationConfig::default());
        assert_eq!(config.recommendations, RecommendationConfig::default());
        assert_eq!(config.insights, InsightsConfig::default());
        assert_eq!(config.etl, EtlConfig::default());
        assert_eq!(config.sources.incidents.dataset, "9vha-vh9n");
        assert_eq!(config.sources.zones.len(), 1);
        assert_eq!(config.sources.zones[0].kind, ZoneKind::TopLevel);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [scoring]
            theft_weight = 3.0

            [insights.clustering]
            k = "auto"
            "#,
        )
        .unwrap();

        assert!((config.scoring.theft_weight - 3.0).abs() < f64::EPSILON);
        assert!((config.scoring.theft_cap - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.insights.clustering.k, ClusterCount::Auto);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn rejects_malformed_document() {
        assert!(matches!(
            EngineConfig::from_toml("[scoring]\ntheft_weight = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn concurrency_override() {
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|name| (name == CONCURRENCY_ENV).then(|| "3".to_string()))
            .unwrap();
        assert_eq!(config.etl.concurrency, 3);
        assert_eq!(config.pipeline_settings().etl.concurrency, 3);

        for bad in ["0", "many"] {
            let err = config
                .apply_overrides(|_| Some(bad.to_string()))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Env { name: CONCURRENCY_ENV, .. }));
        }
        assert_eq!(config.etl.concurrency, 3);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/zone_safety.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/zone_safety.toml"));
    }

    #[test]
    fn renders_back_to_toml() {
        let config = EngineConfig::from_toml(DEFAULT_CONFIG).unwrap();
        let text = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }
}
