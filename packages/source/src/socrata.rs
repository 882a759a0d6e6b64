//! Socrata SODA API incident feed.
//!
//! Pages through a dataset with `$limit`, `$offset`, `$order`, and a
//! `$where` clause that restricts the date column to the fetch window.
//! Field names are configurable since each portal names columns its own
//! way. Defaults target the Colombian national police theft dataset on
//! `datos.gov.co`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::parsing::{value_to_string, value_to_u32};
use crate::progress::ProgressCallback;
use crate::raw::{RawIncident, normalize_all};
use crate::retry::{RetryPolicy, send_json};
use crate::{FetchWindow, IncidentBatch, IncidentFeed, SourceError};

/// Loaded from the `[sources.incidents]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocrataConfig {
    /// Portal resource root, e.g. `"https://www.datos.gov.co/resource"`.
    pub base_url: String,
    /// Dataset identifier, e.g. `"9vha-vh9n"`.
    pub dataset: String,
    /// Tag stored on every incident.
    pub source_tag: String,
    pub date_field: String,
    pub type_field: String,
    pub zone_field: String,
    pub latitude_field: String,
    pub longitude_field: String,
    /// Column holding how many incidents a row stands for, if any.
    pub quantity_field: Option<String>,
    /// Extra `$where` condition ANDed with the date range.
    pub filter: Option<String>,
    pub page_size: u64,
    /// Stop after this many records.
    pub max_records: Option<u64>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for SocrataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.datos.gov.co/resource".to_string(),
            dataset: "9vha-vh9n".to_string(),
            source_tag: "SIEDCO".to_string(),
            date_field: "fecha".to_string(),
            type_field: "modalidad".to_string(),
            zone_field: "barrio".to_string(),
            latitude_field: "latitud".to_string(),
            longitude_field: "longitud".to_string(),
            quantity_field: Some("cantidad".to_string()),
            filter: Some(
                "departamento='CUNDINAMARCA' AND municipio='BOGOTÁ D.C.(CT)' \
                 AND modalidad IN ('HURTO MOTOCICLETAS', 'HURTO BICICLETAS')"
                    .to_string(),
            ),
            page_size: 10_000,
            max_records: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl SocrataConfig {
    /// `{base_url}/{dataset}.json`
    #[must_use]
    pub fn resource_url(&self) -> String {
        format!(
            "{}/{}.json",
            self.base_url.trim_end_matches('/'),
            self.dataset
        )
    }

    /// The `$where` clause for a window.
    #[must_use]
    pub fn where_clause(&self, window: &FetchWindow) -> String {
        let start = window.start.format("%Y-%m-%dT%H:%M:%S");
        let end = window.end.format("%Y-%m-%dT%H:%M:%S");
        let range = format!("{} between '{start}' and '{end}'", self.date_field);
        match self.filter.as_deref().map(str::trim) {
            Some(filter) if !filter.is_empty() => format!("{filter} AND {range}"),
            _ => range,
        }
    }

    /// Maps one JSON record to a [`RawIncident`] using the configured
    /// field names.
    #[must_use]
    pub fn to_raw(&self, record: &Map<String, Value>) -> RawIncident {
        let text = |field: &str| record.get(field).and_then(value_to_string);
        RawIncident {
            occurred_at: text(&self.date_field),
            incident_type: text(&self.type_field),
            zone_hint: text(&self.zone_field),
            latitude: text(&self.latitude_field),
            longitude: text(&self.longitude_field),
            quantity: self
                .quantity_field
                .as_deref()
                .and_then(|f| record.get(f))
                .and_then(value_to_u32),
        }
    }
}

/// Paginated Socrata incident feed.
pub struct SocrataFeed {
    config: SocrataConfig,
    client: reqwest::Client,
}

impl SocrataFeed {
    /// Creates a feed with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(config: SocrataConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl IncidentFeed for SocrataFeed {
    fn id(&self) -> &str {
        &self.config.source_tag
    }

    async fn fetch(
        &self,
        window: &FetchWindow,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<IncidentBatch, SourceError> {
        let url = self.config.resource_url();
        let where_clause = self.config.where_clause(window);
        let order = format!("{} DESC", self.config.date_field);
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            ..RetryPolicy::default()
        };

        let fetch_limit = self.config.max_records.unwrap_or(u64::MAX);
        let mut raws: Vec<RawIncident> = Vec::new();
        let mut offset: u64 = 0;

        progress.set_message(format!("Fetching {}", self.config.source_tag));

        loop {
            let remaining = fetch_limit.saturating_sub(offset);
            if remaining == 0 {
                break;
            }
            let page_limit = remaining.min(self.config.page_size.max(1));
            let params = [
                ("$limit", page_limit.to_string()),
                ("$offset", offset.to_string()),
                ("$order", order.clone()),
                ("$where", where_clause.clone()),
            ];

            log::info!(
                "Fetching {} data: offset={offset}, limit={page_limit}",
                self.config.source_tag
            );
            let body = send_json(|| self.client.get(&url).query(&params[..]), &policy).await?;
            let Value::Array(records) = body else {
                return Err(SourceError::Normalization {
                    message: format!("Expected a JSON array from {url}"),
                });
            };

            let count = records.len() as u64;
            if count == 0 {
                break;
            }

            raws.extend(
                records
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|record| self.config.to_raw(record)),
            );
            progress.inc(count);
            offset += count;

            if count < page_limit {
                break;
            }
        }

        log::info!(
            "Downloaded {} {} records total",
            raws.len(),
            self.config.source_tag
        );

        let (incidents, skipped) = normalize_all(&raws, &self.config.source_tag);
        progress.finish(format!("{} incidents", incidents.len()));

        Ok(IncidentBatch { incidents, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Utc};
    use serde_json::json;

    fn window() -> FetchWindow {
        FetchWindow {
            start: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 5, 30, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn builds_resource_url() {
        let config = SocrataConfig {
            base_url: "https://example.org/resource/".to_string(),
            ..SocrataConfig::default()
        };
        assert_eq!(config.resource_url(), "https://example.org/resource/9vha-vh9n.json");
    }

    #[test]
    fn where_clause_combines_filter_and_range() {
        let config = SocrataConfig {
            filter: Some("modalidad = 'HURTO BICICLETAS'".to_string()),
            ..SocrataConfig::default()
        };
        assert_eq!(
            config.where_clause(&window()),
            "modalidad = 'HURTO BICICLETAS' AND fecha between \
             '2025-03-01T00:00:00' and '2025-05-30T00:00:00'"
        );

        let bare = SocrataConfig {
            filter: None,
            ..SocrataConfig::default()
        };
        assert!(bare.where_clause(&window()).starts_with("fecha between"));
    }

    #[test]
    fn maps_record_fields() {
        let config = SocrataConfig::default();
        let record = json!({
            "fecha": "2025-04-02T00:00:00.000",
            "modalidad": "HURTO BICICLETAS",
            "barrio": "CASTILLA",
            "latitud": 4.64,
            "longitud": "-74.14",
            "cantidad": "2"
        });

        let raw = config.to_raw(record.as_object().unwrap());
        assert_eq!(raw.zone_hint.as_deref(), Some("CASTILLA"));
        assert_eq!(raw.latitude.as_deref(), Some("4.64"));
        assert_eq!(raw.quantity, Some(2));
    }
}
