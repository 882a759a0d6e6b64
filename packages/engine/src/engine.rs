//! [`ZoneSafetyEngine`]: runs jobs and answers queries over their output.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zone_safety_database::{DuckDbStore, SafetyStore};
use zone_safety_etl::{Feeds, JobCoordinator, JobHandle, RunProgress};
use zone_safety_etl_models::{EtlJob, RunRequest};
use zone_safety_insights::InsightsConfig;
use zone_safety_insights_models::{
    AnomalyReport, Availability, ClusterReport, ForecastOverview, Section, StrategicInsights,
    TrendForecast,
};
use zone_safety_metrics_models::{RiskTier, ZoneSafetyScore};
use zone_safety_zone_models::{ZoneCatalog, ZoneKind};

use crate::cache::ScoreCache;
use crate::catalog::CatalogHandle;
use crate::config::EngineConfig;
use crate::{EngineError, feeds};

/// Forecasts read score rows this far back from the analysis date.
pub const FORECAST_LOOKBACK_DAYS: i64 = 365;

/// A zone with its most recent score, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneOverview {
    pub code: String,
    pub name: String,
    pub kind: ZoneKind,
    pub parent_code: Option<String>,
    pub area_km2: f64,
    pub calculation_date: Option<NaiveDate>,
    pub safety_score: Option<f64>,
    pub risk_tier: Option<RiskTier>,
}

/// Filter and paging for [`ZoneSafetyEngine::list_zones`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneQuery {
    /// Keep only zones whose latest score has this tier.
    pub risk_tier: Option<RiskTier>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ZoneQuery {
    #[must_use]
    pub const fn with_risk_tier(mut self, tier: RiskTier) -> Self {
        self.risk_tier = Some(tier);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// What the store holds, for picking dates to run or analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataAvailability {
    pub incident_count: u64,
    pub latest_incident_at: Option<DateTime<Utc>>,
    /// The lookback window ending on the newest stored incident's date.
    pub recent_window: Option<(NaiveDate, NaiveDate)>,
    pub zone_count: usize,
    pub latest_calculation_date: Option<NaiveDate>,
    pub analysis_date: Option<NaiveDate>,
}

/// Entry point for running jobs and querying their results.
pub struct ZoneSafetyEngine {
    store: Arc<dyn SafetyStore>,
    coordinator: JobCoordinator,
    cache: Arc<ScoreCache>,
    catalog: Arc<CatalogHandle>,
    insights: InsightsConfig,
}

impl ZoneSafetyEngine {
    /// Opens the configured store and feeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the database cannot be opened, a feed
    /// cannot be built, or the stored catalog is invalid.
    pub fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        let store = Arc::new(DuckDbStore::from_config(&config.storage)?);
        let feeds = feeds::from_config(&config.sources)?;
        Self::new(store, feeds, config)
    }

    /// Builds an engine over an existing store and feeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the stored catalog cannot be loaded.
    pub fn new(
        store: Arc<dyn SafetyStore>,
        feeds: Feeds,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let cache = Arc::new(ScoreCache::new());
        let catalog = Arc::new(CatalogHandle::load(store.clone())?);

        let coordinator = JobCoordinator::new(feeds, store.clone(), config.pipeline_settings())
            .with_listener(cache.clone())
            .with_listener(catalog.clone());

        Ok(Self {
            store,
            coordinator,
            cache,
            catalog,
            insights: config.insights.clone(),
        })
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<ZoneCatalog> {
        self.catalog.current()
    }

    #[must_use]
    pub fn cache(&self) -> &ScoreCache {
        &self.cache
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SafetyStore> {
        &self.store
    }

    /// Starts a job. See [`JobCoordinator::run`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Etl`] if the job record cannot be created.
    pub async fn run(&self, request: RunRequest) -> Result<JobHandle, EngineError> {
        Ok(self.coordinator.run(request).await?)
    }

    /// Starts a job that reports to `progress`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Etl`] if the job record cannot be created.
    pub async fn run_with_progress(
        &self,
        request: RunRequest,
        progress: RunProgress,
    ) -> Result<JobHandle, EngineError> {
        Ok(self.coordinator.run_with_progress(request, progress).await?)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Etl`] if the lookup fails.
    pub fn status(&self, id: Uuid) -> Result<Option<EtlJob>, EngineError> {
        Ok(self.coordinator.status(id)?)
    }

    /// Newest jobs first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Db`] if the query fails.
    pub fn list_jobs(&self, limit: usize) -> Result<Vec<EtlJob>, EngineError> {
        Ok(self.store.list_jobs(limit)?)
    }

    fn require_zone(&self, code: &str) -> Result<(), EngineError> {
        if self.catalog.current().contains(code) {
            Ok(())
        } else {
            Err(EngineError::UnknownZone {
                code: code.to_string(),
            })
        }
    }

    /// A zone's score for `date`, or its most recent score.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownZone`] if the catalog has no such
    /// zone, or [`EngineError::Db`] if the lookup fails.
    pub fn get_score(
        &self,
        zone_code: &str,
        date: Option<NaiveDate>,
    ) -> Result<Option<ZoneSafetyScore>, EngineError> {
        self.require_zone(zone_code)?;

        match date {
            Some(date) => Ok(self
                .cache
                .get_or_load(zone_code, date, || self.store.get_score(zone_code, date))?),
            None => {
                let latest = self.store.latest_score(zone_code)?;
                if let Some(score) = &latest {
                    self.cache.insert(score.clone());
                }
                Ok(latest)
            }
        }
    }

    /// Catalog zones with their score on the latest calculation date, most
    /// dangerous first. Zones without a score follow in catalog order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Db`] if the scores cannot be read.
    pub fn list_zones(&self, query: &ZoneQuery) -> Result<Vec<ZoneOverview>, EngineError> {
        let catalog = self.catalog.current();
        let date = self.store.latest_calculation_date()?;
        let scores = match date {
            Some(date) => self.store.scores_for_date(date)?,
            None => Vec::new(),
        };

        let mut zones: Vec<ZoneOverview> = catalog
            .zones()
            .map(|zone| {
                let score = scores.iter().find(|s| s.zone_code == zone.code);
                ZoneOverview {
                    code: zone.code.clone(),
                    name: zone.name.clone(),
                    kind: zone.kind,
                    parent_code: zone.parent_code.clone(),
                    area_km2: zone.area_km2,
                    calculation_date: score.map(|s| s.calculation_date),
                    safety_score: score.map(|s| s.safety_score),
                    risk_tier: score.map(|s| s.risk_tier),
                }
            })
            .filter(|zone| query.risk_tier.is_none() || zone.risk_tier == query.risk_tier)
            .collect();

        // Stable, so ties keep catalog order.
        zones.sort_by(|a, b| match (a.safety_score, b.safety_score) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        Ok(zones
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Stored incident and score coverage.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Db`] if a lookup fails.
    pub fn data_availability(&self) -> Result<DataAvailability, EngineError> {
        let latest_incident_at = self.store.latest_incident_at()?;
        Ok(DataAvailability {
            incident_count: self.store.incident_count()?,
            latest_incident_at,
            recent_window: latest_incident_at.map(|at| {
                let end = at.date_naive();
                (end - Duration::days(zone_safety_metrics::LOOKBACK_DAYS), end)
            }),
            zone_count: self.catalog.current().len(),
            latest_calculation_date: self.store.latest_calculation_date()?,
            analysis_date: self.analysis_date()?,
        })
    }

    /// One zone's scores over the last `days` days, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownZone`] or [`EngineError::Db`].
    pub fn score_history(
        &self,
        zone_code: &str,
        days: u32,
    ) -> Result<Vec<ZoneSafetyScore>, EngineError> {
        self.require_zone(zone_code)?;
        let since = Utc::now().date_naive() - Duration::days(i64::from(days));
        Ok(self.store.score_history(zone_code, since)?)
    }

    /// The date insights analyze: the latest as-of date that a succeeded
    /// job covered for the whole catalog. Zone-restricted runs and the
    /// order jobs finished in do not move it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Db`] if the job lookup fails.
    pub fn analysis_date(&self) -> Result<Option<NaiveDate>, EngineError> {
        Ok(self
            .store
            .succeeded_jobs(None)?
            .into_iter()
            .find(|job| job.covers(None))
            .map(|job| job.as_of))
    }

    fn snapshot(&self) -> Result<(Option<NaiveDate>, Vec<ZoneSafetyScore>), EngineError> {
        let Some(date) = self.analysis_date()? else {
            return Ok((None, Vec::new()));
        };
        Ok((Some(date), self.store.scores_for_date(date)?))
    }

    /// Anomalous zones on the analysis date, ranked.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Db`] if the snapshot cannot be read.
    pub fn anomalies(&self, window_days: u32) -> Result<AnomalyReport, EngineError> {
        let (date, scores) = self.snapshot()?;
        let anomalies =
            zone_safety_insights::detect_anomalies(&scores, window_days, &self.insights.anomaly);

        Ok(AnomalyReport {
            calculation_date: date,
            window_days,
            zones_analyzed: scores.len(),
            anomalies,
        })
    }

    /// Zone segments on the analysis date.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Db`] if the snapshot cannot be read.
    pub fn clusters(&self) -> Result<Availability<ClusterReport>, EngineError> {
        let (_, scores) = self.snapshot()?;
        Ok(zone_safety_insights::cluster_zones(
            &scores,
            &self.insights.clustering,
        ))
    }

    fn forecast_since(&self) -> Result<Option<NaiveDate>, EngineError> {
        Ok(self
            .analysis_date()?
            .map(|date| date - Duration::days(FORECAST_LOOKBACK_DAYS)))
    }

    /// Projects one zone's safety score.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownZone`] or [`EngineError::Db`].
    pub fn predict(&self, zone_code: &str) -> Result<Availability<TrendForecast>, EngineError> {
        self.require_zone(zone_code)?;

        let history = match self.forecast_since()? {
            Some(since) => self.store.score_history(zone_code, since)?,
            None => Vec::new(),
        };
        Ok(zone_safety_insights::forecast(
            zone_code,
            &history,
            &self.insights.forecast,
        ))
    }

    fn forecast_overview(&self) -> Result<ForecastOverview, EngineError> {
        let codes: Vec<String> = self
            .catalog
            .current()
            .zones()
            .map(|z| z.code.clone())
            .collect();
        let history = match self.forecast_since()? {
            Some(since) => self.store.scores_since(since)?,
            None => Vec::new(),
        };
        Ok(zone_safety_insights::forecast_overview(
            &codes,
            &history,
            &self.insights.forecast,
        ))
    }

    /// Anomalies, clusters, and forecasts together. A section that fails
    /// is reported as failed without affecting the others.
    #[must_use]
    pub fn insights(&self) -> StrategicInsights {
        let calculation_date = self.analysis_date().unwrap_or_else(|e| {
            log::warn!("Could not resolve analysis date: {e}");
            None
        });

        let anomalies: Section<AnomalyReport> = self.anomalies(30).into();
        let clusters: Section<Availability<ClusterReport>> = self.clusters().into();
        let forecasts: Section<ForecastOverview> = self.forecast_overview().into();

        let highlights =
            zone_safety_insights::highlights(&anomalies, &clusters, &forecasts, &self.insights);

        StrategicInsights {
            calculation_date,
            anomalies,
            clusters,
            forecasts,
            highlights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_safety_etl_models::JobStatus;
    use zone_safety_incident_models::Coordinates;
    use zone_safety_infrastructure_models::{
        AssetCondition, InfrastructureAsset, LaneSegment, ParkingSpot,
    };
    use zone_safety_source::raw::RawIncident;
    use zone_safety_source::static_feed::{
        StaticIncidentFeed, StaticInfrastructureFeed, StaticZoneLoader,
    };
    use zone_safety_zone_models::Zone;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn zone(code: &str, name: &str, parent: Option<&str>) -> Zone {
        Zone {
            code: code.to_string(),
            kind: if parent.is_some() {
                ZoneKind::SubLevel
            } else {
                ZoneKind::TopLevel
            },
            name: name.to_string(),
            parent_code: parent.map(ToString::to_string),
            area_km2: 4.0,
            boundary_geojson: None,
            centroid: Some(Coordinates::new(-74.1, 4.6).unwrap()),
        }
    }

    fn raw(at: &str, hint: &str) -> RawIncident {
        RawIncident {
            occurred_at: Some(at.to_string()),
            incident_type: Some("HURTO MOTOCICLETAS".to_string()),
            zone_hint: Some(hint.to_string()),
            latitude: Some("4.6".to_string()),
            longitude: Some("-74.1".to_string()),
            quantity: None,
        }
    }

    fn assets() -> Vec<InfrastructureAsset> {
        vec![
            InfrastructureAsset::LaneSegment(LaneSegment {
                id: "l1".to_string(),
                zone_code: Some("02".to_string()),
                length_km: 6.0,
                geometry_geojson: None,
                anchor: None,
                condition: AssetCondition::Good,
            }),
            InfrastructureAsset::ParkingSpot(ParkingSpot {
                id: "p1".to_string(),
                zone_code: Some("02".to_string()),
                coordinates: Coordinates::new(-74.1, 4.6).unwrap(),
                name: "Parque Simón Bolívar".to_string(),
                address: None,
                capacity: 20,
                public: true,
                condition: AssetCondition::Fair,
            }),
        ]
    }

    fn engine() -> ZoneSafetyEngine {
        let incidents = vec![
            raw("2025-05-25T22:00:00", "CHAPINERO"),
            raw("2025-05-26T23:00:00", "CHAPINERO"),
            raw("2025-05-27T21:00:00", "EL CHICO"),
            raw("2025-05-10T08:00:00", "TEUSAQUILLO"),
        ];
        let feeds = Feeds {
            incidents: Arc::new(StaticIncidentFeed::from_raw("SIEDCO", incidents)),
            infrastructure: Arc::new(StaticInfrastructureFeed(assets())),
            zones: Arc::new(StaticZoneLoader(vec![
                zone("01", "CHAPINERO", None),
                zone("0101", "EL CHICO", Some("01")),
                zone("02", "TEUSAQUILLO", None),
            ])),
        };
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        ZoneSafetyEngine::new(store, feeds, &EngineConfig::default()).unwrap()
    }

    async fn run(engine: &ZoneSafetyEngine, request: RunRequest) -> EtlJob {
        engine.run(request).await.unwrap().wait().await.unwrap()
    }

    #[tokio::test]
    async fn catalog_is_empty_until_first_run() {
        let engine = engine();
        assert!(engine.catalog().is_empty());
        assert!(matches!(
            engine.get_score("01", None),
            Err(EngineError::UnknownZone { code }) if code == "01"
        ));

        let job = run(&engine, RunRequest::default().with_as_of(date(6, 1))).await;
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(engine.catalog().len(), 3);
        assert_eq!(engine.status(job.id).unwrap().unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn reads_scores_through_cache() {
        let engine = engine();
        run(&engine, RunRequest::default().with_as_of(date(6, 1))).await;

        let chapinero = engine.get_score("01", Some(date(6, 1))).unwrap().unwrap();
        assert_eq!(chapinero.thefts_30d, 3);
        assert_eq!(engine.cache().len(), 1);

        let again = engine.get_score("01", Some(date(6, 1))).unwrap();
        assert_eq!(again, Some(chapinero.clone()));
        assert_eq!(engine.cache().len(), 1);

        assert_eq!(engine.get_score("01", None).unwrap(), Some(chapinero));
        assert_eq!(engine.get_score("01", Some(date(5, 1))).unwrap(), None);
    }

    #[tokio::test]
    async fn force_refresh_drops_cached_date() {
        let engine = engine();
        run(&engine, RunRequest::default().with_as_of(date(6, 1))).await;
        engine.get_score("02", Some(date(6, 1))).unwrap();
        assert_eq!(engine.cache().len(), 1);

        let cached = run(&engine, RunRequest::default().with_as_of(date(6, 1))).await;
        assert!(cached.is_skipped());
        assert_eq!(engine.cache().len(), 1);

        let forced = run(
            &engine,
            RunRequest::default()
                .with_as_of(date(6, 1))
                .with_force_refresh(true),
        )
        .await;
        assert!(engine.cache().is_empty());

        let fresh = engine.get_score("02", Some(date(6, 1))).unwrap().unwrap();
        assert_eq!(fresh.job_id, Some(forced.id));
    }

    #[tokio::test]
    async fn lists_zones_with_latest_scores() {
        let engine = engine();
        run(&engine, RunRequest::default().with_as_of(date(6, 1))).await;

        let zones = engine.list_zones(&ZoneQuery::default()).unwrap();
        assert_eq!(zones.len(), 3);
        assert!(zones.iter().all(|z| z.calculation_date == Some(date(6, 1))));
        assert!(
            zones
                .windows(2)
                .all(|w| w[0].safety_score.unwrap() <= w[1].safety_score.unwrap())
        );
        assert_eq!(zones[2].code, "02");
    }

    #[tokio::test]
    async fn filters_and_pages_zones() {
        let engine = engine();
        assert!(engine.list_zones(&ZoneQuery::default()).unwrap().is_empty());
        run(&engine, RunRequest::default().with_as_of(date(6, 1))).await;

        let all = engine.list_zones(&ZoneQuery::default()).unwrap();
        let tier = all[0].risk_tier.unwrap();
        let same_tier = engine
            .list_zones(&ZoneQuery::default().with_risk_tier(tier))
            .unwrap();
        assert!(!same_tier.is_empty());
        assert!(same_tier.iter().all(|z| z.risk_tier == Some(tier)));
        assert_eq!(
            same_tier.len(),
            all.iter().filter(|z| z.risk_tier == Some(tier)).count()
        );

        let page = engine
            .list_zones(&ZoneQuery::default().with_offset(1).with_limit(1))
            .unwrap();
        assert_eq!(page, vec![all[1].clone()]);
        assert!(
            engine
                .list_zones(&ZoneQuery::default().with_offset(5))
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn reports_data_availability() {
        let engine = engine();
        let empty = engine.data_availability().unwrap();
        assert_eq!(empty.incident_count, 0);
        assert_eq!(empty.recent_window, None);

        run(&engine, RunRequest::default().with_as_of(date(6, 1))).await;
        let availability = engine.data_availability().unwrap();
        assert_eq!(availability.incident_count, 4);
        assert_eq!(availability.zone_count, 3);
        assert_eq!(availability.recent_window, Some((date(2, 26), date(5, 27))));
        assert_eq!(availability.latest_calculation_date, Some(date(6, 1)));
        assert_eq!(availability.analysis_date, Some(date(6, 1)));
    }

    #[tokio::test]
    async fn analysis_date_ignores_partial_and_backfill_runs() {
        let engine = engine();
        run(&engine, RunRequest::default().with_as_of(date(6, 2))).await;
        // Finishes last, but for an older date.
        run(&engine, RunRequest::default().with_as_of(date(6, 1))).await;
        // Newer date, but only one zone.
        let partial = run(
            &engine,
            RunRequest::default()
                .with_as_of(date(6, 3))
                .with_zones(vec!["02".to_string()]),
        )
        .await;
        assert_eq!(partial.status, JobStatus::Succeeded);

        assert_eq!(engine.analysis_date().unwrap(), Some(date(6, 2)));
        let report = engine.anomalies(30).unwrap();
        assert_eq!(report.calculation_date, Some(date(6, 2)));
        assert_eq!(report.zones_analyzed, 3);
    }

    #[tokio::test]
    async fn insights_degrade_with_few_zones() {
        let engine = engine();

        let empty = engine.insights();
        assert_eq!(empty.calculation_date, None);
        assert!(matches!(empty.anomalies, Section::Ok(ref r) if r.zones_analyzed == 0));

        run(&engine, RunRequest::default().with_as_of(date(6, 1))).await;

        let report = engine.anomalies(7).unwrap();
        assert_eq!(report.calculation_date, Some(date(6, 1)));
        assert_eq!(report.zones_analyzed, 3);
        assert!(report.anomalies.is_empty());

        assert!(!engine.clusters().unwrap().is_available());
        assert!(!engine.predict("01").unwrap().is_available());

        let insights = engine.insights();
        assert_eq!(insights.calculation_date, Some(date(6, 1)));
        match insights.forecasts {
            Section::Ok(overview) => assert_eq!(overview.not_available.len(), 3),
            Section::Failed(e) => panic!("forecast section failed: {e}"),
        }
    }

    #[tokio::test]
    async fn predicts_from_accumulated_history() {
        let engine = engine();
        for day in [1, 2, 3] {
            run(&engine, RunRequest::default().with_as_of(date(6, day))).await;
        }

        let forecast = engine.predict("02").unwrap().available().unwrap();
        assert_eq!(forecast.history_points, 3);
        assert_eq!(forecast.last_date, date(6, 3));

        assert!(matches!(
            engine.predict("99"),
            Err(EngineError::UnknownZone { .. })
        ));
        assert_eq!(engine.list_jobs(10).unwrap().len(), 3);
    }
}
