//! The steps of one ETL run.

use std::sync::Arc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use futures::stream::{self, StreamExt as _};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;
use zone_safety_database::SafetyStore;
use zone_safety_etl_models::{RunMode, RunRequest};
use zone_safety_infrastructure_models::InfrastructureAsset;
use zone_safety_metrics::{AggregateError, AggregationConfig, AttributedData, LOOKBACK_DAYS};
use zone_safety_metrics_models::ZoneSafetyScore;
use zone_safety_recommend::RecommendationConfig;
use zone_safety_scoring::ScoringConfig;
use zone_safety_source::raw::SkipCounts;
use zone_safety_source::{FetchWindow, IncidentFeed, InfrastructureFeed, ZoneCatalogLoader};
use zone_safety_spatial::{ParkingIndex, ZoneIndex};
use zone_safety_zone_models::ZoneCatalog;

use crate::coordinator::RunProgress;
use crate::{EtlConfig, EtlError};

/// Everything a run computes with, besides its inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub scoring: ScoringConfig,
    pub aggregation: AggregationConfig,
    pub recommendations: RecommendationConfig,
    pub etl: EtlConfig,
}

/// The feeds a coordinator pulls from.
#[derive(Clone)]
pub struct Feeds {
    pub incidents: Arc<dyn IncidentFeed>,
    pub infrastructure: Arc<dyn InfrastructureFeed>,
    pub zones: Arc<dyn ZoneCatalogLoader>,
}

/// Counters reported in the job record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub fetched: u64,
    pub inserted: u64,
    /// Zone score rows written.
    pub zones_scored: u64,
    pub skipped: SkipCounts,
    pub unattributed_incidents: u64,
    pub excluded_incidents: u64,
    pub zones_total: u64,
    pub window: Option<FetchWindow>,
}

/// First instant of `date` in UTC.
#[must_use]
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last whole second of `date` in UTC.
#[must_use]
pub fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::days(1) - Duration::seconds(1)
}

/// Incident window a run fetches.
///
/// An explicit date range wins. Otherwise `Batch` fetches the full
/// lookback ending at `as_of`, and `Incremental` starts `buffer_days`
/// before the newest stored incident, falling back to the batch window
/// when nothing is stored yet.
#[must_use]
pub fn fetch_window(
    request: &RunRequest,
    as_of: NaiveDate,
    latest_stored: Option<DateTime<Utc>>,
    buffer_days: i64,
) -> FetchWindow {
    let end = day_end(as_of);

    if let Some(range) = request.date_range {
        return FetchWindow {
            start: day_start(range.start()),
            end: day_end(range.end()),
        };
    }

    let batch_start = day_start(as_of - Duration::days(LOOKBACK_DAYS));

    let start = match (request.mode, latest_stored) {
        (RunMode::Incremental, Some(latest)) => {
            let since = latest - Duration::days(buffer_days);
            log::info!(
                "Incremental fetch from {} ({buffer_days}-day buffer from latest {})",
                since.format("%Y-%m-%d"),
                latest.format("%Y-%m-%d"),
            );
            since.min(end)
        }
        (RunMode::Incremental, None) => {
            log::info!("Incremental fetch found no stored incidents, fetching full window");
            batch_start
        }
        (RunMode::Batch, _) => batch_start,
    };

    FetchWindow { start, end }
}

/// Resolves the zones a run scores: the requested codes, or every zone.
///
/// # Errors
///
/// Returns [`EtlError::UnknownZones`] if any requested code is missing
/// from the catalog.
pub fn select_zones(
    catalog: &ZoneCatalog,
    requested: Option<&[String]>,
) -> Result<Vec<String>, EtlError> {
    let Some(requested) = requested else {
        return Ok(catalog.zones().map(|z| z.code.clone()).collect());
    };

    let unknown: Vec<String> = requested
        .iter()
        .filter(|code| !catalog.contains(code))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(EtlError::UnknownZones { codes: unknown });
    }

    let mut codes = requested.to_vec();
    codes.sort();
    codes.dedup();
    Ok(codes)
}

/// Shared, read-only state for per-zone work on blocking threads.
struct ZoneScorer {
    catalog: ZoneCatalog,
    data: AttributedData,
    parking: ParkingIndex,
    settings: Arc<PipelineSettings>,
    store: Arc<dyn SafetyStore>,
    job_id: Uuid,
    as_of: NaiveDate,
    counters: Arc<ZoneCounters>,
}

impl ZoneScorer {
    /// Scores and writes one zone. `None` if the run was cancelled before
    /// this zone started.
    fn score_zone(&self, code: &str) -> Result<Option<ZoneSafetyScore>, EtlError> {
        if self.counters.is_cancelled() {
            return Ok(None);
        }

        let zone = self
            .catalog
            .get(code)
            .ok_or_else(|| AggregateError::UnknownZone(code.to_string()))?;

        let metrics = zone_safety_metrics::aggregate_zone(
            &self.catalog,
            &self.data,
            code,
            self.as_of,
            &self.settings.aggregation,
        )?;
        let assessment = zone_safety_scoring::score(&metrics, &self.settings.scoring);
        let recommendations = zone_safety_recommend::recommend(
            zone,
            &metrics,
            assessment.tier,
            &self.parking,
            &self.settings.recommendations,
        );

        let row = ZoneSafetyScore::assemble(
            zone,
            &metrics,
            assessment.score,
            assessment.tier,
            recommendations,
            Some(self.job_id),
        );
        self.store.upsert_score(&row)?;

        log::debug!(
            "Zone {code}: score={:.2} tier={} trend={}",
            row.safety_score,
            row.risk_tier,
            row.trend_direction,
        );

        Ok(Some(row))
    }
}

/// Inputs of one pipeline pass.
pub struct RunContext {
    pub feeds: Feeds,
    pub store: Arc<dyn SafetyStore>,
    pub settings: Arc<PipelineSettings>,
    pub job_id: Uuid,
    pub as_of: NaiveDate,
    pub request: RunRequest,
    pub progress: RunProgress,
    pub counters: Arc<ZoneCounters>,
    /// Past this instant the run fails with [`EtlError::Timeout`].
    pub deadline: Instant,
}

/// Zone progress, readable after the pipeline future is dropped on
/// timeout.
#[derive(Debug, Default)]
pub struct ZoneCounters {
    pub total: AtomicU64,
    /// Zones whose rows are written.
    pub completed: AtomicU64,
    cancelled: AtomicBool,
}

impl ZoneCounters {
    /// `(completed, total)`
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.completed.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    /// Stops zones that have not started yet from being scored.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl RunContext {
    fn timeout(&self) -> EtlError {
        EtlError::Timeout {
            secs: self.settings.etl.job_timeout_secs,
        }
    }

    async fn before_deadline<T, E>(
        &self,
        work: impl Future<Output = Result<T, E>>,
    ) -> Result<T, EtlError>
    where
        EtlError: From<E>,
    {
        match tokio::time::timeout_at(self.deadline, work).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(self.timeout()),
        }
    }
}

/// Runs fetch, store, attribution, and per-zone scoring.
///
/// # Errors
///
/// Returns [`EtlError`] on the first feed, persistence, or aggregation
/// failure, or once the deadline passes. Rows already upserted stay in
/// place. A failure during scoring stops zones that have not started and
/// waits for those in flight, so no row lands after this returns and
/// `counters.completed` matches the rows written.
pub async fn run_pipeline(ctx: &RunContext) -> Result<PipelineStats, EtlError> {
    let mut stats = PipelineStats::default();

    // 1. Zones and infrastructure
    let catalog = ctx.before_deadline(ctx.feeds.zones.load()).await?;
    ctx.store.replace_zones(&catalog)?;

    let assets = ctx
        .before_deadline(ctx.feeds.infrastructure.fetch())
        .await?;
    ctx.store.replace_infrastructure(&assets)?;
    log::info!(
        "Loaded {} zones and {} infrastructure assets",
        catalog.len(),
        assets.len()
    );

    let codes = select_zones(&catalog, ctx.request.zones.as_deref())?;
    stats.zones_total = codes.len() as u64;
    ctx.counters.total.store(stats.zones_total, Ordering::Relaxed);

    // 2. Incidents
    let latest = ctx.store.latest_incident_at()?;
    let window = fetch_window(
        &ctx.request,
        ctx.as_of,
        latest,
        ctx.settings.etl.incremental_buffer_days,
    );
    stats.window = Some(window);

    let batch = ctx
        .before_deadline(
            ctx.feeds
                .incidents
                .fetch(&window, ctx.progress.fetch.clone()),
        )
        .await?;
    stats.fetched = batch.incidents.len() as u64;
    stats.skipped = batch.skipped;
    stats.inserted = ctx.store.insert_incidents(&batch.incidents)?;
    log::info!(
        "{}: fetched {}, stored {} new, skipped {}",
        ctx.feeds.incidents.id(),
        stats.fetched,
        stats.inserted,
        stats.skipped.total(),
    );

    // 3. Attribution over everything stored for the lookback
    let stored = ctx.store.incidents_between(
        day_start(ctx.as_of - Duration::days(LOOKBACK_DAYS)),
        day_end(ctx.as_of),
    )?;
    let index = ZoneIndex::from_catalog(&catalog);
    let data = zone_safety_metrics::attribute(
        &index,
        &catalog,
        &stored,
        &assets,
        &ctx.settings.aggregation,
    );
    stats.unattributed_incidents = data.unattributed_incidents as u64;
    stats.excluded_incidents = data.excluded_incidents as u64;

    let parking = ParkingIndex::new(
        assets
            .into_iter()
            .filter_map(|asset| match asset {
                InfrastructureAsset::ParkingSpot(spot) => Some(spot),
                InfrastructureAsset::LaneSegment(_) => None,
            })
            .collect(),
    );

    // 4. Per-zone fan-out
    let scorer = Arc::new(ZoneScorer {
        catalog,
        data,
        parking,
        settings: ctx.settings.clone(),
        store: ctx.store.clone(),
        job_id: ctx.job_id,
        as_of: ctx.as_of,
        counters: ctx.counters.clone(),
    });

    ctx.progress.zones.set_total(stats.zones_total);
    ctx.progress
        .zones
        .set_message(format!("Scoring zones as of {}", ctx.as_of));

    let concurrency = ctx.settings.etl.concurrency.max(1);
    let mut results = stream::iter(codes.into_iter().map(|code| {
        let scorer = scorer.clone();
        tokio::task::spawn_blocking(move || scorer.score_zone(&code))
    }))
    .buffer_unordered(concurrency);

    let mut failure: Option<EtlError> = None;
    loop {
        let next = if failure.is_some() {
            results.next().await
        } else if let Ok(next) = tokio::time::timeout_at(ctx.deadline, results.next()).await {
            next
        } else {
            ctx.counters.cancel();
            failure = Some(ctx.timeout());
            continue;
        };
        let Some(joined) = next else {
            break;
        };

        match joined.map_err(EtlError::from).and_then(|scored| scored) {
            Ok(Some(_)) => {
                stats.zones_scored += 1;
                ctx.counters.completed.fetch_add(1, Ordering::Relaxed);
                ctx.progress.zones.inc(1);
            }
            Ok(None) => {}
            Err(e) => {
                if failure.is_none() {
                    ctx.counters.cancel();
                    failure = Some(e);
                }
            }
        }
    }

    if let Some(e) = failure {
        ctx.progress
            .zones
            .finish(format!("Stopped after {} zones", stats.zones_scored));
        return Err(e);
    }

    ctx.progress
        .zones
        .finish(format!("Scored {} zones", stats.zones_total));

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;
    use zone_safety_etl_models::DateRange;
    use zone_safety_zone_models::{Zone, ZoneKind};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[test]
    fn day_bounds_cover_whole_day() {
        let d = date(6, 1);
        assert_eq!(day_start(d), Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(day_end(d), Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap());
    }

    #[test]
    fn batch_window_spans_lookback() {
        let window = fetch_window(&RunRequest::default(), date(6, 1), None, 7);
        assert_eq!(window.start, day_start(date(3, 3)));
        assert_eq!(window.end, day_end(date(6, 1)));
    }

    #[test]
    fn incremental_window_starts_before_latest_stored() {
        let latest = Utc.with_ymd_and_hms(2025, 5, 20, 12, 0, 0).unwrap();
        let window = fetch_window(&RunRequest::incremental(), date(6, 1), Some(latest), 7);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 5, 13, 12, 0, 0).unwrap());

        let empty = fetch_window(&RunRequest::incremental(), date(6, 1), None, 7);
        assert_eq!(empty.start, day_start(date(3, 3)));
    }

    #[test]
    fn date_range_overrides_mode() {
        let range = DateRange::new(date(4, 1), date(4, 30)).unwrap();
        let request = RunRequest::incremental().with_date_range(range);
        let window = fetch_window(&request, date(4, 30), None, 7);
        assert_eq!(window.start, day_start(date(4, 1)));
        assert_eq!(window.end, day_end(date(4, 30)));
    }

    fn catalog() -> ZoneCatalog {
        let zone = |code: &str| Zone {
            code: code.to_string(),
            kind: ZoneKind::TopLevel,
            name: code.to_string(),
            parent_code: None,
            area_km2: 1.0,
            boundary_geojson: None,
            centroid: None,
        };
        ZoneCatalog::new(vec![zone("01"), zone("02"), zone("03")]).unwrap()
    }

    #[test]
    fn selects_requested_zones() {
        let catalog = catalog();
        assert_eq!(select_zones(&catalog, None).unwrap().len(), 3);

        let requested = vec!["02".to_string(), "01".to_string(), "02".to_string()];
        assert_eq!(
            select_zones(&catalog, Some(&requested)).unwrap(),
            vec!["01".to_string(), "02".to_string()]
        );

        let unknown = vec!["01".to_string(), "77".to_string()];
        assert!(matches!(
            select_zones(&catalog, Some(&unknown)),
            Err(EtlError::UnknownZones { codes }) if codes == vec!["77".to_string()]
        ));
    }
}
