//! Read-through cache of persisted zone scores.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::NaiveDate;
use zone_safety_etl::JobListener;
use zone_safety_etl_models::{EtlJob, JobStatus};
use zone_safety_metrics_models::ZoneSafetyScore;

type Key = (String, NaiveDate);

/// Scores keyed by `(zone code, calculation date)`.
///
/// Entries for a date are dropped when a forced refresh starts for it and
/// again when a job that wrote rows for it finishes.
#[derive(Debug, Default)]
pub struct ScoreCache {
    entries: RwLock<BTreeMap<Key, ZoneSafetyScore>>,
}

impl ScoreCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, zone_code: &str, date: NaiveDate) -> Option<ZoneSafetyScore> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(zone_code.to_string(), date))
            .cloned()
    }

    pub fn insert(&self, score: ZoneSafetyScore) {
        let key = (score.zone_code.clone(), score.calculation_date);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, score);
    }

    /// Returns the cached row, or loads it with `load` and caches it.
    ///
    /// Misses are not cached, so a row written later is picked up.
    ///
    /// # Errors
    ///
    /// Propagates the error from `load`.
    pub fn get_or_load<E>(
        &self,
        zone_code: &str,
        date: NaiveDate,
        load: impl FnOnce() -> Result<Option<ZoneSafetyScore>, E>,
    ) -> Result<Option<ZoneSafetyScore>, E> {
        if let Some(hit) = self.get(zone_code, date) {
            return Ok(Some(hit));
        }

        let loaded = load()?;
        if let Some(score) = &loaded {
            self.insert(score.clone());
        }
        Ok(loaded)
    }

    /// Drops every entry for `date`. Returns how many were dropped.
    pub fn invalidate_date(&self, date: NaiveDate) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(_, d), _| *d != date);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobListener for ScoreCache {
    fn refresh_started(&self, as_of: NaiveDate) {
        let dropped = self.invalidate_date(as_of);
        log::debug!("Forced refresh for {as_of}: dropped {dropped} cached scores");
    }

    fn job_finished(&self, job: &EtlJob) {
        // Failed jobs may have upserted some zones before stopping.
        let wrote_rows = match job.status {
            JobStatus::Succeeded => !job.is_skipped(),
            JobStatus::Failed => true,
            JobStatus::Pending | JobStatus::Running => false,
        };
        if wrote_rows {
            self.invalidate_date(job.as_of);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Utc};
    use zone_safety_etl_models::{RunMode, SKIPPED_KEY};
    use zone_safety_metrics_models::{Recommendations, RiskTier, TrendDirection};
    use zone_safety_zone_models::ZoneKind;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn score(zone: &str, day: u32) -> ZoneSafetyScore {
        ZoneSafetyScore {
            zone_code: zone.to_string(),
            zone_name: zone.to_string(),
            zone_kind: ZoneKind::TopLevel,
            calculation_date: date(day),
            safety_score: 75.0,
            risk_tier: RiskTier::Low,
            thefts_7d: 1,
            thefts_30d: 4,
            thefts_90d: 9,
            incident_density: 2.0,
            lane_coverage_km: 3.0,
            lane_density: 1.5,
            parking_spots: 2,
            parking_density: 1.0,
            trend_direction: TrendDirection::Stable,
            trend_percentage: 0.0,
            recommendations: Recommendations::default(),
            job_id: None,
        }
    }

    #[test]
    fn loads_once_then_serves_from_cache() {
        let cache = ScoreCache::new();
        let mut loads = 0;

        for _ in 0..3 {
            let hit = cache
                .get_or_load("01", date(1), || {
                    loads += 1;
                    Ok::<_, std::convert::Infallible>(Some(score("01", 1)))
                })
                .unwrap();
            assert_eq!(hit.unwrap().zone_code, "01");
        }
        assert_eq!(loads, 1);
    }

    #[test]
    fn does_not_cache_misses() {
        let cache = ScoreCache::new();
        let miss = cache
            .get_or_load("01", date(1), || Ok::<_, std::convert::Infallible>(None))
            .unwrap();
        assert!(miss.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidates_one_date() {
        let cache = ScoreCache::new();
        cache.insert(score("01", 1));
        cache.insert(score("02", 1));
        cache.insert(score("01", 2));

        assert_eq!(cache.invalidate_date(date(1)), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("01", date(2)).is_some());
    }

    #[test]
    fn listener_drops_rewritten_dates() {
        let cache = ScoreCache::new();
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();

        cache.insert(score("01", 1));
        let mut skipped = EtlJob::new(RunMode::Batch, date(1), now);
        skipped.start(now).unwrap();
        skipped.set_metadata(SKIPPED_KEY, true);
        skipped.succeed(now, 0).unwrap();
        cache.job_finished(&skipped);
        assert_eq!(cache.len(), 1);

        let mut failed = EtlJob::new(RunMode::Batch, date(1), now);
        failed.start(now).unwrap();
        failed.fail(now, "boom").unwrap();
        cache.job_finished(&failed);
        assert!(cache.is_empty());

        cache.insert(score("01", 1));
        cache.refresh_started(date(1));
        assert!(cache.is_empty());
    }
}
