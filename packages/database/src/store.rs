//! The [`SafetyStore`] trait and its `DuckDB` implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::Connection;
use uuid::Uuid;
use zone_safety_etl_models::EtlJob;
use zone_safety_incident_models::Incident;
use zone_safety_infrastructure_models::InfrastructureAsset;
use zone_safety_metrics_models::ZoneSafetyScore;
use zone_safety_zone_models::{Zone, ZoneCatalog};

use crate::schema::create_schema;
use crate::{DbError, StorageConfig, incidents, infrastructure, jobs, scores, zones};

/// Persistence used by the ETL coordinator and the query engine.
///
/// Methods are blocking; async callers run them on a blocking thread when
/// the work is large.
pub trait SafetyStore: Send + Sync {
    /// Inserts incidents, skipping keys already stored. Returns the number
    /// of new rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the insert fails.
    fn insert_incidents(&self, incidents: &[Incident]) -> Result<u64, DbError>;

    /// Incidents with `start <= occurred_at <= end`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn incidents_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Incident>, DbError>;

    /// Newest stored incident timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn latest_incident_at(&self) -> Result<Option<DateTime<Utc>>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn incident_count(&self) -> Result<u64, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the replace fails.
    fn replace_zones(&self, catalog: &ZoneCatalog) -> Result<usize, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn load_zones(&self) -> Result<Vec<Zone>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the replace fails.
    fn replace_infrastructure(&self, assets: &[InfrastructureAsset]) -> Result<usize, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn load_infrastructure(&self) -> Result<Vec<InfrastructureAsset>, DbError>;

    /// Writes one zone's row for its calculation date in a single upsert.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the upsert fails.
    fn upsert_score(&self, score: &ZoneSafetyScore) -> Result<(), DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn get_score(&self, zone_code: &str, date: NaiveDate)
    -> Result<Option<ZoneSafetyScore>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn latest_score(&self, zone_code: &str) -> Result<Option<ZoneSafetyScore>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn scores_for_date(&self, date: NaiveDate) -> Result<Vec<ZoneSafetyScore>, DbError>;

    /// One zone's rows since `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn score_history(
        &self,
        zone_code: &str,
        since: NaiveDate,
    ) -> Result<Vec<ZoneSafetyScore>, DbError>;

    /// Every zone's rows since `since`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn scores_since(&self, since: NaiveDate) -> Result<Vec<ZoneSafetyScore>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn latest_calculation_date(&self) -> Result<Option<NaiveDate>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the upsert fails.
    fn save_job(&self, job: &EtlJob) -> Result<(), DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn get_job(&self, id: Uuid) -> Result<Option<EtlJob>, DbError>;

    /// Newest jobs first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn list_jobs(&self, limit: usize) -> Result<Vec<EtlJob>, DbError>;

    /// `SUCCEEDED` jobs, newest as-of date first, optionally for one date.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    fn succeeded_jobs(&self, as_of: Option<NaiveDate>) -> Result<Vec<EtlJob>, DbError>;
}

/// [`SafetyStore`] over one `DuckDB` connection.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl DuckDbStore {
    /// Opens (or creates) a database file and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the directory, connection, or schema creation
    /// fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        Self::open_with(path, &StorageConfig::default())
    }

    fn open_with(path: &Path, config: &StorageConfig) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        log::info!("Opening {}", path.display());
        Self::init(Connection::open(path)?, config)
    }

    /// Opens a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?, &StorageConfig::default())
    }

    /// Opens the database a [`StorageConfig`] describes.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn from_config(config: &StorageConfig) -> Result<Self, DbError> {
        match config.resolved_path() {
            Some(path) => Self::open_with(&path, config),
            None => Self::init(Connection::open_in_memory()?, config),
        }
    }

    fn init(conn: Connection, config: &StorageConfig) -> Result<Self, DbError> {
        conn.execute_batch(&format!(
            "SET threads = {};
             SET memory_limit = '{}';",
            config.threads.max(1),
            config.memory_limit.replace('\'', ""),
        ))?;
        create_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SafetyStore for DuckDbStore {
    fn insert_incidents(&self, batch: &[Incident]) -> Result<u64, DbError> {
        incidents::insert_incidents(&self.conn(), batch)
    }

    fn incidents_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Incident>, DbError> {
        incidents::between(&self.conn(), &start, &end)
    }

    fn latest_incident_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        incidents::max_occurred_at(&self.conn())
    }

    fn incident_count(&self) -> Result<u64, DbError> {
        incidents::count(&self.conn())
    }

    fn replace_zones(&self, catalog: &ZoneCatalog) -> Result<usize, DbError> {
        zones::replace(&mut self.conn(), catalog)
    }

    fn load_zones(&self) -> Result<Vec<Zone>, DbError> {
        zones::load(&self.conn())
    }

    fn replace_infrastructure(&self, assets: &[InfrastructureAsset]) -> Result<usize, DbError> {
        infrastructure::replace(&mut self.conn(), assets)
    }

    fn load_infrastructure(&self) -> Result<Vec<InfrastructureAsset>, DbError> {
        infrastructure::load(&self.conn())
    }

    fn upsert_score(&self, score: &ZoneSafetyScore) -> Result<(), DbError> {
        scores::upsert(&self.conn(), score)
    }

    fn get_score(
        &self,
        zone_code: &str,
        date: NaiveDate,
    ) -> Result<Option<ZoneSafetyScore>, DbError> {
        scores::get(&self.conn(), zone_code, date)
    }

    fn latest_score(&self, zone_code: &str) -> Result<Option<ZoneSafetyScore>, DbError> {
        scores::latest(&self.conn(), zone_code)
    }

    fn scores_for_date(&self, date: NaiveDate) -> Result<Vec<ZoneSafetyScore>, DbError> {
        scores::for_date(&self.conn(), date)
    }

    fn score_history(
        &self,
        zone_code: &str,
        since: NaiveDate,
    ) -> Result<Vec<ZoneSafetyScore>, DbError> {
        scores::history(&self.conn(), zone_code, since)
    }

    fn scores_since(&self, since: NaiveDate) -> Result<Vec<ZoneSafetyScore>, DbError> {
        scores::since(&self.conn(), since)
    }

    fn latest_calculation_date(&self) -> Result<Option<NaiveDate>, DbError> {
        scores::latest_date(&self.conn())
    }

    fn save_job(&self, job: &EtlJob) -> Result<(), DbError> {
        jobs::save(&self.conn(), job)
    }

    fn get_job(&self, id: Uuid) -> Result<Option<EtlJob>, DbError> {
        jobs::get(&self.conn(), id)
    }

    fn list_jobs(&self, limit: usize) -> Result<Vec<EtlJob>, DbError> {
        jobs::list(&self.conn(), limit)
    }

    fn succeeded_jobs(&self, as_of: Option<NaiveDate>) -> Result<Vec<EtlJob>, DbError> {
        jobs::succeeded(&self.conn(), as_of)
    }
}
