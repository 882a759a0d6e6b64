//! The engine's view of the zone catalog.

use std::sync::{Arc, PoisonError, RwLock};

use zone_safety_database::SafetyStore;
use zone_safety_etl::JobListener;
use zone_safety_etl_models::{EtlJob, JobStatus};
use zone_safety_zone_models::ZoneCatalog;

use crate::EngineError;

/// The current catalog, swapped whole after each run that reloads zones.
pub struct CatalogHandle {
    store: Arc<dyn SafetyStore>,
    current: RwLock<Arc<ZoneCatalog>>,
}

impl CatalogHandle {
    /// Loads the catalog persisted by the last run.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the zones cannot be read or no longer
    /// form a valid catalog.
    pub fn load(store: Arc<dyn SafetyStore>) -> Result<Self, EngineError> {
        let catalog = read_catalog(store.as_ref())?;
        Ok(Self {
            store,
            current: RwLock::new(Arc::new(catalog)),
        })
    }

    /// A snapshot; later swaps do not affect it.
    #[must_use]
    pub fn current(&self) -> Arc<ZoneCatalog> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-reads zones from the store and swaps them in.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the zones cannot be read or validated;
    /// the previous catalog stays in place.
    pub fn reload(&self) -> Result<usize, EngineError> {
        let catalog = Arc::new(read_catalog(self.store.as_ref())?);
        let len = catalog.len();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = catalog;
        Ok(len)
    }
}

fn read_catalog(store: &dyn SafetyStore) -> Result<ZoneCatalog, EngineError> {
    Ok(ZoneCatalog::new(store.load_zones()?)?)
}

impl JobListener for CatalogHandle {
    fn job_finished(&self, job: &EtlJob) {
        if job.status != JobStatus::Succeeded || job.is_skipped() {
            return;
        }
        match self.reload() {
            Ok(len) => log::debug!("Reloaded catalog with {len} zones"),
            Err(e) => log::warn!("Keeping previous zone catalog: {e}"),
        }
    }
}

