//! Builds the configured feeds.

use std::sync::Arc;

use zone_safety_etl::Feeds;
use zone_safety_source::geojson_feed::{GeoJsonInfrastructureFeed, GeoJsonZoneLoader};
use zone_safety_source::socrata::SocrataFeed;
use zone_safety_source::{SourceError, SourcesConfig};

/// Socrata incidents plus `GeoJSON` infrastructure and zone layers.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if an HTTP client cannot be built.
pub fn from_config(config: &SourcesConfig) -> Result<Feeds, SourceError> {
    log::debug!(
        "Feeds: incidents from {}, {} zone layer(s)",
        config.incidents.resource_url(),
        config.zones.len()
    );

    Ok(Feeds {
        incidents: Arc::new(SocrataFeed::new(config.incidents.clone())?),
        infrastructure: Arc::new(GeoJsonInfrastructureFeed::new(
            config.lanes.clone(),
            config.parking.clone(),
        )?),
        zones: Arc::new(GeoJsonZoneLoader::new(config.zones.clone())?),
    })
}
