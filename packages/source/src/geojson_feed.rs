//! `GeoJSON` loaders for infrastructure assets and zone boundaries.
//!
//! Each layer is a `FeatureCollection` read from a URL or a local file.
//! Property names are configurable per layer. Missing measurements are
//! derived from the geometry: lane length from the line, zone area and
//! centroid from the polygon.

use std::str::FromStr as _;
use std::time::Duration;

use async_trait::async_trait;
use geojson::{Feature, GeoJson};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_safety_incident_models::Coordinates;
use zone_safety_infrastructure_models::{
    AssetCondition, InfrastructureAsset, LaneSegment, ParkingSpot,
};
use zone_safety_spatial::geometry::{area_km2, centroid, line_anchor, line_length_km};
use zone_safety_spatial::{parse_geojson_geometry, parse_geojson_to_multipolygon};
use zone_safety_zone_models::{Zone, ZoneCatalog, ZoneKind};

use crate::parsing::{value_to_bool, value_to_f64, value_to_string, value_to_u32};
use crate::retry::{RetryPolicy, send_text};
use crate::{InfrastructureFeed, SourceError, ZoneCatalogLoader};

/// Loaded from the `[sources.lanes]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneLayerConfig {
    /// URL or file path. No location means no lanes.
    pub location: Option<String>,
    pub id_property: String,
    /// Length in kilometres; computed from the geometry when absent.
    pub length_property: Option<String>,
    pub zone_property: Option<String>,
    pub condition_property: Option<String>,
}

impl Default for LaneLayerConfig {
    fn default() -> Self {
        Self {
            location: None,
            id_property: "id".to_string(),
            length_property: Some("length_km".to_string()),
            zone_property: None,
            condition_property: Some("estado".to_string()),
        }
    }
}

/// Loaded from the `[sources.parking]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkingLayerConfig {
    pub location: Option<String>,
    pub id_property: String,
    pub name_property: String,
    pub address_property: Option<String>,
    pub capacity_property: Option<String>,
    pub public_property: Option<String>,
    pub zone_property: Option<String>,
    pub condition_property: Option<String>,
    /// Capacity assumed when the property is missing.
    pub default_capacity: u32,
}

impl Default for ParkingLayerConfig {
    fn default() -> Self {
        Self {
            location: None,
            id_property: "id".to_string(),
            name_property: "nombre".to_string(),
            address_property: Some("direccion".to_string()),
            capacity_property: Some("capacidad".to_string()),
            public_property: Some("publico".to_string()),
            zone_property: None,
            condition_property: None,
            default_capacity: 1,
        }
    }
}

/// One zone layer in `[[sources.zones]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneLayerConfig {
    pub location: String,
    pub kind: ZoneKind,
    pub code_property: String,
    pub name_property: String,
    /// Property holding the containing zone's code.
    pub parent_property: Option<String>,
    /// Area property; computed from the polygon when absent.
    pub area_property: Option<String>,
    /// Factor converting the area property to km².
    pub area_to_km2: f64,
}

impl Default for ZoneLayerConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            kind: ZoneKind::TopLevel,
            code_property: "code".to_string(),
            name_property: "name".to_string(),
            parent_property: None,
            area_property: None,
            area_to_km2: 1.0,
        }
    }
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

async fn read_location(client: &reqwest::Client, location: &str) -> Result<String, SourceError> {
    if is_url(location) {
        log::info!("Downloading {location}");
        send_text(|| client.get(location), &RetryPolicy::default()).await
    } else {
        log::info!("Reading {location}");
        Ok(tokio::fs::read_to_string(location).await?)
    }
}

fn features(text: &str) -> Result<Vec<Feature>, SourceError> {
    match GeoJson::from_str(text)? {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        GeoJson::Feature(feature) => Ok(vec![feature]),
        GeoJson::Geometry(_) => Err(SourceError::Normalization {
            message: "Expected a GeoJSON Feature or FeatureCollection".to_string(),
        }),
    }
}

fn property<'a>(feature: &'a Feature, name: &str) -> Option<&'a Value> {
    feature.properties.as_ref()?.get(name)
}

fn text_property(feature: &Feature, name: Option<&str>) -> Option<String> {
    property(feature, name?).and_then(value_to_string)
}

fn geometry_string(feature: &Feature) -> Option<String> {
    feature
        .geometry
        .as_ref()
        .and_then(|g| serde_json::to_string(g).ok())
}

fn condition(feature: &Feature, name: Option<&str>) -> AssetCondition {
    text_property(feature, name)
        .and_then(|s| AssetCondition::from_str(s.trim()).ok())
        .unwrap_or_default()
}

fn point_location(feature: &Feature) -> Option<Coordinates> {
    let geometry = feature.geometry.as_ref()?;
    let position = match &geometry.value {
        geojson::Value::Point(p) => Some(p.as_slice()),
        geojson::Value::MultiPoint(points) => points.first().map(Vec::as_slice),
        _ => None,
    };
    if let Some([lng, lat, ..]) = position {
        return Coordinates::new(*lng, *lat).ok();
    }
    parse_geojson_to_multipolygon(&geometry_string(feature)?).and_then(|mp| centroid(&mp))
}

/// Parses a lane layer.
///
/// # Errors
///
/// Returns [`SourceError`] if the document is not a feature collection.
pub fn parse_lanes(text: &str, config: &LaneLayerConfig) -> Result<Vec<LaneSegment>, SourceError> {
    let lanes: Vec<LaneSegment> = features(text)?
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let geometry_geojson = geometry_string(feature);
            let geometry = geometry_geojson.as_deref().and_then(parse_geojson_geometry);

            let length_km = config
                .length_property
                .as_deref()
                .and_then(|name| property(feature, name))
                .and_then(value_to_f64)
                .filter(|km| *km >= 0.0)
                .or_else(|| geometry.as_ref().map(line_length_km))
                .unwrap_or(0.0);

            LaneSegment {
                id: text_property(feature, Some(&config.id_property))
                    .unwrap_or_else(|| format!("lane-{i}")),
                zone_code: text_property(feature, config.zone_property.as_deref()),
                length_km,
                anchor: geometry.as_ref().and_then(line_anchor),
                geometry_geojson,
                condition: condition(feature, config.condition_property.as_deref()),
            }
        })
        .collect();

    log::info!(
        "Loaded {} lane segments ({:.1} km)",
        lanes.len(),
        lanes.iter().map(|l| l.length_km).sum::<f64>()
    );
    Ok(lanes)
}

/// Parses a parking layer. Features without a usable location are
/// dropped.
///
/// # Errors
///
/// Returns [`SourceError`] if the document is not a feature collection.
pub fn parse_parking(
    text: &str,
    config: &ParkingLayerConfig,
) -> Result<Vec<ParkingSpot>, SourceError> {
    let all = features(text)?;
    let total = all.len();

    let spots: Vec<ParkingSpot> = all
        .iter()
        .enumerate()
        .filter_map(|(i, feature)| {
            let coordinates = point_location(feature)?;
            let id = text_property(feature, Some(&config.id_property))
                .unwrap_or_else(|| format!("parking-{i}"));
            Some(ParkingSpot {
                name: text_property(feature, Some(&config.name_property))
                    .unwrap_or_else(|| id.clone()),
                id,
                zone_code: text_property(feature, config.zone_property.as_deref()),
                coordinates,
                address: text_property(feature, config.address_property.as_deref()),
                capacity: config
                    .capacity_property
                    .as_deref()
                    .and_then(|name| property(feature, name))
                    .and_then(value_to_u32)
                    .unwrap_or(config.default_capacity),
                public: config
                    .public_property
                    .as_deref()
                    .and_then(|name| property(feature, name))
                    .and_then(value_to_bool)
                    .unwrap_or(true),
                condition: condition(feature, config.condition_property.as_deref()),
            })
        })
        .collect();

    if spots.len() < total {
        log::warn!(
            "Dropped {} parking features without a usable location",
            total - spots.len()
        );
    }
    log::info!("Loaded {} parking spots", spots.len());
    Ok(spots)
}

/// Parses one zone layer. Features without a code are dropped.
///
/// # Errors
///
/// Returns [`SourceError`] if the document is not a feature collection.
pub fn parse_zones(text: &str, layer: &ZoneLayerConfig) -> Result<Vec<Zone>, SourceError> {
    let zones: Vec<Zone> = features(text)?
        .iter()
        .filter_map(|feature| {
            let Some(code) = text_property(feature, Some(&layer.code_property)) else {
                log::warn!("Skipping zone feature without '{}'", layer.code_property);
                return None;
            };

            let boundary_geojson = geometry_string(feature);
            let polygon = boundary_geojson
                .as_deref()
                .and_then(parse_geojson_to_multipolygon);

            let area_km2 = layer
                .area_property
                .as_deref()
                .and_then(|name| property(feature, name))
                .and_then(value_to_f64)
                .map(|area| area * layer.area_to_km2)
                .filter(|area| area.is_finite() && *area >= 0.0)
                .or_else(|| polygon.as_ref().map(area_km2))
                .unwrap_or(0.0);

            Some(Zone {
                name: text_property(feature, Some(&layer.name_property))
                    .unwrap_or_else(|| code.clone()),
                code,
                kind: layer.kind,
                parent_code: text_property(feature, layer.parent_property.as_deref()),
                area_km2,
                centroid: polygon.as_ref().and_then(centroid),
                boundary_geojson,
            })
        })
        .collect();

    log::info!("Loaded {} {} zones", zones.len(), layer.kind);
    Ok(zones)
}

fn http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?)
}

/// Lanes and parking from `GeoJSON` layers.
pub struct GeoJsonInfrastructureFeed {
    lanes: LaneLayerConfig,
    parking: ParkingLayerConfig,
    client: reqwest::Client,
}

impl GeoJsonInfrastructureFeed {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(lanes: LaneLayerConfig, parking: ParkingLayerConfig) -> Result<Self, SourceError> {
        Ok(Self {
            lanes,
            parking,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl InfrastructureFeed for GeoJsonInfrastructureFeed {
    async fn fetch(&self) -> Result<Vec<InfrastructureAsset>, SourceError> {
        let mut assets = Vec::new();

        if let Some(location) = &self.lanes.location {
            let text = read_location(&self.client, location).await?;
            assets.extend(
                parse_lanes(&text, &self.lanes)?
                    .into_iter()
                    .map(InfrastructureAsset::LaneSegment),
            );
        }
        if let Some(location) = &self.parking.location {
            let text = read_location(&self.client, location).await?;
            assets.extend(
                parse_parking(&text, &self.parking)?
                    .into_iter()
                    .map(InfrastructureAsset::ParkingSpot),
            );
        }

        Ok(assets)
    }
}

/// Zone catalog assembled from one or more `GeoJSON` layers.
pub struct GeoJsonZoneLoader {
    layers: Vec<ZoneLayerConfig>,
    client: reqwest::Client,
}

impl GeoJsonZoneLoader {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(layers: Vec<ZoneLayerConfig>) -> Result<Self, SourceError> {
        Ok(Self {
            layers,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl ZoneCatalogLoader for GeoJsonZoneLoader {
    async fn load(&self) -> Result<ZoneCatalog, SourceError> {
        let mut zones = Vec::new();
        for layer in &self.layers {
            let text = read_location(&self.client, &layer.location).await?;
            zones.extend(parse_zones(&text, layer)?);
        }
        Ok(ZoneCatalog::new(zones)?)
    }
}
