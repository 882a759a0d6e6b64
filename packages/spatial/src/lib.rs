#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial indexes for zone attribution.
//!
//! Builds an R-tree over zone boundary polygons from the zone catalog and
//! provides fast point-in-polygon lookups. Incidents and infrastructure
//! assets that fall outside every polygon (or when a zone has no boundary)
//! fall back to the administrative code or name reported by the source.

pub mod geometry;
pub mod parking;

use std::collections::BTreeMap;

use geo::{Contains, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use zone_safety_incident_models::Coordinates;
use zone_safety_zone_models::ZoneCatalog;

pub use geometry::haversine_km;
pub use parking::ParkingIndex;

/// A zone polygon stored in the R-tree with its metadata.
struct ZoneEntry {
    code: String,
    area_km2: f64,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for ZoneEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over a zone catalog.
///
/// Constructed once per catalog snapshot and shared across all per-zone
/// workers.
pub struct ZoneIndex {
    polygons: RTree<ZoneEntry>,
    /// Normalized code or name -> zone code
    aliases: BTreeMap<String, String>,
}

impl ZoneIndex {
    /// Builds the index from every zone in the catalog that carries a
    /// parseable boundary.
    #[must_use]
    pub fn from_catalog(catalog: &ZoneCatalog) -> Self {
        let mut entries = Vec::new();
        let mut aliases = BTreeMap::new();

        for zone in catalog.zones() {
            aliases.insert(normalize_alias(&zone.code), zone.code.clone());
            aliases
                .entry(normalize_alias(&zone.name))
                .or_insert_with(|| zone.code.clone());

            let Some(geojson_str) = zone.boundary_geojson.as_deref() else {
                continue;
            };

            let Some(multi_polygon) = parse_geojson_to_multipolygon(geojson_str) else {
                log::warn!("Failed to parse GeoJSON for zone {}", zone.code);
                continue;
            };

            let area_km2 = if zone.area_km2 > 0.0 {
                zone.area_km2
            } else {
                geometry::area_km2(&multi_polygon)
            };

            entries.push(ZoneEntry {
                code: zone.code.clone(),
                area_km2,
                envelope: compute_envelope(&multi_polygon),
                polygon: multi_polygon,
            });
        }

        let polygons = RTree::bulk_load(entries);
        log::info!(
            "Loaded {} zone polygons into spatial index ({} zones total)",
            polygons.size(),
            catalog.len()
        );

        Self { polygons, aliases }
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn polygon_count(&self) -> usize {
        self.polygons.size()
    }

    /// Look up the zone containing a point.
    ///
    /// Zones of different levels overlap (a sub-zone lies inside its
    /// district); the smallest area wins so points land on the most
    /// specific zone.
    #[must_use]
    pub fn lookup(&self, coordinates: Coordinates) -> Option<&str> {
        let Coordinates {
            longitude: lng,
            latitude: lat,
        } = coordinates;
        let point = geo::Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        let mut best: Option<&ZoneEntry> = None;

        for entry in self.polygons.locate_in_envelope_intersecting(&query_env) {
            if entry.polygon.contains(&point) {
                match best {
                    None => best = Some(entry),
                    Some(current) if entry.area_km2 < current.area_km2 => {
                        best = Some(entry);
                    }
                    _ => {}
                }
            }
        }

        best.map(|e| e.code.as_str())
    }

    /// Resolve a zone code from a source-reported code or name.
    #[must_use]
    pub fn resolve_hint(&self, hint: &str) -> Option<&str> {
        self.aliases.get(&normalize_alias(hint)).map(String::as_str)
    }

    /// Attribute a record to a zone: polygon containment first, then the
    /// source's own zone hint.
    #[must_use]
    pub fn attribute(&self, coordinates: Option<Coordinates>, hint: Option<&str>) -> Option<&str> {
        coordinates
            .and_then(|c| self.lookup(c))
            .or_else(|| hint.and_then(|h| self.resolve_hint(h)))
    }
}

fn normalize_alias(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Parse a `GeoJSON` string into a [`MultiPolygon`].
/// Handles bare geometries and single features, `Polygon` and
/// `MultiPolygon` types.
#[must_use]
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    match parse_geojson_geometry(geojson_str)? {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Parse a `GeoJSON` geometry (or single feature) string into a
/// [`geo::Geometry`].
#[must_use]
pub fn parse_geojson_geometry(geojson_str: &str) -> Option<geo::Geometry<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    let geom = match geojson {
        GeoJson::Geometry(geom) => geom,
        GeoJson::Feature(feature) => feature.geometry?,
        GeoJson::FeatureCollection(_) => return None,
    };
    geom.try_into().ok()
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;

    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
