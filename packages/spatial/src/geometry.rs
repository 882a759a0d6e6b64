//! Small geodesy helpers: great-circle distance, projected polygon area,
//! and line length.

use std::f64::consts::PI;

use geo::{Area as _, Centroid as _, Coord, MapCoords as _, MultiPolygon};
use zone_safety_incident_models::Coordinates;

const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_DEGREE_LAT: f64 = 110.574;
const KM_PER_DEGREE_LNG_AT_EQUATOR: f64 = 111.320;

/// Haversine distance between two points in km.
#[must_use]
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude * PI / 180.0;
    let lat2 = b.latitude * PI / 180.0;
    let dlat = (b.latitude - a.latitude) * PI / 180.0;
    let dlng = (b.longitude - a.longitude) * PI / 180.0;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Area of a lng/lat polygon in km², using a local equirectangular
/// projection centered on the polygon's centroid. Accurate to well under
/// a percent for city-sized zones.
#[must_use]
pub fn area_km2(mp: &MultiPolygon<f64>) -> f64 {
    let Some(center) = mp.centroid() else {
        return 0.0;
    };
    let lng_scale = KM_PER_DEGREE_LNG_AT_EQUATOR * (center.y() * PI / 180.0).cos();

    let projected = mp.map_coords(|c| Coord {
        x: (c.x - center.x()) * lng_scale,
        y: (c.y - center.y()) * KM_PER_DEGREE_LAT,
    });

    projected.unsigned_area()
}

/// Centroid of a polygon as validated coordinates.
#[must_use]
pub fn centroid(mp: &MultiPolygon<f64>) -> Option<Coordinates> {
    let point = mp.centroid()?;
    Coordinates::new(point.x(), point.y()).ok()
}

/// Great-circle length of a line geometry in km. Non-line geometries have
/// zero length.
#[must_use]
pub fn line_length_km(geometry: &geo::Geometry<f64>) -> f64 {
    match geometry {
        geo::Geometry::LineString(ls) => path_length_km(&ls.0),
        geo::Geometry::MultiLineString(mls) => mls.0.iter().map(|ls| path_length_km(&ls.0)).sum(),
        _ => 0.0,
    }
}

fn path_length_km(coords: &[Coord<f64>]) -> f64 {
    coords
        .windows(2)
        .map(|pair| {
            let a = Coordinates {
                longitude: pair[0].x,
                latitude: pair[0].y,
            };
            let b = Coordinates {
                longitude: pair[1].x,
                latitude: pair[1].y,
            };
            haversine_km(a, b)
        })
        .sum()
}

/// First vertex of a line geometry, used to attribute lanes to zones.
#[must_use]
pub fn line_anchor(geometry: &geo::Geometry<f64>) -> Option<Coordinates> {
    let first = match geometry {
        geo::Geometry::LineString(ls) => ls.0.first(),
        geo::Geometry::MultiLineString(mls) => mls.0.first().and_then(|ls| ls.0.first()),
        _ => None,
    }?;
    Coordinates::new(first.x, first.y).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    fn coords(lng: f64, lat: f64) -> Coordinates {
        Coordinates::new(lng, lat).unwrap()
    }

    #[test]
    fn haversine_known_distances() {
        // New York to London: ~5,570 km
        let dist = haversine_km(coords(-74.006, 40.7128), coords(-0.1278, 51.5074));
        assert!((dist - 5570.0).abs() < 50.0);

        let same = haversine_km(coords(-74.08, 4.6), coords(-74.08, 4.6));
        assert!(same.abs() < 0.001);
    }

    #[test]
    fn area_of_small_square_near_equator() {
        // 0.01° x 0.01° at ~4.6°N is roughly 1.11 km x 1.11 km
        let square = Polygon::new(
            LineString::from(vec![
                (-74.10, 4.60),
                (-74.09, 4.60),
                (-74.09, 4.61),
                (-74.10, 4.61),
                (-74.10, 4.60),
            ]),
            vec![],
        );
        let area = area_km2(&MultiPolygon(vec![square]));
        assert!((area - 1.227).abs() < 0.02, "area was {area}");
    }

    #[test]
    fn line_length_sums_segments() {
        let line = geo::Geometry::LineString(LineString::from(vec![
            (-74.10, 4.60),
            (-74.10, 4.61),
            (-74.10, 4.62),
        ]));
        let length = line_length_km(&line);
        // 0.02° of latitude is ~2.22 km
        assert!((length - 2.224).abs() < 0.01, "length was {length}");
        assert!(line_anchor(&line).is_some());
    }
}
