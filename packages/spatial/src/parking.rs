//! Nearest-parking lookups over an R-tree of parking points.

use rstar::{AABB, RTree};
use rstar::primitives::GeomWithData;
use zone_safety_incident_models::Coordinates;
use zone_safety_infrastructure_models::ParkingSpot;

use crate::geometry::haversine_km;

/// Kilometres per degree of arc on the haversine sphere.
const KM_PER_DEGREE: f64 = 111.19;

/// Initial half-width of the search box in degrees (~1 km).
const INITIAL_RADIUS_DEG: f64 = 0.01;

type ParkingPoint = GeomWithData<[f64; 2], usize>;

/// R-tree over parking spot locations.
pub struct ParkingIndex {
    spots: Vec<ParkingSpot>,
    tree: RTree<ParkingPoint>,
}

impl ParkingIndex {
    #[must_use]
    pub fn new(spots: Vec<ParkingSpot>) -> Self {
        let points = spots
            .iter()
            .enumerate()
            .map(|(i, spot)| {
                GeomWithData::new([spot.coordinates.longitude, spot.coordinates.latitude], i)
            })
            .collect();

        Self {
            tree: RTree::bulk_load(points),
            spots,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    /// The `n` spots closest to `origin` by great-circle distance, nearest
    /// first, paired with their distance in km.
    #[must_use]
    pub fn nearest(&self, origin: Coordinates, n: usize) -> Vec<(&ParkingSpot, f64)> {
        if n == 0 {
            return Vec::new();
        }

        let mut radius = INITIAL_RADIUS_DEG;
        loop {
            let envelope = AABB::from_corners(
                [origin.longitude - radius, origin.latitude - radius],
                [origin.longitude + radius, origin.latitude + radius],
            );

            let mut candidates: Vec<(&ParkingSpot, f64)> = self
                .tree
                .locate_in_envelope(&envelope)
                .map(|point| {
                    let spot = &self.spots[point.data];
                    (spot, haversine_km(origin, spot.coordinates))
                })
                .collect();

            candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));

            // Anything within the inscribed radius is guaranteed to be
            // ranked correctly against points outside the box.
            let covered = candidates.len() == self.spots.len() || radius >= 180.0;
            let inscribed_km = inscribed_radius_km(origin.latitude, radius);
            let settled = candidates
                .iter()
                .take_while(|(_, d)| *d <= inscribed_km)
                .count();

            if covered || settled >= n {
                candidates.truncate(n);
                return candidates;
            }

            radius *= 2.0;
        }
    }
}

/// Lower bound on the great-circle distance from the centre of a square
/// lng/lat box of half-width `radius_deg` to any point outside it.
fn inscribed_radius_km(latitude: f64, radius_deg: f64) -> f64 {
    let worst_lat = (latitude.abs() + radius_deg).min(89.0);
    let lng_km = radius_deg * KM_PER_DEGREE * worst_lat.to_radians().cos();
    let lat_km = radius_deg * KM_PER_DEGREE;
    lng_km.min(lat_km) * 0.99
}
