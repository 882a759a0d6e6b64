#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cycling infrastructure assets.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use zone_safety_incident_models::Coordinates;

/// Physical state of an asset as reported by the source.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AssetCondition {
    Good,
    Fair,
    Poor,
    #[default]
    Unknown,
}

/// A bicycle parking location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingSpot {
    pub id: String,
    pub zone_code: Option<String>,
    pub coordinates: Coordinates,
    pub name: String,
    pub address: Option<String>,
    /// Number of bicycles the spot holds.
    pub capacity: u32,
    /// Open to the public (as opposed to residents or customers only).
    pub public: bool,
    pub condition: AssetCondition,
}

/// A stretch of bicycle lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneSegment {
    pub id: String,
    pub zone_code: Option<String>,
    pub length_km: f64,
    /// Line geometry as a `GeoJSON` string.
    pub geometry_geojson: Option<String>,
    /// Point used for zone attribution when no zone code is known.
    pub anchor: Option<Coordinates>,
    pub condition: AssetCondition,
}

/// Any infrastructure asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfrastructureAsset {
    ParkingSpot(ParkingSpot),
    LaneSegment(LaneSegment),
}

impl InfrastructureAsset {
    /// Source identifier of the asset.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::ParkingSpot(p) => &p.id,
            Self::LaneSegment(l) => &l.id,
        }
    }

    /// Zone the asset was attributed to, if any.
    #[must_use]
    pub fn zone_code(&self) -> Option<&str> {
        match self {
            Self::ParkingSpot(p) => p.zone_code.as_deref(),
            Self::LaneSegment(l) => l.zone_code.as_deref(),
        }
    }

    /// Sets the attributed zone.
    pub fn set_zone_code(&mut self, code: Option<String>) {
        match self {
            Self::ParkingSpot(p) => p.zone_code = code,
            Self::LaneSegment(l) => l.zone_code = code,
        }
    }

    /// Point used for spatial attribution.
    #[must_use]
    pub const fn location(&self) -> Option<Coordinates> {
        match self {
            Self::ParkingSpot(p) => Some(p.coordinates),
            Self::LaneSegment(l) => l.anchor,
        }
    }

    /// Short kind label used in storage.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ParkingSpot(_) => "PARKING_SPOT",
            Self::LaneSegment(_) => "LANE_SEGMENT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_accessors_dispatch_by_variant() {
        let mut parking = InfrastructureAsset::ParkingSpot(ParkingSpot {
            id: "p1".to_string(),
            zone_code: None,
            coordinates: Coordinates::new(-74.05, 4.65).unwrap(),
            name: "Portal Norte".to_string(),
            address: None,
            capacity: 40,
            public: true,
            condition: AssetCondition::Good,
        });
        assert_eq!(parking.id(), "p1");
        assert_eq!(parking.kind(), "PARKING_SPOT");
        assert!(parking.location().is_some());

        parking.set_zone_code(Some("01".to_string()));
        assert_eq!(parking.zone_code(), Some("01"));
    }

    #[test]
    fn serializes_with_type_tag() {
        let lane = InfrastructureAsset::LaneSegment(LaneSegment {
            id: "l1".to_string(),
            zone_code: Some("02".to_string()),
            length_km: 1.5,
            geometry_geojson: None,
            anchor: None,
            condition: AssetCondition::Unknown,
        });
        let json = serde_json::to_value(&lane).unwrap();
        assert_eq!(json["type"], "LANE_SEGMENT");
        assert_eq!(json["lengthKm"], 1.5);
    }

    #[test]
    fn condition_parses_case_insensitively() {
        assert_eq!("good".parse::<AssetCondition>().unwrap(), AssetCondition::Good);
        assert_eq!("POOR".parse::<AssetCondition>().unwrap(), AssetCondition::Poor);
    }
}
