#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident taxonomy and the canonical incident record.
//!
//! Every feed normalizes its records into [`Incident`] values. Incidents are
//! immutable once stored and are unique on `(occurred_at, coordinates)`, see
//! [`Incident::key`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Longitude in degrees, `[-180, 180]`.
    pub longitude: f64,
    /// Latitude in degrees, `[-90, 90]`.
    pub latitude: f64,
}

impl Coordinates {
    /// Creates a validated coordinate pair.
    ///
    /// Rejects non-finite values, out-of-range values, and the `0.0`
    /// sentinel that many open-data portals use for "no location".
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinatesError`] if the pair is not a usable
    /// location.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, InvalidCoordinatesError> {
        let usable = longitude.is_finite()
            && latitude.is_finite()
            && (-180.0..=180.0).contains(&longitude)
            && (-90.0..=90.0).contains(&latitude)
            && longitude != 0.0
            && latitude != 0.0;

        if usable {
            Ok(Self {
                longitude,
                latitude,
            })
        } else {
            Err(InvalidCoordinatesError {
                longitude,
                latitude,
            })
        }
    }
}

/// Error returned when a coordinate pair is unusable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidCoordinatesError {
    /// The rejected longitude.
    pub longitude: f64,
    /// The rejected latitude.
    pub latitude: f64,
}

impl std::fmt::Display for InvalidCoordinatesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coordinates ({}, {}): expected a non-zero WGS84 lng/lat pair",
            self.longitude, self.latitude
        )
    }
}

impl std::error::Error for InvalidCoordinatesError {}

/// Top-level incident categories.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentCategory {
    /// Taking property without force
    Theft,
    /// Taking property by force or threat
    Robbery,
    /// Physical attack on a person
    Assault,
    /// Damage to property
    Vandalism,
    /// Anything the mapper could not classify
    Other,
}

impl IncidentCategory {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Theft,
            Self::Robbery,
            Self::Assault,
            Self::Vandalism,
            Self::Other,
        ]
    }
}

/// Specific incident subcategories within each [`IncidentCategory`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentSubcategory {
    // ── Theft ───────────────────────────────────────────
    /// Bicycle stolen (parked or in transit)
    BicycleTheft,
    /// Motorcycle or scooter stolen
    MotorcycleTheft,
    /// Car or other motor vehicle stolen
    VehicleTheft,
    /// Pickpocketing and theft from a person
    PersonTheft,
    /// Theft from a business
    CommercialTheft,
    /// Theft from a residence
    ResidentialTheft,

    // ── Robbery ─────────────────────────────────────────
    /// Robbery with a weapon or threat of violence
    ArmedRobbery,

    // ── Assault ─────────────────────────────────────────
    /// Assault or battery
    PersonalInjury,

    // ── Vandalism ───────────────────────────────────────
    /// Willful damage to property
    PropertyDamage,

    // ── Other ───────────────────────────────────────────
    /// Unclassified
    Unknown,
}

impl IncidentSubcategory {
    /// Returns the parent [`IncidentCategory`] for this subcategory.
    #[must_use]
    pub const fn category(self) -> IncidentCategory {
        match self {
            Self::BicycleTheft
            | Self::MotorcycleTheft
            | Self::VehicleTheft
            | Self::PersonTheft
            | Self::CommercialTheft
            | Self::ResidentialTheft => IncidentCategory::Theft,
            Self::ArmedRobbery => IncidentCategory::Robbery,
            Self::PersonalInjury => IncidentCategory::Assault,
            Self::PropertyDamage => IncidentCategory::Vandalism,
            Self::Unknown => IncidentCategory::Other,
        }
    }

    /// Returns all subcategories belonging to the given top-level category.
    #[must_use]
    pub fn for_category(category: IncidentCategory) -> Vec<Self> {
        Self::all()
            .iter()
            .copied()
            .filter(|sub| sub.category() == category)
            .collect()
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::BicycleTheft,
            Self::MotorcycleTheft,
            Self::VehicleTheft,
            Self::PersonTheft,
            Self::CommercialTheft,
            Self::ResidentialTheft,
            Self::ArmedRobbery,
            Self::PersonalInjury,
            Self::PropertyDamage,
            Self::Unknown,
        ]
    }
}

/// A normalized, geolocated incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// When the incident occurred.
    pub occurred_at: DateTime<Utc>,
    /// Mapped subcategory from the canonical taxonomy.
    pub subcategory: IncidentSubcategory,
    /// Administrative zone code reported by the source, if any. Used for
    /// attribution when no zone polygon contains the point.
    pub zone_hint: Option<String>,
    /// Where the incident occurred.
    pub coordinates: Coordinates,
    /// Feed that produced this record (e.g. `"SIEDCO"`).
    pub source: String,
}

impl Incident {
    /// Returns the top-level category.
    #[must_use]
    pub const fn category(&self) -> IncidentCategory {
        self.subcategory.category()
    }

    /// Returns the uniqueness key for deduplication.
    #[must_use]
    pub fn key(&self) -> IncidentKey {
        IncidentKey {
            occurred_at_micros: self.occurred_at.timestamp_micros(),
            longitude_bits: self.coordinates.longitude.to_bits(),
            latitude_bits: self.coordinates.latitude.to_bits(),
        }
    }
}

/// Uniqueness key of an [`Incident`]: timestamp plus exact coordinates.
///
/// Coordinates are compared bitwise so the key is `Eq + Ord + Hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IncidentKey {
    occurred_at_micros: i64,
    longitude_bits: u64,
    latitude_bits: u64,
}

/// Why a feed record was dropped during normalization.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// No timestamp field.
    MissingTimestamp,
    /// Timestamp present but unparseable.
    InvalidTimestamp,
    /// No coordinate fields.
    MissingCoordinates,
    /// Coordinates present but out of range or zero.
    InvalidCoordinates,
    /// Quantity above the per-record cap.
    ImplausibleQuantity,
}
