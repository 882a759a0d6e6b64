#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative zones and the zone catalog.
//!
//! Zones form a shallow tree: top-level districts contain sub-level zones.
//! The catalog is an arena keyed by zone code with parent references, and
//! is validated on construction so every parent exists and no cycles occur.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use zone_safety_incident_models::Coordinates;

/// Errors from building a [`ZoneCatalog`].
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Two zones share a code.
    #[error("Duplicate zone code: {code}")]
    DuplicateCode {
        /// The repeated code.
        code: String,
    },

    /// A zone references a parent that is not in the catalog.
    #[error("Zone {code} references missing parent {parent}")]
    MissingParent {
        /// The child zone.
        code: String,
        /// The unknown parent code.
        parent: String,
    },

    /// Following parent links from a zone leads back to itself.
    #[error("Zone {code} is part of a parent cycle")]
    Cycle {
        /// A zone on the cycle.
        code: String,
    },

    /// A zone has a negative or non-finite area.
    #[error("Zone {code} has invalid area {area_km2}")]
    InvalidArea {
        /// The offending zone.
        code: String,
        /// The rejected area.
        area_km2: f64,
    },
}

/// Level of a zone in the administrative hierarchy.
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
pub enum ZoneKind {
    /// District (e.g. a localidad)
    TopLevel,
    /// Planning unit within a district (e.g. a UPZ)
    SubLevel,
}

/// An administrative zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Unique zone code.
    pub code: String,
    /// Hierarchy level.
    pub kind: ZoneKind,
    /// Display name.
    pub name: String,
    /// Code of the containing zone, if any.
    pub parent_code: Option<String>,
    /// Area in square kilometres. Zero is allowed and yields zero densities.
    pub area_km2: f64,
    /// Boundary as a `GeoJSON` geometry string.
    pub boundary_geojson: Option<String>,
    /// Representative point used for nearest-asset lookups.
    pub centroid: Option<Coordinates>,
}

/// Validated, immutable zone tree.
#[derive(Debug, Clone, Default)]
pub struct ZoneCatalog {
    zones: BTreeMap<String, Zone>,
    children: BTreeMap<String, Vec<String>>,
}

impl ZoneCatalog {
    /// Builds a catalog from a flat list of zones.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if a code repeats, a parent is missing, a
    /// parent chain loops, or an area is negative.
    pub fn new(zones: Vec<Zone>) -> Result<Self, CatalogError> {
        let mut by_code = BTreeMap::new();

        for zone in zones {
            if !zone.area_km2.is_finite() || zone.area_km2 < 0.0 {
                return Err(CatalogError::InvalidArea {
                    code: zone.code,
                    area_km2: zone.area_km2,
                });
            }
            if by_code.contains_key(&zone.code) {
                return Err(CatalogError::DuplicateCode { code: zone.code });
            }
            by_code.insert(zone.code.clone(), zone);
        }

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for zone in by_code.values() {
            if let Some(parent) = &zone.parent_code {
                if !by_code.contains_key(parent) {
                    return Err(CatalogError::MissingParent {
                        code: zone.code.clone(),
                        parent: parent.clone(),
                    });
                }
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(zone.code.clone());
            }
        }

        for code in by_code.keys() {
            let mut seen = BTreeSet::new();
            let mut current = Some(code.as_str());
            while let Some(c) = current {
                if !seen.insert(c) {
                    return Err(CatalogError::Cycle { code: code.clone() });
                }
                current = by_code.get(c).and_then(|z| z.parent_code.as_deref());
            }
        }

        Ok(Self {
            zones: by_code,
            children,
        })
    }

    /// Looks up a zone by code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&Zone> {
        self.zones.get(code)
    }

    /// Returns `true` if the catalog knows the code.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.zones.contains_key(code)
    }

    /// Iterates all zones in code order.
    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Number of zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Returns `true` if the catalog has no zones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Direct children of a zone.
    #[must_use]
    pub fn children(&self, code: &str) -> &[String] {
        self.children.get(code).map_or(&[], Vec::as_slice)
    }

    /// The zone itself plus every zone below it, depth-first.
    #[must_use]
    pub fn subtree(&self, code: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let Some((code, _)) = self.zones.get_key_value(code) else {
            return out;
        };
        let mut stack = vec![code.as_str()];
        while let Some(c) = stack.pop() {
            out.push(c);
            stack.extend(self.children(c).iter().rev().map(String::as_str));
        }
        out
    }
}
