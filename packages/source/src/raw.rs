//! Raw feed records and their normalization into [`Incident`]s.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use zone_safety_incident_models::{Coordinates, Incident, SkipReason};

use crate::parsing::{parse_coordinate, parse_socrata_date};
use crate::type_mapping::map_incident_type;

/// A feed record before validation. Every field is optional since feeds
/// routinely omit or garble them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIncident {
    pub occurred_at: Option<String>,
    /// Free-text incident type, mapped through
    /// [`map_incident_type`].
    pub incident_type: Option<String>,
    pub zone_hint: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    /// Number of identical incidents this row stands for. Missing or zero
    /// means one.
    pub quantity: Option<u32>,
}

/// Skipped record counts keyed by reason. Serializes as a map such as
/// `{"missing_coordinates": 3}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipCounts(BTreeMap<SkipReason, u64>);

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason) {
        *self.0.entry(reason).or_default() += 1;
    }

    #[must_use]
    pub fn get(&self, reason: SkipReason) -> u64 {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn merge(&mut self, other: &Self) {
        for (reason, count) in &other.0 {
            *self.0.entry(*reason).or_default() += count;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SkipReason, u64)> + '_ {
        self.0.iter().map(|(r, c)| (*r, *c))
    }
}

/// Largest `quantity` a single feed row may expand to.
pub const MAX_QUANTITY: u32 = 1_000;

/// Normalizes one record. A row with `quantity = n` becomes `n` incidents
/// one second apart so they stay distinct under the incident key.
///
/// # Errors
///
/// Returns the [`SkipReason`] if the timestamp or coordinates are missing
/// or unusable, or if `quantity` exceeds [`MAX_QUANTITY`].
pub fn normalize(raw: &RawIncident, source: &str) -> Result<Vec<Incident>, SkipReason> {
    let occurred_at = raw
        .occurred_at
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(SkipReason::MissingTimestamp)?;
    let occurred_at = parse_socrata_date(occurred_at).ok_or(SkipReason::InvalidTimestamp)?;

    let (Some(lat), Some(lng)) = (raw.latitude.as_deref(), raw.longitude.as_deref()) else {
        return Err(SkipReason::MissingCoordinates);
    };
    let coordinates = parse_coordinate(lng)
        .zip(parse_coordinate(lat))
        .and_then(|(lng, lat)| Coordinates::new(lng, lat).ok())
        .ok_or(SkipReason::InvalidCoordinates)?;

    let subcategory = map_incident_type(raw.incident_type.as_deref().unwrap_or_default());
    let zone_hint = raw
        .zone_hint
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    let quantity = raw.quantity.unwrap_or(1).max(1);
    if quantity > MAX_QUANTITY {
        return Err(SkipReason::ImplausibleQuantity);
    }

    Ok((0..quantity)
        .map(|i| Incident {
            occurred_at: occurred_at + Duration::seconds(i64::from(i)),
            subcategory,
            zone_hint: zone_hint.clone(),
            coordinates,
            source: source.to_string(),
        })
        .collect())
}

/// Normalizes a batch, skipping and counting malformed records.
#[must_use]
pub fn normalize_all(raws: &[RawIncident], source: &str) -> (Vec<Incident>, SkipCounts) {
    let mut incidents = Vec::with_capacity(raws.len());
    let mut skipped = SkipCounts::default();

    for raw in raws {
        match normalize(raw, source) {
            Ok(expanded) => incidents.extend(expanded),
            Err(reason) => skipped.record(reason),
        }
    }

    if skipped.total() > 0 {
        log::warn!(
            "{source}: skipped {} of {} records ({})",
            skipped.total(),
            raws.len(),
            skipped
                .iter()
                .map(|(r, c)| format!("{r}={c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    (incidents, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_safety_incident_models::IncidentSubcategory;

    fn raw() -> RawIncident {
        RawIncident {
            occurred_at: Some("2025-05-10T18:45:00.000".to_string()),
            incident_type: Some("HURTO BICICLETAS".to_string()),
            zone_hint: Some(" KENNEDY ".to_string()),
            latitude: Some("4.6280".to_string()),
            longitude: Some("-74.1530".to_string()),
            quantity: None,
        }
    }

    #[test]
    fn normalizes_valid_record() {
        let incidents = normalize(&raw(), "SIEDCO").unwrap();
        assert_eq!(incidents.len(), 1);

        let incident = &incidents[0];
        assert_eq!(incident.subcategory, IncidentSubcategory::BicycleTheft);
        assert_eq!(incident.zone_hint.as_deref(), Some("KENNEDY"));
        assert_eq!(incident.source, "SIEDCO");
        assert!((incident.coordinates.latitude - 4.628).abs() < f64::EPSILON);
    }

    #[test]
    fn expands_quantity_one_second_apart() {
        let record = RawIncident {
            quantity: Some(3),
            ..raw()
        };
        let incidents = normalize(&record, "SIEDCO").unwrap();
        assert_eq!(incidents.len(), 3);
        assert_eq!(
            incidents[2].occurred_at - incidents[0].occurred_at,
            Duration::seconds(2)
        );
        assert_ne!(incidents[0].key(), incidents[1].key());

        let zero = RawIncident {
            quantity: Some(0),
            ..raw()
        };
        assert_eq!(normalize(&zero, "SIEDCO").unwrap().len(), 1);
    }

    #[test]
    fn skips_implausible_quantity() {
        let at_cap = RawIncident {
            quantity: Some(MAX_QUANTITY),
            ..raw()
        };
        assert_eq!(
            normalize(&at_cap, "SIEDCO").unwrap().len(),
            MAX_QUANTITY as usize
        );

        let records = vec![
            raw(),
            RawIncident {
                quantity: Some(u32::MAX),
                ..raw()
            },
        ];
        let (incidents, skipped) = normalize_all(&records, "SIEDCO");
        assert_eq!(incidents.len(), 1);
        assert_eq!(skipped.get(SkipReason::ImplausibleQuantity), 1);

        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["implausible_quantity"], 1);
    }

    #[test]
    fn classifies_malformed_records() {
        let cases = [
            (
                RawIncident {
                    occurred_at: None,
                    ..raw()
                },
                SkipReason::MissingTimestamp,
            ),
            (
                RawIncident {
                    occurred_at: Some("yesterday".to_string()),
                    ..raw()
                },
                SkipReason::InvalidTimestamp,
            ),
            (
                RawIncident {
                    latitude: None,
                    ..raw()
                },
                SkipReason::MissingCoordinates,
            ),
            (
                RawIncident {
                    latitude: Some("0".to_string()),
                    ..raw()
                },
                SkipReason::InvalidCoordinates,
            ),
        ];

        for (record, expected) in cases {
            assert_eq!(normalize(&record, "SIEDCO"), Err(expected));
        }
    }

    #[test]
    fn counts_skips_by_reason() {
        let records = vec![
            raw(),
            RawIncident {
                latitude: None,
                ..raw()
            },
            RawIncident {
                longitude: None,
                ..raw()
            },
            RawIncident {
                occurred_at: Some("??".to_string()),
                ..raw()
            },
        ];

        let (incidents, skipped) = normalize_all(&records, "SIEDCO");
        assert_eq!(incidents.len(), 1);
        assert_eq!(skipped.total(), 3);
        assert_eq!(skipped.get(SkipReason::MissingCoordinates), 2);
        assert_eq!(skipped.get(SkipReason::InvalidTimestamp), 1);

        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["missing_coordinates"], 2);
    }
}
