//! Incident type mapping.
//!
//! Maps feed-specific incident type strings to the canonical
//! [`IncidentSubcategory`] taxonomy. Feeds publish in Spanish or English
//! with their own naming, so classification is keyword based.

use zone_safety_incident_models::IncidentSubcategory;

/// Maps a raw incident type string to the canonical subcategory.
///
/// Matching is case-insensitive. Returns [`IncidentSubcategory::Unknown`]
/// when no keyword matches.
#[must_use]
pub fn map_incident_type(raw: &str) -> IncidentSubcategory {
    let lower = raw.to_lowercase();

    // Robbery before theft since "robbery" feeds often also say "theft".
    if contains_any(
        &lower,
        &["atraco", "armed robbery", "robbery", "robo a mano armada", "hurto con violencia"],
    ) {
        return IncidentSubcategory::ArmedRobbery;
    }

    if contains_any(&lower, &["bicicleta", "bicycle", "bike", "cicla"]) {
        return IncidentSubcategory::BicycleTheft;
    }
    // "automotores" contains "moto", so cars go first.
    if contains_any(
        &lower,
        &[
            "automotor",
            "vehiculo",
            "vehículo",
            "carro",
            "motor vehicle",
            "vehicle theft",
            "auto theft",
            "stolen vehicle",
        ],
    ) {
        return IncidentSubcategory::VehicleTheft;
    }
    if contains_any(&lower, &["motocicleta", "motorcycle", "scooter", "patineta"]) {
        return IncidentSubcategory::MotorcycleTheft;
    }
    if contains_any(
        &lower,
        &["comercio", "establecimiento", "shoplifting", "commercial", "business"],
    ) {
        return IncidentSubcategory::CommercialTheft;
    }
    if contains_any(
        &lower,
        &["residencia", "vivienda", "burglary", "residential", "residence"],
    ) {
        return IncidentSubcategory::ResidentialTheft;
    }
    if contains_any(
        &lower,
        &["personas", "celular", "pickpocket", "purse", "person", "hurto", "theft", "larceny"],
    ) {
        return IncidentSubcategory::PersonTheft;
    }

    if contains_any(&lower, &["lesiones", "assault", "battery", "riña"]) {
        return IncidentSubcategory::PersonalInjury;
    }
    if contains_any(&lower, &["daño", "dano en bien", "vandalism", "criminal damage"]) {
        return IncidentSubcategory::PropertyDamage;
    }

    IncidentSubcategory::Unknown
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
