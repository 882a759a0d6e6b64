//! The `zones` table: the last loaded zone catalog.

use duckdb::Connection;
use zone_safety_incident_models::Coordinates;
use zone_safety_zone_models::{Zone, ZoneCatalog, ZoneKind};

use crate::DbError;
use crate::convert::parse_enum;

/// Replaces the stored catalog with `catalog`.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the previous catalog is
/// kept in that case.
pub fn replace(conn: &mut Connection, catalog: &ZoneCatalog) -> Result<usize, DbError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM zones", [])?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO zones (
                code, kind, name, parent_code, area_km2, boundary_geojson,
                centroid_lng, centroid_lat
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;

        for zone in catalog.zones() {
            stmt.execute(duckdb::params![
                zone.code,
                zone.kind.as_ref(),
                zone.name,
                zone.parent_code,
                zone.area_km2,
                zone.boundary_geojson,
                zone.centroid.map(|c| c.longitude),
                zone.centroid.map(|c| c.latitude),
            ])?;
        }
    }

    tx.commit()?;
    log::info!("Stored {} zones", catalog.len());

    Ok(catalog.len())
}

/// Loads the stored zones, ordered by code.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is unreadable.
pub fn load(conn: &Connection) -> Result<Vec<Zone>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT code, kind, name, parent_code, area_km2, boundary_geojson,
                centroid_lng, centroid_lat
         FROM zones
         ORDER BY code",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<f64>>(6)?,
            row.get::<_, Option<f64>>(7)?,
        ))
    })?;

    let mut zones = Vec::new();
    for row in rows {
        let (code, kind, name, parent_code, area_km2, boundary_geojson, lng, lat) = row?;
        let centroid = match (lng, lat) {
            (Some(lng), Some(lat)) => Some(Coordinates::new(lng, lat).map_err(|e| {
                DbError::Conversion {
                    message: format!("zone {code}: {e}"),
                }
            })?),
            _ => None,
        };

        zones.push(Zone {
            kind: parse_enum::<ZoneKind>("zone kind", &kind)?,
            code,
            name,
            parent_code,
            area_km2,
            boundary_geojson,
            centroid,
        });
    }

    Ok(zones)
}
