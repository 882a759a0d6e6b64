//! The `incidents` table.
//!
//! Incidents are insert-only and unique on `(occurred_at, longitude,
//! latitude)`. Re-ingesting an overlapping window stores nothing twice.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use duckdb::Connection;
use zone_safety_incident_models::{Coordinates, Incident, IncidentSubcategory};

use crate::DbError;
use crate::convert::{format_timestamp, parse_enum, parse_timestamp, require_timestamp, to_u64};

/// Number of rows per INSERT chunk (`DuckDB` handles large batches well).
const CHUNK_SIZE: usize = 5_000;

/// Inserts incidents, ignoring any whose key is already stored.
///
/// Returns the number of new rows.
///
/// # Errors
///
/// Returns [`DbError`] if any database operation fails.
pub fn insert_incidents(conn: &Connection, incidents: &[Incident]) -> Result<u64, DbError> {
    if incidents.is_empty() {
        return Ok(0);
    }

    // Deduplicate within the batch: keep the first occurrence of each key
    let mut seen = BTreeSet::new();
    let deduped: Vec<&Incident> = incidents
        .iter()
        .filter(|incident| seen.insert(incident.key()))
        .collect();

    if deduped.len() < incidents.len() {
        log::info!(
            "Deduplicated INSERT batch: {} -> {} rows ({} duplicates removed)",
            incidents.len(),
            deduped.len(),
            incidents.len() - deduped.len(),
        );
    }

    let before = count(conn)?;

    for chunk in deduped.chunks(CHUNK_SIZE) {
        let mut sql = String::from(
            "INSERT INTO incidents (
                occurred_at, longitude, latitude, category, subcategory,
                zone_hint, source
            ) VALUES ",
        );

        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str("(CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?)");
        }
        sql.push_str(" ON CONFLICT DO NOTHING");

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for incident in chunk {
            stmt.raw_bind_parameter(param_idx, format_timestamp(&incident.occurred_at))?;
            stmt.raw_bind_parameter(param_idx + 1, incident.coordinates.longitude)?;
            stmt.raw_bind_parameter(param_idx + 2, incident.coordinates.latitude)?;
            stmt.raw_bind_parameter(param_idx + 3, incident.category().as_ref())?;
            stmt.raw_bind_parameter(param_idx + 4, incident.subcategory.as_ref())?;
            stmt.raw_bind_parameter(param_idx + 5, incident.zone_hint.as_deref())?;
            stmt.raw_bind_parameter(param_idx + 6, incident.source.as_str())?;
            param_idx += 7;
        }

        stmt.raw_execute()?;
    }

    Ok(count(conn)?.saturating_sub(before))
}

/// Returns the number of stored incidents.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count(conn: &Connection) -> Result<u64, DbError> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM incidents")?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    to_u64("incident count", count)
}

/// Returns incidents with `start <= occurred_at <= end`, oldest first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored row is unreadable.
pub fn between(
    conn: &Connection,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> Result<Vec<Incident>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT occurred_at::TEXT, longitude, latitude, subcategory, zone_hint, source
         FROM incidents
         WHERE occurred_at BETWEEN CAST(? AS TIMESTAMP) AND CAST(? AS TIMESTAMP)
         ORDER BY occurred_at, longitude, latitude",
    )?;

    let rows = stmt.query_map(
        duckdb::params![format_timestamp(start), format_timestamp(end)],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        },
    )?;

    let mut incidents = Vec::new();
    for row in rows {
        let (occurred_at, longitude, latitude, subcategory, zone_hint, source) = row?;
        let coordinates =
            Coordinates::new(longitude, latitude).map_err(|e| DbError::Conversion {
                message: e.to_string(),
            })?;
        incidents.push(Incident {
            occurred_at: require_timestamp(&occurred_at)?,
            subcategory: parse_enum::<IncidentSubcategory>("subcategory", &subcategory)?,
            zone_hint,
            coordinates,
            source,
        });
    }

    Ok(incidents)
}

/// Returns the maximum `occurred_at` timestamp, or `None` if no incidents
/// exist.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn max_occurred_at(conn: &Connection) -> Result<Option<DateTime<Utc>>, DbError> {
    let mut stmt = conn.prepare("SELECT MAX(occurred_at)::TEXT FROM incidents")?;
    let result: Option<String> = stmt.query_row([], |row| row.get(0))?;

    Ok(result.and_then(|s| parse_timestamp(&s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_schema;
    use chrono::TimeZone as _;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        conn
    }

    fn incident(hour: u32, lng: f64) -> Incident {
        Incident {
            occurred_at: Utc.with_ymd_and_hms(2025, 5, 10, hour, 15, 0).unwrap(),
            subcategory: IncidentSubcategory::BicycleTheft,
            zone_hint: Some("KENNEDY".to_string()),
            coordinates: Coordinates::new(lng, 4.62).unwrap(),
            source: "SIEDCO".to_string(),
        }
    }

    #[test]
    fn deduplicates_within_batch_and_across_runs() {
        let conn = conn();
        let batch = vec![incident(8, -74.1), incident(8, -74.1), incident(9, -74.1)];

        assert_eq!(insert_incidents(&conn, &batch).unwrap(), 2);
        assert_eq!(insert_incidents(&conn, &batch).unwrap(), 0);

        let more = vec![incident(9, -74.1), incident(9, -74.2)];
        assert_eq!(insert_incidents(&conn, &more).unwrap(), 1);
        assert_eq!(count(&conn).unwrap(), 3);
    }

    #[test]
    fn reads_back_window_inclusively() {
        let conn = conn();
        insert_incidents(&conn, &[incident(6, -74.1), incident(8, -74.1), incident(10, -74.1)])
            .unwrap();

        let start = Utc.with_ymd_and_hms(2025, 5, 10, 6, 15, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 5, 10, 8, 15, 0).unwrap();
        let found = between(&conn, &start, &end).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0], incident(6, -74.1));
        assert_eq!(found[1].zone_hint.as_deref(), Some("KENNEDY"));
    }

    #[test]
    fn tracks_latest_timestamp() {
        let conn = conn();
        assert_eq!(max_occurred_at(&conn).unwrap(), None);

        insert_incidents(&conn, &[incident(6, -74.1), incident(14, -74.1)]).unwrap();
        assert_eq!(
            max_occurred_at(&conn).unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 5, 10, 14, 15, 0).unwrap())
        );
    }
}
