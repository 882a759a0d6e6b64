//! Table definitions, created on open.

use duckdb::Connection;

use crate::DbError;

/// Creates every table that does not exist yet.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS incidents (
            occurred_at TIMESTAMP NOT NULL,
            longitude DOUBLE NOT NULL,
            latitude DOUBLE NOT NULL,
            category TEXT NOT NULL,
            subcategory TEXT NOT NULL,
            zone_hint TEXT,
            source TEXT NOT NULL,
            PRIMARY KEY (occurred_at, longitude, latitude)
        );

        CREATE TABLE IF NOT EXISTS zones (
            code TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            parent_code TEXT,
            area_km2 DOUBLE NOT NULL,
            boundary_geojson TEXT,
            centroid_lng DOUBLE,
            centroid_lat DOUBLE
        );

        CREATE TABLE IF NOT EXISTS infrastructure (
            kind TEXT NOT NULL,
            id TEXT NOT NULL,
            zone_code TEXT,
            payload TEXT NOT NULL,
            PRIMARY KEY (kind, id)
        );

        CREATE TABLE IF NOT EXISTS zone_safety_scores (
            zone_code TEXT NOT NULL,
            calculation_date DATE NOT NULL,
            zone_name TEXT NOT NULL,
            zone_kind TEXT NOT NULL,
            safety_score DOUBLE NOT NULL,
            risk_tier TEXT NOT NULL,
            thefts_7d BIGINT NOT NULL,
            thefts_30d BIGINT NOT NULL,
            thefts_90d BIGINT NOT NULL,
            incident_density DOUBLE NOT NULL,
            lane_coverage_km DOUBLE NOT NULL,
            lane_density DOUBLE NOT NULL,
            parking_spots BIGINT NOT NULL,
            parking_density DOUBLE NOT NULL,
            trend_direction TEXT NOT NULL,
            trend_percentage DOUBLE NOT NULL,
            recommendations TEXT NOT NULL,
            job_id TEXT,
            PRIMARY KEY (zone_code, calculation_date)
        );

        CREATE TABLE IF NOT EXISTS etl_jobs (
            id TEXT PRIMARY KEY,
            mode TEXT NOT NULL,
            status TEXT NOT NULL,
            as_of DATE NOT NULL,
            created_at TIMESTAMP NOT NULL,
            started_at TIMESTAMP,
            finished_at TIMESTAMP,
            records_processed BIGINT NOT NULL,
            zones_total BIGINT NOT NULL,
            zones_completed BIGINT NOT NULL,
            error TEXT,
            metadata TEXT NOT NULL
        );",
    )?;

    Ok(())
}
