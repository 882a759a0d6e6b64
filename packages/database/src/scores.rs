//! The `zone_safety_scores` table.
//!
//! One row per `(zone_code, calculation_date)`. Runs upsert their rows, so
//! the latest writer wins and earlier dates are never touched.

use chrono::NaiveDate;
use duckdb::{Connection, Row};
use uuid::Uuid;
use zone_safety_metrics_models::{RiskTier, TrendDirection, ZoneSafetyScore};
use zone_safety_zone_models::ZoneKind;

use crate::DbError;
use crate::convert::{format_date, parse_date, parse_enum, to_u32};

const COLUMNS: &str = "zone_code, calculation_date::TEXT, zone_name, zone_kind, safety_score,
    risk_tier, thefts_7d, thefts_30d, thefts_90d, incident_density, lane_coverage_km,
    lane_density, parking_spots, parking_density, trend_direction, trend_percentage,
    recommendations, job_id";

/// Raw column values of one score row.
struct ScoreRow {
    zone_code: String,
    calculation_date: String,
    zone_name: String,
    zone_kind: String,
    safety_score: f64,
    risk_tier: String,
    thefts_7d: i64,
    thefts_30d: i64,
    thefts_90d: i64,
    incident_density: f64,
    lane_coverage_km: f64,
    lane_density: f64,
    parking_spots: i64,
    parking_density: f64,
    trend_direction: String,
    trend_percentage: f64,
    recommendations: String,
    job_id: Option<String>,
}

impl ScoreRow {
    fn read(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            zone_code: row.get(0)?,
            calculation_date: row.get(1)?,
            zone_name: row.get(2)?,
            zone_kind: row.get(3)?,
            safety_score: row.get(4)?,
            risk_tier: row.get(5)?,
            thefts_7d: row.get(6)?,
            thefts_30d: row.get(7)?,
            thefts_90d: row.get(8)?,
            incident_density: row.get(9)?,
            lane_coverage_km: row.get(10)?,
            lane_density: row.get(11)?,
            parking_spots: row.get(12)?,
            parking_density: row.get(13)?,
            trend_direction: row.get(14)?,
            trend_percentage: row.get(15)?,
            recommendations: row.get(16)?,
            job_id: row.get(17)?,
        })
    }
}

impl TryFrom<ScoreRow> for ZoneSafetyScore {
    type Error = DbError;

    fn try_from(row: ScoreRow) -> Result<Self, Self::Error> {
        let job_id = row
            .job_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| DbError::Conversion {
                message: format!("invalid job id: {e}"),
            })?;

        Ok(Self {
            calculation_date: parse_date(&row.calculation_date)?,
            zone_kind: parse_enum::<ZoneKind>("zone_kind", &row.zone_kind)?,
            risk_tier: parse_enum::<RiskTier>("risk_tier", &row.risk_tier)?,
            thefts_7d: to_u32("thefts_7d", row.thefts_7d)?,
            thefts_30d: to_u32("thefts_30d", row.thefts_30d)?,
            thefts_90d: to_u32("thefts_90d", row.thefts_90d)?,
            parking_spots: to_u32("parking_spots", row.parking_spots)?,
            trend_direction: parse_enum::<TrendDirection>(
                "trend_direction",
                &row.trend_direction,
            )?,
            recommendations: serde_json::from_str(&row.recommendations)?,
            zone_code: row.zone_code,
            zone_name: row.zone_name,
            safety_score: row.safety_score,
            incident_density: row.incident_density,
            lane_coverage_km: row.lane_coverage_km,
            lane_density: row.lane_density,
            parking_density: row.parking_density,
            trend_percentage: row.trend_percentage,
            job_id,
        })
    }
}

fn query(
    conn: &Connection,
    filter: &str,
    params: &[&dyn duckdb::ToSql],
) -> Result<Vec<ZoneSafetyScore>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM zone_safety_scores {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, ScoreRow::read)?;

    let mut scores = Vec::new();
    for row in rows {
        scores.push(ZoneSafetyScore::try_from(row?)?);
    }
    Ok(scores)
}

/// Inserts or replaces the row for `(zone_code, calculation_date)`.
///
/// # Errors
///
/// Returns [`DbError`] if encoding or the upsert fails.
pub fn upsert(conn: &Connection, score: &ZoneSafetyScore) -> Result<(), DbError> {
    let recommendations = serde_json::to_string(&score.recommendations)?;
    let job_id = score.job_id.map(|id| id.to_string());

    conn.execute(
        "INSERT INTO zone_safety_scores (
            zone_code, calculation_date, zone_name, zone_kind, safety_score,
            risk_tier, thefts_7d, thefts_30d, thefts_90d, incident_density,
            lane_coverage_km, lane_density, parking_spots, parking_density,
            trend_direction, trend_percentage, recommendations, job_id
        ) VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (zone_code, calculation_date) DO UPDATE SET
            zone_name = EXCLUDED.zone_name,
            zone_kind = EXCLUDED.zone_kind,
            safety_score = EXCLUDED.safety_score,
            risk_tier = EXCLUDED.risk_tier,
            thefts_7d = EXCLUDED.thefts_7d,
            thefts_30d = EXCLUDED.thefts_30d,
            thefts_90d = EXCLUDED.thefts_90d,
            incident_density = EXCLUDED.incident_density,
            lane_coverage_km = EXCLUDED.lane_coverage_km,
            lane_density = EXCLUDED.lane_density,
            parking_spots = EXCLUDED.parking_spots,
            parking_density = EXCLUDED.parking_density,
            trend_direction = EXCLUDED.trend_direction,
            trend_percentage = EXCLUDED.trend_percentage,
            recommendations = EXCLUDED.recommendations,
            job_id = EXCLUDED.job_id",
        duckdb::params![
            score.zone_code,
            format_date(score.calculation_date),
            score.zone_name,
            score.zone_kind.as_ref(),
            score.safety_score,
            score.risk_tier.as_ref(),
            i64::from(score.thefts_7d),
            i64::from(score.thefts_30d),
            i64::from(score.thefts_90d),
            score.incident_density,
            score.lane_coverage_km,
            score.lane_density,
            i64::from(score.parking_spots),
            score.parking_density,
            score.trend_direction.as_ref(),
            score.trend_percentage,
            recommendations,
            job_id,
        ],
    )?;

    Ok(())
}

/// Returns the row for one zone and date.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the row is unreadable.
pub fn get(
    conn: &Connection,
    zone_code: &str,
    date: NaiveDate,
) -> Result<Option<ZoneSafetyScore>, DbError> {
    let date = format_date(date);
    Ok(query(
        conn,
        "WHERE zone_code = ? AND calculation_date = CAST(? AS DATE)",
        duckdb::params![zone_code, date],
    )?
    .into_iter()
    .next())
}

/// Returns the most recent row for one zone.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the row is unreadable.
pub fn latest(conn: &Connection, zone_code: &str) -> Result<Option<ZoneSafetyScore>, DbError> {
    Ok(query(
        conn,
        "WHERE zone_code = ? ORDER BY calculation_date DESC LIMIT 1",
        duckdb::params![zone_code],
    )?
    .into_iter()
    .next())
}

/// Returns every zone's row for one date, ordered by zone code.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is unreadable.
pub fn for_date(conn: &Connection, date: NaiveDate) -> Result<Vec<ZoneSafetyScore>, DbError> {
    let date = format_date(date);
    query(
        conn,
        "WHERE calculation_date = CAST(? AS DATE) ORDER BY zone_code",
        duckdb::params![date],
    )
}

/// Returns one zone's rows on or after `since`, oldest first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is unreadable.
pub fn history(
    conn: &Connection,
    zone_code: &str,
    since: NaiveDate,
) -> Result<Vec<ZoneSafetyScore>, DbError> {
    let since = format_date(since);
    query(
        conn,
        "WHERE zone_code = ? AND calculation_date >= CAST(? AS DATE)
         ORDER BY calculation_date",
        duckdb::params![zone_code, since],
    )
}

/// Returns every zone's rows on or after `since`, grouped by zone and
/// oldest first within each zone.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is unreadable.
pub fn since(conn: &Connection, since: NaiveDate) -> Result<Vec<ZoneSafetyScore>, DbError> {
    let since = format_date(since);
    query(
        conn,
        "WHERE calculation_date >= CAST(? AS DATE) ORDER BY zone_code, calculation_date",
        duckdb::params![since],
    )
}

/// Returns the newest calculation date with any rows.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn latest_date(conn: &Connection) -> Result<Option<NaiveDate>, DbError> {
    let mut stmt = conn.prepare("SELECT MAX(calculation_date)::TEXT FROM zone_safety_scores")?;
    let result: Option<String> = stmt.query_row([], |row| row.get(0))?;
    result.as_deref().map(parse_date).transpose()
}
