//! Terminal output for query commands.

use serde::Serialize;
use zone_safety_engine::ZoneOverview;
use zone_safety_etl_models::EtlJob;
use zone_safety_metrics_models::ZoneSafetyScore;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn print_zones(zones: &[ZoneOverview]) {
    println!("{:<10} {:<28} {:<10} {:>7}  TIER", "CODE", "NAME", "KIND", "SCORE");
    println!("{}", "-".repeat(72));
    for zone in zones {
        println!(
            "{:<10} {:<28} {:<10} {:>7}  {}",
            zone.code,
            zone.name,
            zone.kind,
            or_dash(zone.safety_score.map(|s| format!("{s:.2}"))),
            or_dash(zone.risk_tier),
        );
    }
}

pub fn print_jobs(jobs: &[EtlJob]) {
    println!(
        "{:<36}  {:<11} {:<10} {:<10} {:>9} {:>9}",
        "ID", "MODE", "STATUS", "AS OF", "RECORDS", "ZONES"
    );
    println!("{}", "-".repeat(92));
    for job in jobs {
        let status = if job.is_skipped() {
            format!("{} (cached)", job.status)
        } else {
            job.status.to_string()
        };
        println!(
            "{:<36}  {:<11} {:<10} {:<10} {:>9} {:>9}",
            job.id,
            job.mode,
            status,
            job.as_of,
            job.records_processed,
            format!("{}/{}", job.zones_completed, job.zones_total),
        );
    }
}

pub fn print_history(scores: &[ZoneSafetyScore]) {
    println!(
        "{:<10} {:>7}  {:<10} {:>6} {:>9}  TREND",
        "DATE", "SCORE", "TIER", "30D", "DENSITY"
    );
    println!("{}", "-".repeat(60));
    for score in scores {
        println!(
            "{:<10} {:>7.2}  {:<10} {:>6} {:>9.2}  {} ({:+.1}%)",
            score.calculation_date,
            score.safety_score,
            score.risk_tier,
            score.thefts_30d,
            score.incident_density,
            score.trend_direction,
            score.trend_percentage,
        );
    }
}
