//! The `infrastructure` table: lanes and parking spots as JSON payloads
//! keyed by `(kind, id)`.

use std::collections::BTreeMap;

use duckdb::Connection;
use zone_safety_infrastructure_models::InfrastructureAsset;

use crate::DbError;

const CHUNK_SIZE: usize = 5_000;

/// Replaces every stored asset with `assets`. A repeated `(kind, id)` keeps
/// the last occurrence.
///
/// # Errors
///
/// Returns [`DbError`] if encoding or any statement fails.
pub fn replace(conn: &mut Connection, assets: &[InfrastructureAsset]) -> Result<usize, DbError> {
    let mut last_seen: BTreeMap<(&str, &str), &InfrastructureAsset> = BTreeMap::new();
    for asset in assets {
        last_seen.insert((asset.kind(), asset.id()), asset);
    }

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM infrastructure", [])?;

    let deduped: Vec<&InfrastructureAsset> = last_seen.into_values().collect();
    for chunk in deduped.chunks(CHUNK_SIZE) {
        let mut sql = String::from("INSERT INTO infrastructure (kind, id, zone_code, payload) VALUES ");
        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str("(?, ?, ?, ?)");
        }

        let mut stmt = tx.prepare(&sql)?;
        let mut param_idx = 1usize;
        for asset in chunk {
            stmt.raw_bind_parameter(param_idx, asset.kind())?;
            stmt.raw_bind_parameter(param_idx + 1, asset.id())?;
            stmt.raw_bind_parameter(param_idx + 2, asset.zone_code())?;
            stmt.raw_bind_parameter(param_idx + 3, serde_json::to_string(asset)?)?;
            param_idx += 4;
        }
        stmt.raw_execute()?;
    }

    tx.commit()?;
    log::info!("Stored {} infrastructure assets", deduped.len());

    Ok(deduped.len())
}

/// Loads every stored asset, ordered by kind then id.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a payload is unreadable.
pub fn load(conn: &Connection) -> Result<Vec<InfrastructureAsset>, DbError> {
    let mut stmt = conn.prepare("SELECT payload FROM infrastructure ORDER BY kind, id")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut assets = Vec::new();
    for row in rows {
        assets.push(serde_json::from_str(&row?)?);
    }
    Ok(assets)
}
