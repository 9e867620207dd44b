// [libs/infra/db-turso/src/repositories/mapping.rs]

use crate::errors::DbError;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::Row;

/// Interpreta una marca temporal persistida. El Ledger mezcla dos formas:
/// RFC 3339 (escrita por Rust) y el formato plano de CURRENT_TIMESTAMP.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| DbError::MappingError(format!("TIMESTAMP_UNPARSEABLE: {raw}")))
}

pub(crate) fn get_string(row: &Row, index: i32) -> Result<String, DbError> {
    row.get::<String>(index).map_err(DbError::QueryError)
}

pub(crate) fn get_opt_string(row: &Row, index: i32) -> Result<Option<String>, DbError> {
    row.get::<Option<String>>(index).map_err(DbError::QueryError)
}

pub(crate) fn get_i64(row: &Row, index: i32) -> Result<i64, DbError> {
    row.get::<i64>(index).map_err(DbError::QueryError)
}

pub(crate) fn get_opt_i64(row: &Row, index: i32) -> Result<Option<i64>, DbError> {
    row.get::<Option<i64>>(index).map_err(DbError::QueryError)
}

pub(crate) fn get_opt_f64(row: &Row, index: i32) -> Result<Option<f64>, DbError> {
    row.get::<Option<f64>>(index).map_err(DbError::QueryError)
}

pub(crate) fn get_bool(row: &Row, index: i32) -> Result<bool, DbError> {
    Ok(get_i64(row, index)? != 0)
}

pub(crate) fn get_timestamp(row: &Row, index: i32) -> Result<DateTime<Utc>, DbError> {
    parse_timestamp(&get_string(row, index)?)
}

pub(crate) fn get_opt_timestamp(row: &Row, index: i32) -> Result<Option<DateTime<Utc>>, DbError> {
    match get_opt_string(row, index)? {
        Some(raw) => Ok(Some(parse_timestamp(&raw)?)),
        None => Ok(None),
    }
}

/// Deserializa una columna JSON de lista de strings ('[]' por defecto).
pub(crate) fn get_string_list(row: &Row, index: i32) -> Result<Vec<String>, DbError> {
    let raw = get_string(row, index)?;
    serde_json::from_str(&raw)
        .map_err(|fault| DbError::MappingError(format!("JSON_LIST_MALFORMED: {fault}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_timestamp_dialects_are_accepted() {
        assert!(parse_timestamp("2026-03-01T10:00:00+00:00").is_ok());
        assert!(parse_timestamp("2026-03-01 10:00:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
