use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use sea_query::{Alias, QueryStatementWriter, SqliteQueryBuilder, Value as SeaValue};

use tabula_core::{
    format_timestamp, parse_timestamp, SemanticType, TabulaError, TabulaResult, Value,
};

pub(crate) fn alias(name: &str) -> Alias {
    Alias::new(name)
}

pub(crate) fn build_stmt<S: QueryStatementWriter>(stmt: &S) -> (String, Vec<SqlValue>) {
    let (sql, values) = stmt.build(SqliteQueryBuilder);
    let bound = values.0.into_iter().map(sea_to_sql).collect();
    (sql, bound)
}

pub(crate) fn exec<S: QueryStatementWriter>(conn: &Connection, stmt: &S) -> TabulaResult<usize> {
    let (sql, values) = build_stmt(stmt);
    Ok(conn.execute(&sql, params_from_iter(values.iter()))?)
}

pub(crate) fn query_all<S, T, F>(conn: &Connection, stmt: &S, map: F) -> TabulaResult<Vec<T>>
where
    S: QueryStatementWriter,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let (sql, values) = build_stmt(stmt);
    let mut prepared = conn.prepare(&sql)?;
    let rows = prepared
        .query_map(params_from_iter(values.iter()), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn query_one<S, T, F>(conn: &Connection, stmt: &S, map: F) -> TabulaResult<Option<T>>
where
    S: QueryStatementWriter,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    let (sql, values) = build_stmt(stmt);
    Ok(conn
        .query_row(&sql, params_from_iter(values.iter()), map)
        .optional()?)
}

/// Binds a value for writing; null sentinels become SQL NULL.
pub(crate) fn value_to_sea(value: &Value) -> TabulaResult<SeaValue> {
    if value.is_null() {
        return Ok(null_sea(value.semantic_type()));
    }
    let bound = match value {
        Value::Float(v) => SeaValue::from(*v),
        Value::Integer(v) => SeaValue::from(*v),
        Value::String(v) => SeaValue::from(v.clone()),
        Value::Timestamp(v) => SeaValue::from(format_timestamp(*v)?),
    };
    Ok(bound)
}

pub(crate) fn null_sea(semantic_type: SemanticType) -> SeaValue {
    match semantic_type {
        SemanticType::Float => SeaValue::Double(None),
        SemanticType::Integer => SeaValue::BigInt(None),
        SemanticType::String | SemanticType::Timestamp => SeaValue::String(None),
    }
}

/// Reads column `idx` as `semantic_type`; SQL NULL yields the null sentinel.
pub(crate) fn read_value(
    row: &Row<'_>,
    idx: usize,
    semantic_type: SemanticType,
) -> rusqlite::Result<Value> {
    let value = match semantic_type {
        SemanticType::Float => row.get::<_, Option<f64>>(idx)?.map(Value::Float),
        SemanticType::Integer => row.get::<_, Option<i64>>(idx)?.map(Value::Integer),
        SemanticType::String => row.get::<_, Option<String>>(idx)?.map(Value::String),
        SemanticType::Timestamp => match row.get::<_, Option<String>>(idx)? {
            Some(raw) => Some(Value::Timestamp(parse_timestamp(&raw).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
            })?)),
            None => None,
        },
    };
    Ok(value.unwrap_or_else(|| semantic_type.null_value()))
}

fn sea_to_sql(value: SeaValue) -> SqlValue {
    #[allow(unreachable_patterns)]
    let bound = match value {
        SeaValue::Bool(v) => v.map(|v| SqlValue::Integer(i64::from(v))),
        SeaValue::TinyInt(v) => v.map(|v| SqlValue::Integer(i64::from(v))),
        SeaValue::SmallInt(v) => v.map(|v| SqlValue::Integer(i64::from(v))),
        SeaValue::Int(v) => v.map(|v| SqlValue::Integer(i64::from(v))),
        SeaValue::BigInt(v) => v.map(SqlValue::Integer),
        SeaValue::TinyUnsigned(v) => v.map(|v| SqlValue::Integer(i64::from(v))),
        SeaValue::SmallUnsigned(v) => v.map(|v| SqlValue::Integer(i64::from(v))),
        SeaValue::Unsigned(v) => v.map(|v| SqlValue::Integer(i64::from(v))),
        SeaValue::BigUnsigned(v) => v.map(|v| SqlValue::Integer(v as i64)),
        SeaValue::Float(v) => v.map(|v| SqlValue::Real(f64::from(v))),
        SeaValue::Double(v) => v.map(SqlValue::Real),
        SeaValue::String(v) => v.map(|v| SqlValue::Text(v.to_string())),
        SeaValue::Char(v) => v.map(|v| SqlValue::Text(v.to_string())),
        SeaValue::Bytes(v) => v.map(|v| SqlValue::Blob(v.to_vec())),
        _ => None,
    };
    bound.unwrap_or(SqlValue::Null)
}

pub(crate) fn storage_error(context: &str, err: impl std::fmt::Display) -> TabulaError {
    TabulaError::storage(format!("{context}: {err}"))
}
