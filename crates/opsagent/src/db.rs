// Copyright 2025 OpsAgent Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Consolidated storage access for OpsAgent: pool construction, tolerant
// decoding of descriptor fields, and generic row-to-JSON conversion for
// dynamically shaped result sets.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo, ValueRef};

/// Connect a Postgres pool from `OA_DATABASE_URL` (falling back to
/// `DATABASE_URL`). Pool size comes from `OA_DB_POOL_SIZE`, default 5.
pub async fn connect_pool() -> Result<PgPool> {
    let url = std::env::var("OA_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .context("OA_DATABASE_URL or DATABASE_URL must be set")?;
    let size: u32 = std::env::var("OA_DB_POOL_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
    let pool = PgPoolOptions::new()
        .max_connections(size)
        .connect(&url)
        .await
        .context("failed to connect to database")?;
    Ok(pool)
}

/// Decode the `columns` field of a descriptor row. Older rows store a
/// comma-joined string (occasionally a JSON array rendered as text),
/// newer ones a native text array. Unknown shapes decode to empty.
pub fn decode_column_list(row: &PgRow) -> Vec<String> {
    if let Ok(Some(cols)) = row.try_get::<Option<Vec<String>>, _>("columns") {
        return cols;
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>("columns") {
        let trimmed = s.trim();
        if trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Vec<String>>(trimmed) {
                return parsed;
            }
        }
        return trimmed
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
    }
    Vec::new()
}

/// Fetch the raw `embed` field of a descriptor row without committing to a
/// physical type: text columns surface as a JSON string, native float
/// arrays as a JSON array. `similarity::parse_embedding` does the rest.
pub fn decode_embedding(row: &PgRow) -> Option<Value> {
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>("embed") {
        return Some(Value::String(s));
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<f64>>, _>("embed") {
        return Some(Value::Array(
            v.into_iter()
                .map(|x| serde_json::json!(x))
                .collect::<Vec<_>>(),
        ));
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>("embed") {
        return Some(j);
    }
    None
}

/// Convert dynamically shaped rows (a generated query's result set) into
/// JSON objects keyed by column name.
pub fn rows_to_json(rows: &[PgRow]) -> Vec<Value> {
    rows.iter().map(row_to_json).collect()
}

pub fn row_to_json(row: &PgRow) -> Value {
    let mut obj = serde_json::Map::with_capacity(row.columns().len());
    for (idx, col) in row.columns().iter().enumerate() {
        obj.insert(col.name().to_string(), decode_value(row, idx));
    }
    Value::Object(obj)
}

fn decode_value(row: &PgRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        _ => {}
    }
    let type_name = row.columns()[idx].type_info().name().to_string();
    match type_name.as_str() {
        "BOOL" => row
            .try_get::<bool, _>(idx)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "INT2" => row
            .try_get::<i16, _>(idx)
            .map(|v| serde_json::json!(v))
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<i32, _>(idx)
            .map(|v| serde_json::json!(v))
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<i64, _>(idx)
            .map(|v| serde_json::json!(v))
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<f32, _>(idx)
            .map(|v| serde_json::json!(v))
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<f64, _>(idx)
            .map(|v| serde_json::json!(v))
            .unwrap_or(Value::Null),
        "NUMERIC" => row
            .try_get::<Decimal, _>(idx)
            .map(|d| match d.to_f64() {
                Some(f) => serde_json::json!(f),
                None => Value::String(d.to_string()),
            })
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(idx)
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(|t| Value::String(t.to_rfc3339()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx).unwrap_or(Value::Null),
        "TEXT[]" | "VARCHAR[]" => row
            .try_get::<Vec<String>, _>(idx)
            .map(|v| serde_json::json!(v))
            .unwrap_or(Value::Null),
        "FLOAT8[]" => row
            .try_get::<Vec<f64>, _>(idx)
            .map(|v| serde_json::json!(v))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(idx)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Look up the caller's stored user row for the trace. Failures (unknown
/// id, unparseable uuid, schema drift) yield `None`, never an error: the
/// lookup is informational and must not fail the request.
pub async fn fetch_caller(pool: &PgPool, caller_id: &str) -> Option<Value> {
    let rows = sqlx::query("SELECT * FROM users WHERE id = $1::uuid")
        .bind(caller_id)
        .fetch_all(pool)
        .await;
    match rows {
        Ok(rows) => rows.first().map(|r| {
            let mut v = row_to_json(r);
            if let Some(obj) = v.as_object_mut() {
                obj.remove("embed");
            }
            v
        }),
        Err(e) => {
            log::debug!("caller lookup failed for '{}': {}", caller_id, e);
            None
        }
    }
}
