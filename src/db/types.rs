//! Row decoding into JSON.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! SQL Server rows come from tiberius rather than sqlx and are converted by
//! [`mssql_row_to_json`], which works from the cell data instead of type names.

use crate::db::dialect::Dialect;
use crate::models::RowMap;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: Dialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") || lower == "money" {
        return TypeCategory::Decimal;
    }

    if matches!(
        lower.as_str(),
        "timestamp" | "timestamptz" | "datetime" | "datetime2" | "date" | "time"
    ) {
        return TypeCategory::Temporal;
    }

    // MySQL reports BOOLEAN columns as TINYINT(1), which sqlx decodes as bool
    if lower == "bool" || lower == "boolean" || (dialect == Dialect::MsSql && lower == "bit") {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" || lower == "uniqueidentifier" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal") || name == "money"
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Value Encoding
// =============================================================================

/// Binary data is rendered as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn naive_datetime(v: chrono::NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format(DATETIME_FORMAT).to_string())
}

fn utc_datetime(v: chrono::DateTime<chrono::Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

fn date(v: chrono::NaiveDate) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%d").to_string())
}

fn time(v: chrono::NaiveTime) -> JsonValue {
    JsonValue::String(v.format("%H:%M:%S%.f").to_string())
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting sqlx rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> RowMap;
    fn column_names(&self) -> Vec<String>;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> RowMap {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Dialect::MySql);
                let value = mysql::decode_column(self, idx, type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> RowMap {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Dialect::Postgres);
                let value = postgres::decode_column(self, idx, type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        // TINYINT(1) is reported as BOOLEAN
        decode_boolean(row, idx)
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<JsonValue>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_temporal(row: &MySqlRow, idx: usize, type_name: &str) -> JsonValue {
        let decoded = match type_name.to_ascii_uppercase().as_str() {
            "TIMESTAMP" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .map(|v| v.map(utc_datetime)),
            "DATETIME" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .map(|v| v.map(naive_datetime)),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .map(|v| v.map(date)),
            _ => row
                .try_get::<Option<chrono::NaiveTime>, _>(idx)
                .map(|v| v.map(time)),
        };
        match decoded {
            Ok(v) => v.unwrap_or(JsonValue::Null),
            // Zero dates and negative TIME values do not fit chrono
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return JsonValue::String(v);
        }
        // VARBINARY-backed text under some charset settings
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|bytes| match String::from_utf8(bytes) {
                Ok(s) => JsonValue::String(s),
                Err(e) => encode_binary(e.as_bytes()),
            })
            .unwrap_or(JsonValue::Null)
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<JsonValue>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<uuid::Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|u| JsonValue::String(u.to_string()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_temporal(row: &PgRow, idx: usize, type_name: &str) -> JsonValue {
        let decoded = match type_name.to_ascii_uppercase().as_str() {
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .map(|v| v.map(utc_datetime)),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .map(|v| v.map(naive_datetime)),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .map(|v| v.map(date)),
            _ => row
                .try_get::<Option<chrono::NaiveTime>, _>(idx)
                .map(|v| v.map(time)),
        };
        decoded.ok().flatten().unwrap_or(JsonValue::Null)
    }

    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

// =============================================================================
// SQL Server
// =============================================================================

/// Convert a tiberius row, keeping column order.
pub fn mssql_row_to_json(row: &tiberius::Row) -> RowMap {
    use tiberius::ColumnData;

    row.cells()
        .enumerate()
        .map(|(i, (col, data))| {
            let value = match data {
                ColumnData::DateTime(Some(_))
                | ColumnData::SmallDateTime(Some(_))
                | ColumnData::DateTime2(Some(_)) => row
                    .try_get::<chrono::NaiveDateTime, _>(i)
                    .ok()
                    .flatten()
                    .map(naive_datetime)
                    .unwrap_or(JsonValue::Null),
                ColumnData::DateTimeOffset(Some(_)) => row
                    .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                    .ok()
                    .flatten()
                    .map(utc_datetime)
                    .unwrap_or(JsonValue::Null),
                ColumnData::Date(Some(_)) => row
                    .try_get::<chrono::NaiveDate, _>(i)
                    .ok()
                    .flatten()
                    .map(date)
                    .unwrap_or(JsonValue::Null),
                ColumnData::Time(Some(_)) => row
                    .try_get::<chrono::NaiveTime, _>(i)
                    .ok()
                    .flatten()
                    .map(time)
                    .unwrap_or(JsonValue::Null),
                other => mssql_column_data(other),
            };
            (col.name().to_string(), value)
        })
        .collect()
}

fn mssql_column_data(data: &tiberius::ColumnData<'_>) -> JsonValue {
    use tiberius::ColumnData;

    match data {
        ColumnData::Bit(Some(b)) => JsonValue::Bool(*b),
        ColumnData::U8(Some(v)) => JsonValue::Number((*v).into()),
        ColumnData::I16(Some(v)) => JsonValue::Number((*v).into()),
        ColumnData::I32(Some(v)) => JsonValue::Number((*v).into()),
        ColumnData::I64(Some(v)) => JsonValue::Number((*v).into()),
        ColumnData::F32(Some(v)) => float_value(*v as f64),
        ColumnData::F64(Some(v)) => float_value(*v),
        // Exact decimal text, same as RawDecimal on the sqlx side
        ColumnData::Numeric(Some(n)) => JsonValue::String(n.to_string()),
        ColumnData::String(Some(s)) => JsonValue::String(s.to_string()),
        ColumnData::Guid(Some(g)) => JsonValue::String(g.to_string()),
        ColumnData::Binary(Some(b)) => encode_binary(b),
        ColumnData::Xml(Some(xml)) => JsonValue::String(xml.to_string()),
        _ => JsonValue::Null,
    }
}
