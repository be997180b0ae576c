//! Row decoding for exports.
//!
//! Column types are classified into a [`TypeCategory`] once, then decoded by a
//! backend-specific function into a JSON value. Rows become ordered [`Record`]s whose
//! keys follow the column order of the SELECT.

use crate::models::DatabaseType;
use crate::transporter::Record;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked first: "numeric" would otherwise fall through to the float rules.
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity stores floats
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    TypeCategory::Text
}

/// DECIMAL/NUMERIC values kept as their exact textual representation.
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
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary columns export as text when they hold UTF-8, base64 otherwise.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Conversion of a fetched row into an export [`Record`].
pub trait RowToRecord {
    fn to_record(&self) -> Record;
}

macro_rules! impl_row_to_record {
    ($row:ty, $db:expr, $decode:path) => {
        impl RowToRecord for $row {
            fn to_record(&self) -> Record {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let category = categorize_type(col.type_info().name(), $db);
                        (col.name().to_string(), $decode(self, idx, category))
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_record!(MySqlRow, DatabaseType::MySQL, mysql::decode_column);
impl_row_to_record!(PgRow, DatabaseType::PostgreSQL, postgres::decode_column);
impl_row_to_record!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => row
                .try_get::<Option<RawDecimal>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, |v| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, JsonValue::Bool),
            TypeCategory::Float => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .or_else(|| {
                    row.try_get::<Option<f32>, _>(idx)
                        .ok()
                        .flatten()
                        .map(f64::from)
                })
                .map_or(JsonValue::Null, float_value),
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, |v| decode_binary_value(&v)),
            TypeCategory::Json => row
                .try_get::<Option<JsonValue>, _>(idx)
                .ok()
                .flatten()
                .unwrap_or(JsonValue::Null),
            TypeCategory::Text => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, JsonValue::String),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        // UNSIGNED columns do not decode as i64
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => row
                .try_get::<Option<RawDecimal>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, |v| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, JsonValue::Bool),
            TypeCategory::Float => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .or_else(|| {
                    row.try_get::<Option<f32>, _>(idx)
                        .ok()
                        .flatten()
                        .map(f64::from)
                })
                .map_or(JsonValue::Null, float_value),
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, |v| decode_binary_value(&v)),
            TypeCategory::Json => row
                .try_get::<Option<JsonValue>, _>(idx)
                .ok()
                .flatten()
                .unwrap_or(JsonValue::Null),
            TypeCategory::Text => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, JsonValue::String),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, |v| JsonValue::Number(v.into())),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, JsonValue::Bool),
            TypeCategory::Float | TypeCategory::Decimal => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, float_value),
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map_or(JsonValue::Null, |v| decode_binary_value(&v)),
            TypeCategory::Json | TypeCategory::Text => decode_dynamic(row, idx),
        }
    }

    /// Untyped or loosely typed columns: SQLite stores any value class in them.
    fn decode_dynamic(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return JsonValue::String(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return decode_binary_value(&v);
        }
        JsonValue::Null
    }
}
