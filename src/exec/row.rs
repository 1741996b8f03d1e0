//! Row conversion: MySQL rows into JSON-shaped records.

use crate::error::Error;
use crate::expr::Expression;
use serde_json::{Map, Value};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// One result row as a string-keyed dynamic map.
pub type Record = Map<String, Value>;

/// Convert a MySQL row, mapping driver types onto JSON values. Unknown
/// types fall back to their text form.
pub fn row_to_record(row: &MySqlRow) -> Record {
    let mut record = Record::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let type_name = column.type_info().name();

        let raw = row.try_get_raw(i);
        if raw.is_err() || raw.as_ref().map(|v| v.is_null()).unwrap_or(true) {
            record.insert(name, Value::Null);
            continue;
        }

        let value = match type_name {
            "BOOLEAN" => row
                .try_get::<bool, _>(i)
                .map(Value::Bool)
                .unwrap_or(Value::Null),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
                .try_get::<i64, _>(i)
                .map(|v| Value::Number(v.into()))
                .unwrap_or(Value::Null),
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => row
                .try_get::<u64, _>(i)
                .map(|v| Value::Number(v.into()))
                .unwrap_or(Value::Null),
            "FLOAT" => row
                .try_get::<f32, _>(i)
                .ok()
                .and_then(|v| serde_json::Number::from_f64(v as f64))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            "DOUBLE" => row
                .try_get::<f64, _>(i)
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            "DATETIME" | "TIMESTAMP" => row
                .try_get::<chrono::NaiveDateTime, _>(i)
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            "DATE" => row
                .try_get::<chrono::NaiveDate, _>(i)
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            "TIME" => row
                .try_get::<chrono::NaiveTime, _>(i)
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            "JSON" => row.try_get::<Value, _>(i).unwrap_or(Value::Null),
            "DECIMAL" => {
                // read as text, keep numeric when it parses cleanly
                match row.try_get::<String, _>(i) {
                    Ok(text) => text
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::String(text)),
                    Err(_) => Value::Null,
                }
            }
            "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => row
                .try_get::<String, _>(i)
                .map(Value::String)
                .unwrap_or(Value::Null),
            "VARBINARY" | "BINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
                .try_get::<Vec<u8>, _>(i)
                .map(|v| Value::String(String::from_utf8_lossy(&v).into_owned()))
                .unwrap_or(Value::Null),
            _ => row
                .try_get::<String, _>(i)
                .map(Value::String)
                .unwrap_or_else(|_| Value::String(format!("<{}>", type_name))),
        };

        record.insert(name, value);
    }

    record
}

/// Unmarshal string values of JSON-path select columns into nested
/// structures. Selected expressions of object or array kind arrive as
/// JSON text unless the driver already decoded them.
pub fn format_json_columns(record: &mut Record, select: &[Expression]) -> crate::Result<()> {
    for entry in select {
        if !entry.is_json_path() {
            continue;
        }
        let name = match entry.output_name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let text = match record.get(&name) {
            Some(Value::String(text)) => text.clone(),
            _ => continue,
        };
        let parsed: Value = serde_json::from_str(&text).map_err(|e| Error::DataFormat {
            column: name.clone(),
            message: e.to_string(),
        })?;
        record.insert(name, parsed);
    }
    Ok(())
}
