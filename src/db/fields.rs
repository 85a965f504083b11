// src/db/fields.rs
//
// Field descriptors: the explicit column lists entities persist
//
// A full record describes every column with a value. A partial record
// describes only the columns the caller supplied; an explicit null is a
// value (`Value::Null`), an omitted field is no value at all.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Row;

/// One persisted column and the value a record carries for it
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub column: &'static str,
    /// `None` means "leave the column alone"
    pub value: Option<Value>,
}

impl Field {
    /// A column that is always written
    pub fn set<T: ToValue + ?Sized>(column: &'static str, value: &T) -> Self {
        Field {
            column,
            value: Some(value.to_value()),
        }
    }

    /// A column that is written only if the caller supplied it
    pub fn patch<T: ToValue>(column: &'static str, value: &Option<T>) -> Self {
        Field {
            column,
            value: value.as_ref().map(ToValue::to_value),
        }
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// Conversion from a domain value to a store value
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Real(*self)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }
}

impl ToValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::Text(self.format(DATE_FORMAT).to_string())
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Text(self.to_rfc3339())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

/// A type persisted as one row of one table
pub trait Entity: Sized {
    const TABLE: &'static str;

    fn id(&self) -> i64;

    /// Persisted columns, primary key excluded
    fn fields(&self) -> Vec<Field>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// A partial update of an entity
pub trait PartialEntity {
    fn id(&self) -> i64;

    /// Columns with `None` values are left untouched
    fn fields(&self) -> Vec<Field>;
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn column_index(row: &Row<'_>, column: &str) -> rusqlite::Result<usize> {
    row.as_ref().column_index(column)
}

/// Read a nullable `YYYY-MM-DD` column
///
/// Empty strings and the zero date are treated as unset.
pub fn get_date(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(column)?;
    match raw.as_deref() {
        None | Some("") | Some("0001-01-01") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Some)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    column_index(row, column).unwrap_or(0),
                    Type::Text,
                    Box::new(e),
                )
            }),
    }
}

/// Read a non-null RFC 3339 timestamp column
pub fn get_timestamp(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_timestamp(row, column, &raw)
}

/// Read a nullable RFC 3339 timestamp column
pub fn get_optional_timestamp(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| parse_timestamp(row, column, &s)).transpose()
}

fn parse_timestamp(row: &Row<'_>, column: &str, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column_index(row, column).unwrap_or(0),
                Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_distinguishes_absent_from_null() {
        let absent: Option<Option<String>> = None;
        let cleared: Option<Option<String>> = Some(None);
        let set: Option<Option<String>> = Some(Some("x".to_string()));

        assert_eq!(Field::patch("title", &absent).value, None);
        assert_eq!(Field::patch("title", &cleared).value, Some(Value::Null));
        assert_eq!(
            Field::patch("title", &set).value,
            Some(Value::Text("x".to_string()))
        );
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(true.to_value(), Value::Integer(1));
        assert_eq!(
            NaiveDate::from_ymd_opt(2020, 1, 31).unwrap().to_value(),
            Value::Text("2020-01-31".to_string())
        );
        assert_eq!(Option::<i64>::None.to_value(), Value::Null);
    }

    #[test]
    fn test_date_reading() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let (a, b, c): (Option<NaiveDate>, Option<NaiveDate>, Option<NaiveDate>) = conn
            .query_row(
                "SELECT '2021-05-04' AS a, '0001-01-01' AS b, NULL AS c",
                [],
                |row| Ok((get_date(row, "a")?, get_date(row, "b")?, get_date(row, "c")?)),
            )
            .unwrap();

        assert_eq!(a, NaiveDate::from_ymd_opt(2021, 5, 4));
        assert_eq!(b, None);
        assert_eq!(c, None);
    }

    #[test]
    fn test_bad_timestamp_is_conversion_error() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let result = conn.query_row("SELECT 'yesterday' AS t", [], |row| get_timestamp(row, "t"));
        assert!(matches!(
            result,
            Err(rusqlite::Error::FromSqlConversionFailure(0, Type::Text, _))
        ));
    }
}
