//! Typed values and their decoding from raw text fields.

use crate::schema::ColumnType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::fmt::Display;
use thiserror::Error;
use uuid::Uuid;

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(Value),
}

/// Why a raw field could not be decoded into its column type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ParseDatumError {
    message: String,
}

impl ParseDatumError {
    fn new(message: impl Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const TIMESTAMPTZ_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

impl Datum {
    /// Decode `raw` as a value of type `ty`.
    ///
    /// Surrounding whitespace is ignored for every type except `STRING` and
    /// `BYTES`, which are taken verbatim. The empty string is never treated
    /// as NULL here; NULL substitution is the converter's job.
    ///
    /// # Errors
    /// Returns a [`ParseDatumError`] describing why the text is not a valid
    /// value of `ty`.
    pub fn parse(ty: ColumnType, raw: &str) -> Result<Self, ParseDatumError> {
        let s = raw.trim();
        match ty {
            ColumnType::Bool => parse_bool(s).map(Self::Bool),
            ColumnType::Int => s.parse::<i64>().map(Self::Int).map_err(ParseDatumError::new),
            ColumnType::Float => s.parse::<f64>().map(Self::Float).map_err(ParseDatumError::new),
            ColumnType::Decimal => s
                .parse::<Decimal>()
                .or_else(|_| Decimal::from_scientific(s))
                .map(Self::Decimal)
                .map_err(ParseDatumError::new),
            ColumnType::String => Ok(Self::String(raw.to_owned())),
            ColumnType::Bytes => parse_bytes(raw).map(Self::Bytes),
            ColumnType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Self::Date)
                .map_err(ParseDatumError::new),
            ColumnType::Time => parse_time(s).map(Self::Time),
            ColumnType::Timestamp => parse_timestamp(s).map(Self::Timestamp),
            ColumnType::Timestamptz => parse_timestamptz(s).map(Self::TimestampTz),
            ColumnType::Uuid => Uuid::parse_str(s).map(Self::Uuid).map_err(ParseDatumError::new),
            ColumnType::Json => serde_json::from_str(s).map(Self::Json).map_err(ParseDatumError::new),
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render the value as JSON. Values without a lossless JSON number form
    /// (decimals, non-finite floats, temporal types) become strings.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or_else(|| Value::String(f.to_string()), Value::Number),
            Self::Decimal(d) => Value::String(d.to_string()),
            Self::String(s) => Value::String(s.clone()),
            Self::Bytes(b) => Value::String(format!("\\x{}", hex::encode(b))),
            Self::Date(d) => Value::String(d.to_string()),
            Self::Time(t) => Value::String(t.to_string()),
            Self::Timestamp(ts) => Value::String(ts.to_string()),
            Self::TimestampTz(ts) => Value::String(ts.to_rfc3339()),
            Self::Uuid(u) => Value::String(u.to_string()),
            Self::Json(v) => v.clone(),
        }
    }
}

fn parse_bool(s: &str) -> Result<bool, ParseDatumError> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(ParseDatumError::new(format!("invalid bool value {s:?}"))),
    }
}

fn parse_bytes(raw: &str) -> Result<Vec<u8>, ParseDatumError> {
    match raw.strip_prefix("\\x") {
        Some(hex_digits) => hex::decode(hex_digits).map_err(ParseDatumError::new),
        None => Ok(raw.as_bytes().to_vec()),
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, ParseDatumError> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| ParseDatumError::new(format!("invalid time value {s:?}")))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, ParseDatumError> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| ParseDatumError::new(format!("invalid timestamp value {s:?}")))
}

fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, ParseDatumError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Some(ts) = TIMESTAMPTZ_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Ok(ts.with_timezone(&Utc));
    }
    // No offset: the value is taken to be UTC.
    parse_timestamp(s)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| ParseDatumError::new(format!("invalid timestamptz value {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bool_spellings() {
        for raw in ["true", "T", " yes ", "On", "1"] {
            assert_eq!(Datum::parse(ColumnType::Bool, raw).unwrap(), Datum::Bool(true));
        }
        for raw in ["false", "F", "no", "off", "0"] {
            assert_eq!(Datum::parse(ColumnType::Bool, raw).unwrap(), Datum::Bool(false));
        }
        assert!(Datum::parse(ColumnType::Bool, "maybe").is_err());
    }

    #[test]
    fn parses_numbers() {
        assert_eq!(Datum::parse(ColumnType::Int, " 42 ").unwrap(), Datum::Int(42));
        assert!(Datum::parse(ColumnType::Int, "4.2").is_err());
        assert_eq!(Datum::parse(ColumnType::Float, "2.5").unwrap(), Datum::Float(2.5));
        assert!(matches!(
            Datum::parse(ColumnType::Float, "-Inf").unwrap(),
            Datum::Float(f) if f.is_infinite() && f.is_sign_negative()
        ));
        assert_eq!(
            Datum::parse(ColumnType::Decimal, "12.50").unwrap(),
            Datum::Decimal(Decimal::new(1250, 2))
        );
        assert_eq!(
            Datum::parse(ColumnType::Decimal, "1.5e2").unwrap(),
            Datum::Decimal(Decimal::new(150, 0))
        );
    }

    #[test]
    fn strings_and_bytes_are_verbatim() {
        assert_eq!(
            Datum::parse(ColumnType::String, " padded ").unwrap(),
            Datum::String(" padded ".into())
        );
        assert_eq!(
            Datum::parse(ColumnType::Bytes, "\\x6869").unwrap(),
            Datum::Bytes(b"hi".to_vec())
        );
        assert_eq!(Datum::parse(ColumnType::Bytes, "hi").unwrap(), Datum::Bytes(b"hi".to_vec()));
        assert!(Datum::parse(ColumnType::Bytes, "\\xzz").is_err());
    }

    #[test]
    fn parses_temporal_values() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(Datum::parse(ColumnType::Date, "2024-03-09").unwrap(), Datum::Date(date));

        let midnight = date.and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(
            Datum::parse(ColumnType::Timestamp, "2024-03-09").unwrap(),
            Datum::Timestamp(midnight)
        );

        let ts = date.and_hms_opt(10, 11, 12).unwrap();
        assert_eq!(
            Datum::parse(ColumnType::Timestamp, "2024-03-09T10:11:12").unwrap(),
            Datum::Timestamp(ts)
        );

        let utc = Utc.from_utc_datetime(&date.and_hms_opt(8, 11, 12).unwrap());
        assert_eq!(
            Datum::parse(ColumnType::Timestamptz, "2024-03-09T10:11:12+02:00").unwrap(),
            Datum::TimestampTz(utc)
        );
        assert_eq!(
            Datum::parse(ColumnType::Timestamptz, "2024-03-09 08:11:12").unwrap(),
            Datum::TimestampTz(utc)
        );

        assert_eq!(
            Datum::parse(ColumnType::Time, "07:30").unwrap(),
            Datum::Time(NaiveTime::from_hms_opt(7, 30, 0).unwrap())
        );
        assert!(Datum::parse(ColumnType::Date, "03/09/2024").is_err());
    }

    #[test]
    fn parses_uuid_and_json() {
        let u = Datum::parse(ColumnType::Uuid, "67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert!(matches!(u, Datum::Uuid(_)));
        assert_eq!(
            Datum::parse(ColumnType::Json, r#"{"a": [1, 2]}"#).unwrap(),
            Datum::Json(serde_json::json!({"a": [1, 2]}))
        );
        assert!(Datum::parse(ColumnType::Json, "{").is_err());
    }

    #[test]
    fn empty_string_is_not_null() {
        assert_eq!(Datum::parse(ColumnType::String, "").unwrap(), Datum::String(String::new()));
        assert!(Datum::parse(ColumnType::Int, "").is_err());
    }

    #[test]
    fn json_rendering() {
        assert_eq!(Datum::Null.to_json(), Value::Null);
        assert_eq!(Datum::Int(7).to_json(), serde_json::json!(7));
        assert_eq!(Datum::Bytes(b"hi".to_vec()).to_json(), serde_json::json!("\\x6869"));
        assert_eq!(Datum::Float(f64::NAN).to_json(), serde_json::json!("NaN"));
    }
}
