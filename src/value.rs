// ABOUTME: Scalar value type carried by records, with adaptive PostgreSQL encoding
// ABOUTME: Encodes to whatever parameter type the server infers and decodes common column types

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A single column value.
///
/// Values do not carry a PostgreSQL type of their own. When bound as a
/// statement parameter they convert to the type the server inferred for that
/// parameter (for example an `Int` bound to an `int4` column is narrowed with
/// a range check, and `Text` bound to a `timestamptz` column is parsed).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone, normalized to UTC
    TimestampTz(DateTime<Utc>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
        }
    }

    /// Canonical text form used for key matching and content digests.
    ///
    /// Returns `None` for NULL. Equal logical values read back from the
    /// database produce the same text as the values that were written
    /// (`Int(15)`, `Decimal(15.00)` and `Float(15.0)` all give `"15"`).
    pub fn canonical_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Decimal(d) => Some(d.normalize().to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
            Value::TimestampTz(ts) => Some(ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()),
            Value::Uuid(u) => Some(u.hyphenated().to_string()),
            Value::Json(serde_json::Value::String(s)) => Some(s.clone()),
            Value::Json(j) => Some(j.to_string()),
        }
    }

    /// Interpret the value as an integer when it holds one exactly.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a UTC instant. Naive timestamps are taken as UTC.
    pub fn as_timestamptz(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::TimestampTz(ts) => Some(*ts),
            Value::Timestamp(ts) => Some(Utc.from_utc_datetime(ts)),
            Value::Date(d) => Some(Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))),
            Value::Text(s) => parse_timestamptz(s).ok(),
            _ => None,
        }
    }

    /// Convert a JSON scalar into a value. Arrays and objects stay JSON.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                // JSON can't represent NaN or Infinity
                .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
            Value::Decimal(d) => serde_json::Value::String(d.to_string()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.format(TIMESTAMP_FORMAT).to_string())
            }
            Value::TimestampTz(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::Json(j) => j.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::TimestampTz(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => encode_bool(*b, ty, out),
            Value::Int(i) => encode_int(*i, ty, out),
            Value::Float(f) => encode_float(*f, ty, out),
            Value::Decimal(d) => encode_decimal(*d, ty, out),
            Value::Text(s) => encode_text(s, ty, out),
            Value::Date(d) => encode_date(*d, ty, out),
            Value::Timestamp(ts) => encode_timestamp(*ts, ty, out),
            Value::TimestampTz(ts) => encode_timestamptz(*ts, ty, out),
            Value::Uuid(u) => match *ty {
                Type::UUID => u.to_sql(ty, out),
                _ if is_textual(ty) => u.to_string().as_str().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Json(j) => match *ty {
                Type::JSON | Type::JSONB => j.to_sql(ty, out),
                _ if is_textual(ty) => match j {
                    serde_json::Value::String(s) => s.as_str().to_sql(ty, out),
                    other => other.to_string().as_str().to_sql(ty, out),
                },
                _ => Err(mismatch(self, ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::OID => Value::Int(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::Decimal(Decimal::from_sql(ty, raw)?),
            Type::DATE => Value::Date(NaiveDate::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => Value::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::UUID => Value::Uuid(uuid::Uuid::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::Json(serde_json::Value::from_sql(ty, raw)?),
            _ if is_textual(ty) => Value::Text(<&str>::from_sql(ty, raw)?.to_string()),
            _ => {
                return Err(format!(
                    "unsupported column type '{}' (cast it to text in the query)",
                    ty
                )
                .into())
            }
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn is_textual(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    ) || matches!(ty.kind(), Kind::Enum(_))
        || ty.name() == "citext"
}

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!(
        "cannot encode {} value '{}' as PostgreSQL type '{}'",
        value.kind(),
        value,
        ty
    )
    .into()
}

fn encode_bool(b: bool, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => b.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 => encode_int(i64::from(b), ty, out),
        Type::JSON | Type::JSONB => serde_json::Value::Bool(b).to_sql(ty, out),
        _ if is_textual(ty) => b.to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(&Value::Bool(b), ty)),
    }
}

fn encode_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::Value::from(i).to_sql(ty, out),
        _ if is_textual(ty) => i.to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(&Value::Int(i), ty)),
    }
}

fn encode_float(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(f)?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 if f.fract() == 0.0 && f.is_finite() => {
            encode_int(f as i64, ty, out)
        }
        Type::JSON | Type::JSONB => match serde_json::Number::from_f64(f) {
            Some(n) => serde_json::Value::Number(n).to_sql(ty, out),
            None => Err(mismatch(&Value::Float(f), ty)),
        },
        _ if is_textual(ty) => f.to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(&Value::Float(f), ty)),
    }
}

fn encode_decimal(d: Decimal, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::NUMERIC => d.to_sql(ty, out),
        Type::FLOAT4 | Type::FLOAT8 => match d.to_f64() {
            Some(f) => encode_float(f, ty, out),
            None => Err(mismatch(&Value::Decimal(d), ty)),
        },
        Type::INT2 | Type::INT4 | Type::INT8 if d.fract().is_zero() => match d.to_i64() {
            Some(i) => encode_int(i, ty, out),
            None => Err(mismatch(&Value::Decimal(d), ty)),
        },
        Type::JSON | Type::JSONB => serde_json::Value::String(d.to_string()).to_sql(ty, out),
        _ if is_textual(ty) => d.to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(&Value::Decimal(d), ty)),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
            let i: i64 = s
                .trim()
                .parse()
                .map_err(|_| format!("cannot parse '{}' as integer for type '{}'", s, ty))?;
            encode_int(i, ty, out)
        }
        Type::FLOAT4 | Type::FLOAT8 => {
            let f: f64 = s
                .trim()
                .parse()
                .map_err(|_| format!("cannot parse '{}' as float for type '{}'", s, ty))?;
            encode_float(f, ty, out)
        }
        Type::NUMERIC => {
            let trimmed = s.trim();
            let d = Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| format!("cannot parse '{}' as numeric", s))?;
            d.to_sql(ty, out)
        }
        Type::BOOL => parse_bool(s)?.to_sql(ty, out),
        Type::DATE => parse_date(s)?.to_sql(ty, out),
        Type::TIMESTAMP => parse_naive_timestamp(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamptz(s)?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s.trim())?.to_sql(ty, out),
        Type::JSON | Type::JSONB => {
            let json = serde_json::from_str(s)
                .unwrap_or_else(|_| serde_json::Value::String(s.to_string()));
            json.to_sql(ty, out)
        }
        _ if is_textual(ty) => s.to_sql(ty, out),
        _ => Err(mismatch(&Value::Text(s.to_string()), ty)),
    }
}

fn encode_date(d: NaiveDate, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::DATE => d.to_sql(ty, out),
        Type::TIMESTAMP => d.and_time(NaiveTime::MIN).to_sql(ty, out),
        Type::TIMESTAMPTZ => Utc
            .from_utc_datetime(&d.and_time(NaiveTime::MIN))
            .to_sql(ty, out),
        _ if is_textual(ty) => d.format("%Y-%m-%d").to_string().as_str().to_sql(ty, out),
        _ => Err(mismatch(&Value::Date(d), ty)),
    }
}

fn encode_timestamp(ts: NaiveDateTime, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::TIMESTAMP => ts.to_sql(ty, out),
        Type::TIMESTAMPTZ => Utc.from_utc_datetime(&ts).to_sql(ty, out),
        Type::DATE => ts.date().to_sql(ty, out),
        _ if is_textual(ty) => ts
            .format("%Y-%m-%d %H:%M:%S%.f")
            .to_string()
            .as_str()
            .to_sql(ty, out),
        _ => Err(mismatch(&Value::Timestamp(ts), ty)),
    }
}

fn encode_timestamptz(ts: DateTime<Utc>, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::TIMESTAMPTZ => ts.to_sql(ty, out),
        Type::TIMESTAMP => ts.naive_utc().to_sql(ty, out),
        Type::DATE => ts.date_naive().to_sql(ty, out),
        _ if is_textual(ty) => ts.to_rfc3339().as_str().to_sql(ty, out),
        _ => Err(mismatch(&Value::TimestampTz(ts), ty)),
    }
}

fn parse_bool(s: &str) -> Result<bool, BoxError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(format!("cannot parse '{}' as boolean", s).into()),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, BoxError> {
    let trimmed = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(d);
    }
    Ok(parse_naive_timestamp(trimmed)?.date())
}

/// Parse the timestamp spellings found in report exports and SQL dumps.
pub(crate) fn parse_naive_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    let trimmed = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.naive_utc());
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(d.and_time(NaiveTime::MIN));
    }
    Err(format!("cannot parse '{}' as timestamp", s).into())
}

pub(crate) fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, BoxError> {
    let trimmed = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(trimmed, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }
    Ok(Utc.from_utc_datetime(&parse_naive_timestamp(trimmed)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value, ty: &Type) -> Result<Vec<u8>, BoxError> {
        let mut out = BytesMut::new();
        match value.to_sql(ty, &mut out)? {
            IsNull::Yes => Ok(Vec::new()),
            IsNull::No => Ok(out.to_vec()),
        }
    }

    fn native<T: ToSql>(v: T, ty: &Type) -> Vec<u8> {
        let mut out = BytesMut::new();
        v.to_sql(ty, &mut out).unwrap();
        out.to_vec()
    }

    #[test]
    fn test_int_narrows_to_column_type() {
        assert_eq!(
            encode(&Value::Int(7), &Type::INT4).unwrap(),
            native(7i32, &Type::INT4)
        );
        assert_eq!(
            encode(&Value::Int(7), &Type::INT2).unwrap(),
            native(7i16, &Type::INT2)
        );
        assert!(encode(&Value::Int(100_000), &Type::INT2).is_err());
    }

    #[test]
    fn test_int_widens_to_float_and_numeric() {
        assert_eq!(
            encode(&Value::Int(3), &Type::FLOAT8).unwrap(),
            native(3.0f64, &Type::FLOAT8)
        );
        assert_eq!(
            encode(&Value::Int(3), &Type::NUMERIC).unwrap(),
            native(Decimal::from(3), &Type::NUMERIC)
        );
    }

    #[test]
    fn test_bool_encodes_as_integer_flag() {
        assert_eq!(
            encode(&Value::Bool(true), &Type::INT4).unwrap(),
            native(1i32, &Type::INT4)
        );
        assert_eq!(
            encode(&Value::Bool(false), &Type::BOOL).unwrap(),
            native(false, &Type::BOOL)
        );
    }

    #[test]
    fn test_text_parses_into_typed_columns() {
        assert_eq!(
            encode(&Value::from("42"), &Type::INT8).unwrap(),
            native(42i64, &Type::INT8)
        );
        assert_eq!(
            encode(&Value::from("2025-08-01"), &Type::DATE).unwrap(),
            native(NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(), &Type::DATE)
        );
        let expected = Utc.with_ymd_and_hms(2025, 8, 1, 10, 30, 0).unwrap();
        assert_eq!(
            encode(&Value::from("2025-08-01T10:30:00Z"), &Type::TIMESTAMPTZ).unwrap(),
            native(expected, &Type::TIMESTAMPTZ)
        );
        assert_eq!(
            encode(&Value::from("2025-08-01 10:30:00"), &Type::TIMESTAMPTZ).unwrap(),
            native(expected, &Type::TIMESTAMPTZ)
        );
        assert!(encode(&Value::from("abc"), &Type::INT4).is_err());
    }

    #[test]
    fn test_null_is_null_for_any_type() {
        let mut out = BytesMut::new();
        let is_null = Value::Null.to_sql(&Type::INT4, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn test_naive_timestamp_goes_to_timestamptz_as_utc() {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(
            encode(&Value::Timestamp(naive), &Type::TIMESTAMPTZ).unwrap(),
            native(Utc.from_utc_datetime(&naive), &Type::TIMESTAMPTZ)
        );
    }

    #[test]
    fn test_mismatch_error_names_type() {
        let err = encode(&Value::Uuid(uuid::Uuid::nil()), &Type::INT4).unwrap_err();
        assert!(err.to_string().contains("int4"));
    }

    #[test]
    fn test_decode_common_types() {
        let raw = native(12i32, &Type::INT4);
        assert_eq!(Value::from_sql(&Type::INT4, &raw).unwrap(), Value::Int(12));

        let raw = native("app-42", &Type::TEXT);
        assert_eq!(
            Value::from_sql(&Type::TEXT, &raw).unwrap(),
            Value::Text("app-42".to_string())
        );

        assert_eq!(Value::from_sql_null(&Type::INT8).unwrap(), Value::Null);
        assert!(Value::from_sql(&Type::BYTEA, b"\x00").is_err());
    }

    #[test]
    fn test_canonical_text_matches_across_numeric_kinds() {
        assert_eq!(Value::Int(15).canonical_text().unwrap(), "15");
        assert_eq!(Value::Float(15.0).canonical_text().unwrap(), "15");
        assert_eq!(
            Value::Decimal(Decimal::new(1500, 2)).canonical_text().unwrap(),
            "15"
        );
        assert_eq!(Value::Null.canonical_text(), None);
    }

    #[test]
    fn test_json_conversion() {
        assert_eq!(Value::from_json(serde_json::json!(10)), Value::Int(10));
        assert_eq!(Value::from_json(serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(
            Value::from_json(serde_json::json!("h1")),
            Value::Text("h1".to_string())
        );
        assert_eq!(Value::from_json(serde_json::Value::Null), Value::Null);
        assert_eq!(Value::Int(10).to_json(), serde_json::json!(10));
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::json!("NaN"));
    }

    #[test]
    fn test_as_timestamptz() {
        let expected = Utc.with_ymd_and_hms(2025, 9, 2, 0, 0, 0).unwrap();
        assert_eq!(Value::from("2025-09-02").as_timestamptz(), Some(expected));
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2025, 9, 2).unwrap()).as_timestamptz(),
            Some(expected)
        );
        assert_eq!(Value::Int(1).as_timestamptz(), None);
    }

    #[test]
    fn test_parse_bool_spellings() {
        assert!(parse_bool("T").unwrap());
        assert!(!parse_bool(" off ").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
