use time::format_description::well_known::{Iso8601, Rfc3339};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::domain::{FieldValue, Point, MEASUREMENT};
use crate::ingest::types::{ReadingValue, SensorReading, StationPayload};

pub const RESERVED_KEYS: [&str; 3] = ["id", "name", "updateAt"];

const BATTERY_FIELD: &str = "stationBatteryLevel";
const TIME_FIELD: &str = "stationTime";

/// Offsets with and without a colon; Ruuvi Station writes `+0200`.
const OFFSET_FORMATS: [&[FormatItem<'static>]; 6] = [
    format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
    ),
    format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
    ),
    format_description!(
        "[year]-[month]-[day]T[hour]:[minute][offset_hour sign:mandatory][offset_minute]"
    ),
    format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
    ),
    format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]"
    ),
    format_description!(
        "[year]-[month]-[day]T[hour]:[minute][offset_hour sign:mandatory]:[offset_minute]"
    ),
];

/// Date-times without an offset are read as UTC.
const NAIVE_FORMATS: [&[FormatItem<'static>]; 3] = [
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
];

const DATE_ONLY: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(thiserror::Error, Debug)]
pub enum TranslateError {
    #[error("sensor {id}: unparseable updateAt {value:?}")]
    InvalidTimestamp { id: String, value: String },
}

/// Flattens a station payload into one point per (sensor, measured key).
///
/// A measured key named like a station field replaces that field.
pub fn translate(payload: &StationPayload) -> Result<Vec<Point>, TranslateError> {
    let mut points = Vec::new();

    for reading in &payload.tags {
        let timestamp_ms = reading_timestamp_ms(reading)?;

        for (key, value) in reading.values.iter() {
            if RESERVED_KEYS.contains(&key) {
                continue;
            }
            let field = match value {
                ReadingValue::Number(n) => FieldValue::Float(*n),
                ReadingValue::Text(s) => FieldValue::String(s.clone()),
                ReadingValue::Boolean(b) => FieldValue::Boolean(*b),
                ReadingValue::Unsupported => continue,
            };

            tracing::debug!(key, value = ?field, sensor = %reading.id, "writing reading");

            let mut point = Point::new(MEASUREMENT, timestamp_ms)
                .tag("id", reading.id.as_str())
                .tag("deviceID", payload.device_id.as_str());
            if let Some(name) = reading.name.as_deref().filter(|n| !n.is_empty()) {
                point = point.tag("name", name);
            }
            if key != BATTERY_FIELD {
                point = point.field(BATTERY_FIELD, FieldValue::Float(payload.battery_level));
            }
            if key != TIME_FIELD {
                point = point.field(TIME_FIELD, FieldValue::Float(payload.time));
            }
            points.push(point.field(key, field));
        }
    }

    Ok(points)
}

fn reading_timestamp_ms(reading: &SensorReading) -> Result<i64, TranslateError> {
    parse_update_at(&reading.update_at).ok_or_else(|| TranslateError::InvalidTimestamp {
        id: reading.id.clone(),
        value: reading.update_at.clone(),
    })
}

/// Parses a reading's `updateAt` into epoch milliseconds.
pub fn parse_update_at(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let parsed = OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .or_else(|| parse_with_offset(raw))
        .or_else(|| OffsetDateTime::parse(raw, &Iso8601::DEFAULT).ok())
        .or_else(|| parse_as_utc(raw))?;
    i64::try_from(parsed.unix_timestamp_nanos() / 1_000_000).ok()
}

fn parse_with_offset(raw: &str) -> Option<OffsetDateTime> {
    let normalized = match raw.strip_suffix('Z').or_else(|| raw.strip_suffix('z')) {
        Some(rest) => format!("{rest}+00:00"),
        None => raw.to_string(),
    };
    OFFSET_FORMATS
        .iter()
        .find_map(|format| OffsetDateTime::parse(&normalized, format).ok())
}

fn parse_as_utc(raw: &str) -> Option<OffsetDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(raw, format).ok())
        .or_else(|| Date::parse(raw, DATE_ONLY).ok().map(Date::midnight))
        .map(PrimitiveDateTime::assume_utc)
}
