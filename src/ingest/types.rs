use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body posted by the Ruuvi Station app to the gateway endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationPayload {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    pub battery_level: f64,
    pub time: f64,
    /// `None` only when the key is absent; an explicit `null` is kept.
    #[serde(default, deserialize_with = "present")]
    pub event_id: Option<serde_json::Value>,
    pub tags: Vec<SensorReading>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// One sensor entry of [`StationPayload::tags`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub update_at: String,
    #[serde(flatten)]
    pub values: Measurements,
}

/// Decoded value of a measured property.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// `null`, arrays and objects.
    Unsupported,
}

impl<'de> Deserialize<'de> for ReadingValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ReadingValueVisitor;

        impl<'de> Visitor<'de> for ReadingValueVisitor {
            type Value = ReadingValue;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("any JSON value")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(ReadingValue::Boolean(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(ReadingValue::Number(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ReadingValue::Number(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(ReadingValue::Number(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(ReadingValue::Text(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(ReadingValue::Text(v))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(ReadingValue::Unsupported)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(ReadingValue::Unsupported)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                ReadingValue::deserialize(deserializer)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(ReadingValue::Unsupported)
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(ReadingValue::Unsupported)
            }
        }

        deserializer.deserialize_any(ReadingValueVisitor)
    }
}

/// Measured properties of a reading, in the order they appeared in the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurements(pub Vec<(String, ReadingValue)>);

impl Measurements {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReadingValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Measurements {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MeasurementsVisitor;

        impl<'de> Visitor<'de> for MeasurementsVisitor {
            type Value = Measurements;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of measured properties")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut values = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, ReadingValue>()? {
                    values.push((key, value));
                }
                Ok(Measurements(values))
            }
        }

        deserializer.deserialize_map(MeasurementsVisitor)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationAck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}
