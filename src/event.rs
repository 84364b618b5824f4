use std::collections::HashMap;

use chrono::{DateTime, Utc};
use derive_more::From;
use serde::Serialize;

use crate::{Error, Result};

/// Format of timestamps carried by events and condition literals, e.g.
/// `1971-01-01T00:00:00.000+0000`.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Parse a timestamp in the `yyyy-MM-dd'T'HH:mm:ss.SSSZ` format.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::InvalidTimestamp(s.to_owned()))
}

/// Format a timestamp in the `yyyy-MM-dd'T'HH:mm:ss.SSSZ` format.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Typed value of an event parameter.
///
/// The kind of a value is significant: conditions only compare values of the same kind, so an
/// `Int(1)` never equals a `Long(1)`.
#[derive(Debug, Clone, PartialEq, From, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A boolean.
    Bool(bool),
    /// A 32-bit integer.
    Int(i32),
    /// A 64-bit integer.
    Long(i64),
    /// A single precision float.
    Float(f32),
    /// A double precision float.
    Double(f64),
    /// A string.
    String(String),
    /// A point in time, serialized in the event timestamp format.
    Timestamp(#[serde(with = "timestamp_serde")] DateTime<Utc>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// (De)serialize timestamps as strings in the event timestamp format.
pub(crate) mod timestamp_serde {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_timestamp(&s).map_err(de::Error::custom)
    }
}

/// Parameters of an event keyed by name.
pub type Params = HashMap<String, ParamValue>;

/// A named occurrence recorded by the host application.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Name of the event, matched against a trigger's event name.
    pub name: String,
    /// Typed parameters of the event.
    #[serde(rename = "eventParams")]
    pub params: Params,
}

impl Event {
    /// Create an event without parameters.
    ///
    /// ```
    /// # use ddna::Event;
    /// let event = Event::new("missionCompleted").put_param("level", 5);
    /// assert_eq!(event.name, "missionCompleted");
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        Event {
            name: name.into(),
            params: Params::new(),
        }
    }

    /// Add a parameter, replacing any previous value under the same key.
    pub fn put_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Look up a parameter by key.
    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }
}
