//! Records flowing through the city pipeline.

use crate::normalize::NormalizedKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};

/// The country filter understood by the pollution upstream. Opaque to Smog,
/// it is passed through as given and used as the result cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Country(String);

impl Country {
    /// Wrap an upstream country filter.
    pub fn new<S: Into<String>>(country: S) -> Self {
        Self(country.into())
    }

    /// The filter as sent upstream.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A city reading as the pollution upstream reports it.
///
/// Nothing about it is trusted. The name and pollution are kept as raw JSON
/// values so that the cleaning pipeline, not deserialization, decides what to
/// discard. Any other fields are carried along untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCityRecord {
    /// The reported name. Usually a string.
    #[serde(default)]
    pub name: Option<Value>,

    /// The reported pollution level. Usually a number.
    #[serde(default)]
    pub pollution: Option<Value>,

    /// Fields the pipeline ignores.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawCityRecord {
    /// A well-formed record, mostly useful in tests.
    pub fn new(name: &str, pollution: f64) -> Self {
        Self {
            name: Some(Value::from(name)),
            pollution: Some(Value::from(pollution)),
            extra: Map::new(),
        }
    }

    /// The name, if it is a non-empty string.
    pub fn name(&self) -> Option<&str> {
        match &self.name {
            Some(Value::String(name)) if !name.is_empty() => Some(name),
            _ => None,
        }
    }

    /// The pollution level, if it is a finite number.
    ///
    /// Numeric strings such as `"42.5"` are accepted, since some upstream
    /// rows carry their readings quoted.
    pub fn pollution(&self) -> Option<f64> {
        let value = match &self.pollution {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        value.is_finite().then(|| value)
    }
}

/// A validated, deduplicated, and enriched city.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CleanCityRecord {
    /// The canonical city name.
    pub name: NormalizedKey,

    /// The highest pollution reported for this city.
    pub pollution: f64,

    /// A short description of the city, if one could be found.
    pub description: Option<String>,
}

/// The cleaned cities of one country, most polluted first.
pub type RankedCities = Arc<Vec<CleanCityRecord>>;

/// The relation between a response and the result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The ranked list was already cached.
    Hit,
    /// The ranked list was built for this request.
    Miss,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RawCityRecord;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawCityRecord {
        serde_json::from_value(value).expect("record should deserialize")
    }

    #[test]
    fn extra_fields_are_kept() {
        let raw = record(json!({"name": "Lyon", "pollution": 12, "station_id": 7}));
        assert_eq!(raw.name(), Some("Lyon"));
        assert_eq!(raw.pollution(), Some(12.0));
        assert_eq!(raw.extra.get("station_id"), Some(&json!(7)));
    }

    #[test]
    fn missing_and_malformed_fields_are_rejected() {
        assert_eq!(record(json!({})).name(), None);
        assert_eq!(record(json!({"name": ""})).name(), None);
        assert_eq!(record(json!({"name": 42})).name(), None);
        assert_eq!(record(json!({"pollution": null})).pollution(), None);
        assert_eq!(record(json!({"pollution": "high"})).pollution(), None);
        assert_eq!(record(json!({"pollution": "NaN"})).pollution(), None);
        assert_eq!(record(json!({"pollution": "inf"})).pollution(), None);
        assert_eq!(record(json!({"pollution": [1]})).pollution(), None);
    }

    #[test]
    fn quoted_numbers_are_accepted() {
        assert_eq!(record(json!({"pollution": " 42.5 "})).pollution(), Some(42.5));
    }
}
