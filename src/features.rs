//! Feature contract shared by training and inference.
//!
//! A transaction is described by 30 numeric fields: the elapsed `Time`, 28
//! anonymized components `V1`..`V28`, and the transaction `Amount`. Fields are
//! always looked up by name, never by position, and a record with a missing,
//! unknown or non-numeric field is rejected before it reaches the classifier.

use crate::error::SchemaError;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Number of model input fields
pub const FEATURE_COUNT: usize = 30;

/// Ordered model input fields
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Time", "V1", "V2", "V3", "V4", "V5", "V6", "V7", "V8", "V9", "V10", "V11", "V12", "V13",
    "V14", "V15", "V16", "V17", "V18", "V19", "V20", "V21", "V22", "V23", "V24", "V25", "V26",
    "V27", "V28", "Amount",
];

/// Ground-truth column in labeled data
pub const LABEL_COLUMN: &str = "Class";

pub const TIME_INDEX: usize = 0;
pub const AMOUNT_INDEX: usize = FEATURE_COUNT - 1;

/// Position of a field in the contract
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|&f| f == name)
}

/// Feature names as owned strings (persisted with fitted artifacts)
pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|f| f.to_string()).collect()
}

/// One transaction's model inputs, stored in contract order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Build from values already in contract order
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    /// Build from a name → value mapping.
    ///
    /// Unknown names and missing names are both rejected.
    pub fn from_map<'a, I>(fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut values = [0.0; FEATURE_COUNT];
        let mut seen = [false; FEATURE_COUNT];

        for (name, value) in fields {
            let idx = feature_index(name).ok_or_else(|| SchemaError::UnexpectedField {
                field: name.to_string(),
                row: None,
            })?;
            if !value.is_finite() {
                return Err(SchemaError::NonFinite {
                    field: name.to_string(),
                    row: None,
                });
            }
            values[idx] = value;
            seen[idx] = true;
        }

        if let Some(missing) = seen.iter().position(|&s| !s) {
            return Err(SchemaError::MissingField {
                field: FEATURE_NAMES[missing].to_string(),
                row: None,
            });
        }

        Ok(Self { values })
    }

    /// Validate and convert an arbitrary JSON value.
    ///
    /// Checks missing fields before unknown ones so a truncated record
    /// reports what it lacks.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, SchemaError> {
        let object = value
            .as_object()
            .ok_or(SchemaError::NotAnObject { row: None })?;

        if let Some(missing) = FEATURE_NAMES.iter().find(|f| !object.contains_key(**f)) {
            return Err(SchemaError::MissingField {
                field: missing.to_string(),
                row: None,
            });
        }

        let mut fields = Vec::with_capacity(object.len());
        for (name, raw) in object {
            let value = raw.as_f64().ok_or_else(|| SchemaError::NonNumeric {
                field: name.clone(),
                value: raw.to_string(),
                row: None,
            })?;
            fields.push((name.as_str(), value));
        }

        Self::from_map(fields)
    }

    /// Values in contract order
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Value of a named field
    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|idx| self.values[idx])
    }

    pub fn time(&self) -> f64 {
        self.values[TIME_INDEX]
    }

    pub fn amount(&self) -> f64 {
        self.values[AMOUNT_INDEX]
    }

    /// Field name → value pairs in contract order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FeatureVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = BTreeMap::<String, f64>::deserialize(deserializer)?;
        FeatureVector::from_map(fields.iter().map(|(k, v)| (k.as_str(), *v)))
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_json() -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            object.insert(name.to_string(), json!(i as f64 * 0.5));
        }
        serde_json::Value::Object(object)
    }

    #[test]
    fn test_feature_contract_shape() {
        assert_eq!(FEATURE_NAMES.len(), 30);
        assert_eq!(FEATURE_NAMES[TIME_INDEX], "Time");
        assert_eq!(FEATURE_NAMES[AMOUNT_INDEX], "Amount");
        assert_eq!(feature_index("V14"), Some(14));
    }

    #[test]
    fn test_from_json_valid() {
        let features = FeatureVector::from_json(&sample_json()).unwrap();
        assert_eq!(features.time(), 0.0);
        assert_eq!(features.amount(), 29.0 * 0.5);
        assert_eq!(features.get("V1"), Some(0.5));
    }

    #[test]
    fn test_missing_amount_is_schema_error() {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("Amount");

        let err = FeatureVector::from_json(&value).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingField {
                field: "Amount".to_string(),
                row: None
            }
        );
    }

    #[test]
    fn test_extra_field_rejected() {
        let mut value = sample_json();
        value
            .as_object_mut()
            .unwrap()
            .insert("merchant".to_string(), json!(1.0));

        let err = FeatureVector::from_json(&value).unwrap_err();
        assert!(matches!(err, SchemaError::UnexpectedField { ref field, .. } if field == "merchant"));
    }

    #[test]
    fn test_non_numeric_rejected() {
        let mut value = sample_json();
        value
            .as_object_mut()
            .unwrap()
            .insert("V3".to_string(), json!("abc"));

        let err = FeatureVector::from_json(&value).unwrap_err();
        assert!(matches!(err, SchemaError::NonNumeric { ref field, .. } if field == "V3"));
    }

    #[test]
    fn test_field_order_irrelevant() {
        let forward = FeatureVector::from_map(FEATURE_NAMES.iter().map(|&n| (n, 1.0))).unwrap();
        let reverse =
            FeatureVector::from_map(FEATURE_NAMES.iter().rev().map(|&n| (n, 1.0))).unwrap();
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_serializes_by_name() {
        let features = FeatureVector::from_json(&sample_json()).unwrap();
        let json = serde_json::to_value(features).unwrap();
        assert_eq!(json["Amount"], json!(14.5));

        let back: FeatureVector = serde_json::from_value(json).unwrap();
        assert_eq!(back, features);
    }
}
