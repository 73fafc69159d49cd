// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Generation metadata tags
//!
//! A [`Tag`] captures one training generation: the training/tuning mode
//! attributes and the ordered state snapshot ids. Tags are immutable - the
//! `with_*` and `trigger_*` builders construct replacement tags. The wire
//! format is a pretty-printed UTF-8 JSON document with 4-space indentation:
//!
//! ```json
//! {
//!     "training": {
//!         "timestamp": "2023-01-02T03:04:05.000006",
//!         "ordinal": 42
//!     },
//!     "tuning": {
//!         "timestamp": null,
//!         "score": null
//!     },
//!     "states": [
//!         "00000000-0000-0000-0000-000000000001"
//!     ]
//! }
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dsl::kind::Value;
use crate::error::Result;

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn serialize<S: Serializer>(
        timestamp: &Option<NaiveDateTime>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match timestamp {
            Some(timestamp) => {
                serializer.serialize_str(&timestamp.format(FORMAT).to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|raw| {
            NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

/// Training mode attributes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Training {
    /// Time of the last training run
    #[serde(with = "timestamp")]
    pub timestamp: Option<NaiveDateTime>,
    /// Ordinal upper bound of the data the generation was trained on
    pub ordinal: Option<Value>,
}

impl Training {
    /// True once a training run has been stamped.
    pub fn triggered(&self) -> bool {
        self.timestamp.is_some()
    }
}

/// Tuning mode attributes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// Time of the last tuning run
    #[serde(with = "timestamp")]
    pub timestamp: Option<NaiveDateTime>,
    /// Score achieved by the tuning run
    pub score: Option<f64>,
}

impl Tuning {
    /// True once a tuning run has been stamped.
    pub fn triggered(&self) -> bool {
        self.timestamp.is_some()
    }
}

/// Generation metadata: training/tuning attributes and state snapshot ids.
///
/// The default value is the *null tag* substituted for missing generations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Training mode attributes
    pub training: Training,
    /// Tuning mode attributes
    pub tuning: Tuning,
    /// Ordered, positionally addressable state snapshot ids
    pub states: Vec<Uuid>,
}

impl Tag {
    /// True when neither training nor tuning has ever been stamped.
    pub fn is_empty(&self) -> bool {
        !self.training.triggered() && !self.tuning.triggered()
    }

    /// Replacement tag with the given training attributes.
    #[must_use]
    pub fn with_training(mut self, training: Training) -> Self {
        self.training = training;
        self
    }

    /// Replacement tag with the given tuning attributes.
    #[must_use]
    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Replacement tag with the given states.
    #[must_use]
    pub fn with_states(mut self, states: Vec<Uuid>) -> Self {
        self.states = states;
        self
    }

    /// Replacement tag with the training mode stamped at the given time
    /// (other training attributes are preserved).
    #[must_use]
    pub fn trigger_training(mut self, timestamp: NaiveDateTime) -> Self {
        self.training.timestamp = Some(timestamp);
        self
    }

    /// Replacement tag with the tuning mode stamped at the given time and
    /// score.
    #[must_use]
    pub fn trigger_tuning(mut self, timestamp: NaiveDateTime, score: Option<f64>) -> Self {
        self.tuning.timestamp = Some(timestamp);
        self.tuning.score = score;
        self
    }

    /// Dump the tag into its canonical byte representation.
    pub fn dumps(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        Ok(buffer)
    }

    /// Load a dumped tag.
    pub fn loads(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 6)
            .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let tag = Tag {
            training: Training {
                timestamp: Some(timestamp()),
                ordinal: Some(Value::Integer(42)),
            },
            tuning: Tuning::default(),
            states: vec![Uuid::from_u128(1)],
        };
        let raw = tag.dumps().unwrap();
        assert_eq!(Tag::loads(&raw).unwrap(), tag);

        let document: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(
            document["states"],
            serde_json::json!(["00000000-0000-0000-0000-000000000001"])
        );
        assert_eq!(
            document["training"]["timestamp"],
            serde_json::json!("2023-01-02T03:04:05.000006")
        );
        assert_eq!(document["training"]["ordinal"], serde_json::json!(42));
        assert_eq!(document["tuning"]["timestamp"], serde_json::Value::Null);
    }

    #[test]
    fn test_document_layout() {
        let raw = Tag::default().dumps().unwrap();
        let text = String::from_utf8(raw).unwrap();
        // 4-space indented pretty document with the canonical section order.
        assert!(text.starts_with("{\n    \"training\""));
        let training = text.find("\"training\"").unwrap();
        let tuning = text.find("\"tuning\"").unwrap();
        let states = text.find("\"states\"").unwrap();
        assert!(training < tuning && tuning < states);
    }

    #[test]
    fn test_null_tag() {
        let tag = Tag::default();
        assert!(tag.is_empty());
        assert!(tag.states.is_empty());
        assert!(!tag.training.triggered());
    }

    #[test]
    fn test_triggers_preserve_and_stamp() {
        let tag = Tag::default().with_training(Training {
            timestamp: None,
            ordinal: Some(Value::Integer(7)),
        });
        let stamped = tag.trigger_training(timestamp());
        assert_eq!(stamped.training.timestamp, Some(timestamp()));
        // Triggering stamps the timestamp but keeps the ordinal.
        assert_eq!(stamped.training.ordinal, Some(Value::Integer(7)));
        assert!(!stamped.is_empty());

        let tuned = stamped.trigger_tuning(timestamp(), Some(0.25));
        assert_eq!(tuned.tuning.score, Some(0.25));
    }
}
