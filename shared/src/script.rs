//! Motion script model and ingestion
//!
//! Scripts arrive from the sign lookup stage as JSON. Keyframes are accepted either as
//! a list of `{"time": .., "<group>": [..]}` objects or as a mapping from a timestamp
//! string to its servo groups:
//! ```text
//! "keyframes": [ {"time": 0.0, "L": [..]}, {"time": 0.5, "L": [..]} ]
//! "keyframes": { "0.0": {"L": [..]}, "0.5": {"L": [..]} }
//! ```
//! Both shapes are normalized here into one time-ordered list.

use crate::routing::ServoGroup;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while ingesting or checking a motion script
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script is not a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for field: {0}")]
    InvalidField(&'static str),

    #[error("Invalid keyframe timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Invalid keyframe {index}: {reason}")]
    InvalidKeyframe { index: usize, reason: String },

    #[error("Empty token")]
    EmptyToken,

    #[error("Invalid duration: {0}")]
    InvalidDuration(f64),

    #[error("Script has no keyframes")]
    NoKeyframes,

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whether a sign holds a single pose or animates through several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MotionType {
    Static,
    Dynamic,
}

/// Target servo-group angles at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Seconds from script start
    pub time: f64,
    /// Servo groups present in this frame, keyed by group name
    #[serde(flatten)]
    pub groups: BTreeMap<String, Vec<i32>>,
}

impl Keyframe {
    /// Create an empty keyframe at the given time
    pub fn new(time: f64) -> Self {
        Self {
            time,
            groups: BTreeMap::new(),
        }
    }

    /// Builder helper to add a servo group
    pub fn with_group(mut self, name: impl Into<String>, angles: Vec<i32>) -> Self {
        self.groups.insert(name.into(), angles);
        self
    }

    /// Names of the groups present in this frame
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Recognized groups whose angle count differs from what the firmware expects
    pub fn shape_warnings(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter_map(|(name, angles)| {
                let group = ServoGroup::from_name(name)?;
                (angles.len() != group.expected_len()).then(|| {
                    format!(
                        "group {} at t={} has {} angles (expected {})",
                        name,
                        self.time,
                        angles.len(),
                        group.expected_len()
                    )
                })
            })
            .collect()
    }
}

/// One sign or fingerspelled letter to execute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionScript {
    pub token: String,
    #[serde(rename = "type")]
    pub motion_type: MotionType,
    /// Total execution time in seconds
    pub duration: f64,
    pub keyframes: Vec<Keyframe>,
}

impl MotionScript {
    /// Parse a script from a JSON document
    pub fn from_json(text: &str) -> Result<Self, ScriptError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Build a script from a JSON value, normalizing the keyframe layout
    ///
    /// Extra fields (database ids, categories, ...) are ignored.
    pub fn from_value(value: Value) -> Result<Self, ScriptError> {
        let Value::Object(mut obj) = value else {
            return Err(ScriptError::NotAnObject);
        };

        let token = match take_field(&mut obj, "token")? {
            Value::String(token) => token,
            _ => return Err(ScriptError::InvalidField("token")),
        };

        let motion_type: MotionType = serde_json::from_value(take_field(&mut obj, "type")?)
            .map_err(|_| ScriptError::InvalidField("type"))?;

        let duration = take_field(&mut obj, "duration")?
            .as_f64()
            .ok_or(ScriptError::InvalidField("duration"))?;

        let keyframes = normalize_keyframes(take_field(&mut obj, "keyframes")?)?;

        Ok(Self {
            token,
            motion_type,
            duration,
            keyframes,
        })
    }

    /// Check the fields the dispatch engine relies on
    ///
    /// Sign content (angles, group shapes, timing inside the script) is not checked.
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.token.trim().is_empty() {
            return Err(ScriptError::EmptyToken);
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ScriptError::InvalidDuration(self.duration));
        }
        if self.keyframes.is_empty() {
            return Err(ScriptError::NoKeyframes);
        }
        Ok(())
    }

    /// Single-character tokens are fingerspelled letters
    pub fn is_fingerspelled(&self) -> bool {
        self.token.chars().count() == 1
    }

    /// All shape warnings across every keyframe
    pub fn shape_warnings(&self) -> Vec<String> {
        self.keyframes
            .iter()
            .flat_map(Keyframe::shape_warnings)
            .collect()
    }
}

fn take_field(obj: &mut Map<String, Value>, name: &'static str) -> Result<Value, ScriptError> {
    match obj.remove(name) {
        Some(Value::Null) | None => Err(ScriptError::MissingField(name)),
        Some(value) => Ok(value),
    }
}

/// Convert either keyframe layout into a time-ordered list
fn normalize_keyframes(value: Value) -> Result<Vec<Keyframe>, ScriptError> {
    match value {
        Value::Array(frames) => frames
            .into_iter()
            .enumerate()
            .map(|(index, frame)| {
                serde_json::from_value::<Keyframe>(frame).map_err(|e| {
                    ScriptError::InvalidKeyframe {
                        index,
                        reason: e.to_string(),
                    }
                })
            })
            .collect(),
        Value::Object(timeline) => {
            let mut frames = Vec::with_capacity(timeline.len());
            for (index, (stamp, groups)) in timeline.into_iter().enumerate() {
                let time: f64 = stamp
                    .trim()
                    .parse()
                    .map_err(|_| ScriptError::InvalidTimestamp(stamp.clone()))?;

                let Value::Object(groups) = groups else {
                    return Err(ScriptError::InvalidKeyframe {
                        index,
                        reason: "servo groups must be an object".into(),
                    });
                };

                let mut frame = Keyframe::new(time);
                for (name, angles) in groups {
                    // The map key already carries the time
                    if name == "time" {
                        continue;
                    }
                    let angles: Vec<i32> = serde_json::from_value(angles).map_err(|e| {
                        ScriptError::InvalidKeyframe {
                            index,
                            reason: format!("group {}: {}", name, e),
                        }
                    })?;
                    frame.groups.insert(name, angles);
                }
                frames.push(frame);
            }
            frames.sort_by(|a, b| a.time.total_cmp(&b.time));
            Ok(frames)
        }
        _ => Err(ScriptError::InvalidField("keyframes")),
    }
}
