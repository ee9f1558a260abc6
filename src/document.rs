//! Door description wire format.
//!
//! This module owns the JSON document a door is described by, exactly as it
//! arrives inline or over HTTP. Nothing here is normalized: rotations are
//! still Euler angles in degrees and every optional field is still optional.
//! [`crate::structure`] turns these into runtime types.
//!
//! ```json
//! {
//!   "opensound": "https://example.org/open.ogg",
//!   "opentime": 5,
//!   "sensorPosition": { "x": 0, "y": 1, "z": 0 },
//!   "parts": [
//!     { "prefabid": "door-frame",
//!       "closed": { "position": { "x": 0, "y": 0, "z": 0 } },
//!       "parts": [
//!         { "prefabid": "door-leaf", "openduration": 1.5,
//!           "closed": {}, "open": { "rotation": { "x": 0, "y": 90, "z": 0 } },
//!           "isHandle": true }
//!       ] }
//!   ]
//! }
//! ```

use crate::types::{Dimensions, Vec3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// Partial pose as written in the document. Rotation is in degrees.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawTransform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec3>,
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawDoorPart {
    #[serde(rename = "prefabid")]
    pub prefab_id: String,
    /// Must only be set on leaf parts.
    #[serde(rename = "lockedprefabid", default, skip_serializing_if = "Option::is_none")]
    pub locked_prefab_id: Option<String>,
    #[serde(default)]
    pub closed: RawTransform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<RawTransform>,
    #[serde(rename = "opendelay", default, skip_serializing_if = "Option::is_none")]
    pub open_delay: Option<f32>,
    #[serde(rename = "openduration", default, skip_serializing_if = "Option::is_none")]
    pub open_duration: Option<f32>,
    #[serde(rename = "closedelay", default, skip_serializing_if = "Option::is_none")]
    pub close_delay: Option<f32>,
    #[serde(rename = "closeduration", default, skip_serializing_if = "Option::is_none")]
    pub close_duration: Option<f32>,
    #[serde(rename = "isHandle", default)]
    pub is_handle: bool,
    #[serde(rename = "isTerminal", default)]
    pub is_terminal: bool,
    #[serde(default)]
    pub parts: Vec<RawDoorPart>,
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawDoorStructure {
    #[serde(rename = "opensound", default, skip_serializing_if = "Option::is_none")]
    pub open_sound: Option<String>,
    #[serde(rename = "closesound", default, skip_serializing_if = "Option::is_none")]
    pub close_sound: Option<String>,
    #[serde(rename = "lockedsound", default, skip_serializing_if = "Option::is_none")]
    pub locked_sound: Option<String>,
    #[serde(rename = "greetingsound", default, skip_serializing_if = "Option::is_none")]
    pub greeting_sound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolloff: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    /// Seconds until an open door closes again; 0 or absent disables it.
    #[serde(rename = "opentime", default, skip_serializing_if = "Option::is_none")]
    pub open_time: Option<f32>,
    #[serde(rename = "greetingdelay", default, skip_serializing_if = "Option::is_none")]
    pub greeting_delay: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "isAutomatic", default, skip_serializing_if = "Option::is_none")]
    pub is_automatic: Option<bool>,
    #[serde(rename = "isDebug", default, skip_serializing_if = "Option::is_none")]
    pub is_debug: Option<bool>,
    #[serde(rename = "sensorPosition", default, skip_serializing_if = "Option::is_none")]
    pub sensor_position: Option<Vec3>,
    #[serde(rename = "sensorDimensions", default, skip_serializing_if = "Option::is_none")]
    pub sensor_dimensions: Option<Dimensions>,
    pub parts: Vec<RawDoorPart>,
}

impl RawDoorStructure {
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Where a door's description comes from.
#[derive(Debug, Clone)]
pub enum DoorSource {
    /// A structure value supplied by the caller; never cached.
    Inline(RawDoorStructure),
    /// A URL to fetch the JSON document from; loads are shared and cached.
    Url(String),
}

impl From<RawDoorStructure> for DoorSource {
    fn from(raw: RawDoorStructure) -> Self {
        DoorSource::Inline(raw)
    }
}

impl From<&str> for DoorSource {
    fn from(url: &str) -> Self {
        DoorSource::Url(url.to_string())
    }
}

impl From<String> for DoorSource {
    fn from(url: String) -> Self {
        DoorSource::Url(url)
    }
}
