//! Structure subsystem: normalized door structures, their parts, and the
//! per-door `PartTree` arena that carries live object handles.

use crate::document::{RawDoorPart, RawDoorStructure, RawTransform};
use crate::types::{Dimensions, ObjectId, Transform, Vec3};

// ---------------------------------------------------------------------------
// Angle conversion
// ---------------------------------------------------------------------------

/// Convert a document rotation (Euler degrees) into a quaternion.
///
/// Yaw is applied around Y, then pitch around X, then roll around Z.
pub fn rotation_from_degrees(degrees: Vec3) -> glam::Quat {
    glam::Quat::from_euler(
        glam::EulerRot::YXZ,
        degrees.y.to_radians(),
        degrees.x.to_radians(),
        degrees.z.to_radians(),
    )
}

fn transform_from_raw(raw: &RawTransform) -> Transform {
    Transform {
        position: raw.position.map(Into::into).unwrap_or(glam::Vec3::ZERO),
        rotation: raw
            .rotation
            .map(rotation_from_degrees)
            .unwrap_or(glam::Quat::IDENTITY),
        scale: raw.scale.map(Into::into).unwrap_or(glam::Vec3::ONE),
    }
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// What a part does when a user clicks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Plain,
    /// Toggles the door open state.
    Handle,
    /// Asks for the door password and opens on a match.
    Terminal,
}

impl PartKind {
    fn from_flags(is_handle: bool, is_terminal: bool) -> Self {
        match (is_handle, is_terminal) {
            (_, true) => PartKind::Terminal,
            (true, false) => PartKind::Handle,
            (false, false) => PartKind::Plain,
        }
    }
}

/// Transition timing of a part, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartTiming {
    pub open_delay: f32,
    pub open_duration: f32,
    pub close_delay: f32,
    pub close_duration: f32,
}

impl PartTiming {
    /// `(delay, duration)` of the move towards the given state.
    pub fn towards(&self, open: bool) -> (f32, f32) {
        if open {
            (self.open_delay, self.open_duration)
        } else {
            (self.close_delay, self.close_duration)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoorPart {
    pub prefab_id: String,
    pub locked_prefab_id: Option<String>,
    pub closed: Transform,
    pub open: Option<Transform>,
    pub timing: PartTiming,
    pub kind: PartKind,
    pub parts: Vec<DoorPart>,
}

impl DoorPart {
    fn from_raw(raw: &RawDoorPart) -> Self {
        Self {
            prefab_id: raw.prefab_id.clone(),
            locked_prefab_id: raw.locked_prefab_id.clone(),
            closed: transform_from_raw(&raw.closed),
            open: raw.open.as_ref().map(transform_from_raw),
            timing: PartTiming {
                open_delay: raw.open_delay.unwrap_or(0.0),
                open_duration: raw.open_duration.unwrap_or(0.0),
                close_delay: raw.close_delay.unwrap_or(0.0),
                close_duration: raw.close_duration.unwrap_or(0.0),
            },
            kind: PartKind::from_flags(raw.is_handle, raw.is_terminal),
            parts: raw.parts.iter().map(DoorPart::from_raw).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoorSounds {
    pub open: Option<String>,
    pub close: Option<String>,
    pub locked: Option<String>,
    pub greeting: Option<String>,
}

/// A door description with every default applied and every rotation
/// converted. Shared read-only between all doors of the same kind.
#[derive(Debug, Clone, PartialEq)]
pub struct DoorStructure {
    pub sounds: DoorSounds,
    pub volume: Option<f32>,
    pub rolloff: Option<f32>,
    pub open_time: f32,
    pub greeting_delay: f32,
    pub password: Option<String>,
    pub is_automatic: bool,
    pub is_debug: bool,
    pub sensor_position: Vec3,
    pub sensor_dimensions: Dimensions,
    pub parts: Vec<DoorPart>,
}

impl DoorStructure {
    /// Normalize a freshly parsed document. This is the only place degree
    /// angles are converted.
    pub fn normalize(raw: &RawDoorStructure) -> Self {
        Self {
            sounds: DoorSounds {
                open: raw.open_sound.clone(),
                close: raw.close_sound.clone(),
                locked: raw.locked_sound.clone(),
                greeting: raw.greeting_sound.clone(),
            },
            volume: raw.volume.filter(|v| *v != 0.0),
            rolloff: raw.rolloff.filter(|r| *r != 0.0),
            open_time: raw.open_time.unwrap_or(0.0),
            greeting_delay: raw.greeting_delay.unwrap_or(0.0),
            password: raw.password.clone().filter(|p| !p.is_empty()),
            is_automatic: raw.is_automatic.unwrap_or(true),
            is_debug: raw.is_debug.unwrap_or(false),
            sensor_position: raw.sensor_position.unwrap_or(Vec3::new(0.0, 1.0, 0.0)),
            sensor_dimensions: raw
                .sensor_dimensions
                .unwrap_or(Dimensions::new(2.0, 1.0, 2.0)),
            parts: raw.parts.iter().map(DoorPart::from_raw).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Part tree (live, per door)
// ---------------------------------------------------------------------------

/// Stable index of a node inside a [`PartTree`].
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct PartIndex(usize);

#[derive(Debug, Clone)]
pub struct PartNode {
    pub prefab_id: String,
    pub locked_prefab_id: Option<String>,
    pub closed: Transform,
    pub open: Option<Transform>,
    pub timing: PartTiming,
    pub kind: PartKind,
    pub children: Vec<PartIndex>,
    /// Currently instantiated scene object, if any.
    object: Option<ObjectId>,
}

impl PartNode {
    pub fn object(&self) -> Option<ObjectId> {
        self.object
    }

    pub fn prefab_for(&self, locked: bool) -> &str {
        match (&self.locked_prefab_id, locked) {
            (Some(id), true) => id,
            _ => &self.prefab_id,
        }
    }

    /// Pose for the given state. Parts without an open pose stay closed.
    pub fn pose(&self, open: bool) -> Transform {
        match self.open {
            Some(t) if open => t,
            _ => self.closed,
        }
    }
}

/// Arena copy of a structure's part forest, owned by one door.
///
/// Building a tree copies every part, so live handles never leak back into
/// the shared [`DoorStructure`].
#[derive(Debug, Clone, Default)]
pub struct PartTree {
    nodes: Vec<PartNode>,
    roots: Vec<PartIndex>,
}

impl PartTree {
    pub fn from_structure(structure: &DoorStructure) -> Self {
        let mut tree = Self::default();
        for part in &structure.parts {
            let idx = tree.push(part);
            tree.roots.push(idx);
        }
        tree
    }

    fn push(&mut self, part: &DoorPart) -> PartIndex {
        let idx = PartIndex(self.nodes.len());
        self.nodes.push(PartNode {
            prefab_id: part.prefab_id.clone(),
            locked_prefab_id: part.locked_prefab_id.clone(),
            closed: part.closed,
            open: part.open,
            timing: part.timing,
            kind: part.kind,
            children: Vec::with_capacity(part.parts.len()),
            object: None,
        });
        for child in &part.parts {
            let child_idx = self.push(child);
            self.nodes[idx.0].children.push(child_idx);
        }
        idx
    }

    pub fn roots(&self) -> &[PartIndex] {
        &self.roots
    }

    pub fn node(&self, idx: PartIndex) -> &PartNode {
        &self.nodes[idx.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PartIndex, &PartNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (PartIndex(i), n))
    }

    /// Store a freshly instantiated object, returning the one it replaces.
    pub fn replace_object(&mut self, idx: PartIndex, object: ObjectId) -> Option<ObjectId> {
        self.nodes[idx.0].object.replace(object)
    }

    pub fn find_by_object(&self, object: ObjectId) -> Option<PartIndex> {
        self.nodes
            .iter()
            .position(|n| n.object == Some(object))
            .map(PartIndex)
    }

    /// Detach every live handle, children before parents.
    pub fn take_objects(&mut self) -> Vec<ObjectId> {
        self.nodes
            .iter_mut()
            .rev()
            .filter_map(|n| n.object.take())
            .collect()
    }
}
