//! Scene collaborator: the runtime that actually owns objects, animation,
//! audio, triggers and user prompts.
//!
//! Doors only ever talk to the scene through [`Scene`]; callbacks from the
//! runtime come back as [`SceneEvent`]s routed by the applet.
//!
//! [`HeadlessScene`] is an in-memory implementation that records every call
//! and keeps a minimal object table. It backs the `door-sim` binary and the
//! test suite.

use crate::types::{Dimensions, ObjectId, SoundId, Transform, UserId, Vec3};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Call payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSpec {
    /// Catalog entry to instantiate.
    pub prefab_id: String,
    pub parent: ObjectId,
    /// Initial local pose.
    pub transform: Transform,
    /// Only this user sees the object, when set.
    pub exclusive_to: Option<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ease {
    EaseInOutSine,
}

/// Click behavior attached to a part object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    ToggleOpen,
    PasswordPrompt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundOptions {
    pub looping: bool,
    pub volume: f32,
    pub rolloff_start_distance: Option<f32>,
}

/// Invisible, non-solid box that reports objects entering it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerVolume {
    pub parent: ObjectId,
    pub position: Vec3,
    pub dimensions: Dimensions,
    /// Render the volume faintly so it can be placed by eye.
    pub visible: bool,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

pub trait Scene: Send {
    fn create_root(&mut self, exclusive_to: Option<&UserId>) -> ObjectId;
    fn instantiate(&mut self, spec: InstanceSpec) -> ObjectId;
    /// Destroy an object and everything parented under it.
    fn destroy(&mut self, object: ObjectId);
    fn animate_to(&mut self, object: ObjectId, target: Transform, duration: f32, ease: Ease);
    fn attach_interaction(&mut self, object: ObjectId, interaction: Interaction);
    fn create_sound(&mut self, name: &str, uri: &str) -> SoundId;
    fn start_sound(&mut self, object: ObjectId, sound: SoundId, options: SoundOptions);
    fn create_trigger_volume(&mut self, volume: TriggerVolume) -> ObjectId;
    /// Small collider attached to a user, used to detect their approach.
    fn create_user_marker(&mut self, user: &UserId) -> ObjectId;
    /// Ask a user for text; the answer arrives as [`SceneEvent::PromptAnswered`].
    fn prompt_text(&mut self, user: &UserId, message: &str, secret: bool);
}

pub type SharedScene = Arc<Mutex<dyn Scene>>;

/// Callbacks delivered by the scene runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    Clicked { object: ObjectId, user: UserId },
    TriggerEntered { trigger: ObjectId, other: ObjectId },
    PromptAnswered {
        user: UserId,
        submitted: bool,
        text: String,
    },
    UserJoined(UserId),
    UserLeft(UserId),
}

// ---------------------------------------------------------------------------
// Headless implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SceneCall {
    CreateRoot {
        object: ObjectId,
        exclusive_to: Option<UserId>,
    },
    Instantiate {
        object: ObjectId,
        spec: InstanceSpec,
    },
    Destroy {
        object: ObjectId,
    },
    Animate {
        object: ObjectId,
        target: Transform,
        duration: f32,
        ease: Ease,
    },
    AttachInteraction {
        object: ObjectId,
        interaction: Interaction,
    },
    CreateSound {
        sound: SoundId,
        name: String,
        uri: String,
    },
    StartSound {
        object: ObjectId,
        sound: SoundId,
        options: SoundOptions,
    },
    CreateTrigger {
        object: ObjectId,
        volume: TriggerVolume,
    },
    CreateMarker {
        object: ObjectId,
        user: UserId,
    },
    Prompt {
        user: UserId,
        message: String,
        secret: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveObject {
    pub prefab_id: Option<String>,
    pub parent: Option<ObjectId>,
    pub transform: Transform,
    pub interaction: Option<Interaction>,
}

impl LiveObject {
    fn bare(parent: Option<ObjectId>) -> Self {
        Self {
            prefab_id: None,
            parent,
            transform: Transform::IDENTITY,
            interaction: None,
        }
    }
}

/// Records every call; animations land instantly.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    next_id: u64,
    objects: HashMap<ObjectId, LiveObject>,
    sounds: HashMap<SoundId, String>,
    calls: Vec<SceneCall>,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Mutex<HeadlessScene>> {
        Arc::new(Mutex::new(Self::new()))
    }

    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, call: SceneCall) {
        debug!("scene: {:?}", call);
        self.calls.push(call);
    }

    pub fn calls(&self) -> &[SceneCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<SceneCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn object(&self, id: ObjectId) -> Option<&LiveObject> {
        self.objects.get(&id)
    }

    pub fn is_live(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    /// Live objects instantiated from the given catalog entry.
    pub fn instances_of(&self, prefab_id: &str) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self
            .objects
            .iter()
            .filter(|(_, o)| o.prefab_id.as_deref() == Some(prefab_id))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// URIs of every sound started so far, in order.
    pub fn played_sounds(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SceneCall::StartSound { sound, .. } => self.sounds.get(sound).map(String::as_str),
                _ => None,
            })
            .collect()
    }
}

impl Scene for HeadlessScene {
    fn create_root(&mut self, exclusive_to: Option<&UserId>) -> ObjectId {
        let object = ObjectId(self.alloc());
        self.objects.insert(object, LiveObject::bare(None));
        self.record(SceneCall::CreateRoot {
            object,
            exclusive_to: exclusive_to.cloned(),
        });
        object
    }

    fn instantiate(&mut self, spec: InstanceSpec) -> ObjectId {
        let object = ObjectId(self.alloc());
        self.objects.insert(
            object,
            LiveObject {
                prefab_id: Some(spec.prefab_id.clone()),
                parent: Some(spec.parent),
                transform: spec.transform,
                interaction: None,
            },
        );
        self.record(SceneCall::Instantiate { object, spec });
        object
    }

    fn destroy(&mut self, object: ObjectId) {
        let mut doomed = vec![object];
        while let Some(id) = doomed.pop() {
            if self.objects.remove(&id).is_some() {
                doomed.extend(
                    self.objects
                        .iter()
                        .filter(|(_, o)| o.parent == Some(id))
                        .map(|(child, _)| *child),
                );
            }
        }
        self.record(SceneCall::Destroy { object });
    }

    fn animate_to(&mut self, object: ObjectId, target: Transform, duration: f32, ease: Ease) {
        if let Some(o) = self.objects.get_mut(&object) {
            o.transform = target;
        }
        self.record(SceneCall::Animate {
            object,
            target,
            duration,
            ease,
        });
    }

    fn attach_interaction(&mut self, object: ObjectId, interaction: Interaction) {
        if let Some(o) = self.objects.get_mut(&object) {
            o.interaction = Some(interaction);
        }
        self.record(SceneCall::AttachInteraction {
            object,
            interaction,
        });
    }

    fn create_sound(&mut self, name: &str, uri: &str) -> SoundId {
        let sound = SoundId(self.alloc());
        self.sounds.insert(sound, uri.to_string());
        self.record(SceneCall::CreateSound {
            sound,
            name: name.to_string(),
            uri: uri.to_string(),
        });
        sound
    }

    fn start_sound(&mut self, object: ObjectId, sound: SoundId, options: SoundOptions) {
        self.record(SceneCall::StartSound {
            object,
            sound,
            options,
        });
    }

    fn create_trigger_volume(&mut self, volume: TriggerVolume) -> ObjectId {
        let object = ObjectId(self.alloc());
        let mut live = LiveObject::bare(Some(volume.parent));
        live.transform.position = volume.position.into();
        self.objects.insert(object, live);
        self.record(SceneCall::CreateTrigger { object, volume });
        object
    }

    fn create_user_marker(&mut self, user: &UserId) -> ObjectId {
        let object = ObjectId(self.alloc());
        self.objects.insert(object, LiveObject::bare(None));
        self.record(SceneCall::CreateMarker {
            object,
            user: user.clone(),
        });
        object
    }

    fn prompt_text(&mut self, user: &UserId, message: &str, secret: bool) {
        self.record(SceneCall::Prompt {
            user: user.clone(),
            message: message.to_string(),
            secret,
        });
    }
}
