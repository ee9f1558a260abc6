//! DoorEngine – one door's live state machine.
//!
//! The engine owns the door's [`PartTree`], the scene objects instantiated
//! from it, its sounds, its proximity trigger and the registry of per-user
//! markers. Every state change funnels through [`DoorEngine::set_state`].
//!
//! ## State
//!
//! `open` and `locked` are independent flags, starting closed and unlocked.
//! A lock change re-instantiates every part (locked and unlocked visuals
//! are different catalog entries); an open change animates the existing
//! objects. Locking always wins: asking to open a locked door plays the
//! locked sound and leaves it shut.
//!
//! ## Timers
//!
//! Auto-close, greeting and delayed part moves are queued and fired by
//! [`DoorEngine::tick`]. Under [`TimerPolicy::Detached`] they are never
//! cancelled; a stale auto-close can shut a door a user just reopened.

use crate::clock::Clock;
use crate::error::DoorError;
use crate::scene::{Ease, InstanceSpec, Interaction, Scene, SceneEvent, SharedScene, SoundOptions, TriggerVolume};
use crate::structure::{DoorStructure, PartIndex, PartKind, PartNode, PartTree};
use crate::timer::{ScheduledTimer, TimerAction, TimerQueue};
use crate::types::{DoorConfig, ObjectId, SoundId, TimerPolicy, UserId};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

fn after(now: Duration, secs: f32) -> Duration {
    now.saturating_add(Duration::try_from_secs_f32(secs).unwrap_or(Duration::MAX))
}

// ---------------------------------------------------------------------------
// Live door
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
struct DoorSoundHandles {
    open: Option<SoundId>,
    close: Option<SoundId>,
    locked: Option<SoundId>,
    greeting: Option<SoundId>,
}

#[derive(Debug, Clone, Copy)]
enum Cue {
    Open,
    Close,
    Locked,
    Greeting,
}

impl DoorSoundHandles {
    fn get(&self, cue: Cue) -> Option<SoundId> {
        match cue {
            Cue::Open => self.open,
            Cue::Close => self.close,
            Cue::Locked => self.locked,
            Cue::Greeting => self.greeting,
        }
    }
}

/// Everything that only exists once the structure has loaded.
struct LiveDoor {
    root: ObjectId,
    structure: Arc<DoorStructure>,
    tree: PartTree,
    sounds: DoorSoundHandles,
    trigger: Option<ObjectId>,
}

impl LiveDoor {
    fn play_cue(&self, scene: &mut dyn Scene, default_volume: f32, cue: Cue) {
        let Some(sound) = self.sounds.get(cue) else {
            debug!("No {:?} sound configured", cue);
            return;
        };
        let options = SoundOptions {
            looping: false,
            volume: self.structure.volume.unwrap_or(default_volume),
            rolloff_start_distance: self.structure.rolloff,
        };
        scene.start_sound(self.root, sound, options);
    }
}

// ---------------------------------------------------------------------------
// Recursive part update
// ---------------------------------------------------------------------------

/// One walk over the part tree for a single state change.
struct PartUpdate<'a> {
    scene: &'a mut dyn Scene,
    timers: &'a mut TimerQueue,
    now: Duration,
    generation: u64,
    owner: Option<&'a UserId>,
    has_password: bool,
    open: bool,
    locked: bool,
    open_changed: bool,
    lock_changed: bool,
}

impl PartUpdate<'_> {
    fn walk(&mut self, tree: &mut PartTree, parent: ObjectId) {
        for idx in tree.roots().to_vec() {
            self.update(tree, parent, idx);
        }
    }

    fn update(&mut self, tree: &mut PartTree, parent: ObjectId, idx: PartIndex) {
        let node = tree.node(idx);
        let object = match node.object() {
            Some(existing) if !self.lock_changed => {
                if self.open_changed {
                    self.schedule_move(node, idx, existing);
                }
                existing
            }
            previous => {
                let spec = InstanceSpec {
                    prefab_id: node.prefab_for(self.locked).to_string(),
                    parent,
                    transform: node.pose(self.open),
                    exclusive_to: self.owner.cloned(),
                };
                let interaction = match node.kind {
                    PartKind::Handle => Some(Interaction::ToggleOpen),
                    PartKind::Terminal if self.has_password => Some(Interaction::PasswordPrompt),
                    PartKind::Terminal | PartKind::Plain => None,
                };

                if let Some(old) = previous {
                    self.scene.destroy(old);
                }
                debug!("Instantiating part '{}' under {}", spec.prefab_id, parent);
                let object = self.scene.instantiate(spec);
                if let Some(interaction) = interaction {
                    self.scene.attach_interaction(object, interaction);
                }
                tree.replace_object(idx, object);
                object
            }
        };

        for child in tree.node(idx).children.clone() {
            self.update(tree, object, child);
        }
    }

    fn schedule_move(&mut self, node: &PartNode, idx: PartIndex, object: ObjectId) {
        // Parts without an open pose move on their closing timing.
        let (delay, duration) = node.timing.towards(self.open && node.open.is_some());
        let target = node.pose(self.open);
        if delay > 0.0 {
            self.timers.schedule(
                after(self.now, delay),
                self.generation,
                TimerAction::Animate {
                    part: idx,
                    target,
                    duration,
                },
            );
        } else {
            debug!("Animating {} over {:.2}s", object, duration);
            self.scene
                .animate_to(object, target, duration, Ease::EaseInOutSine);
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct DoorEngine {
    scene: SharedScene,
    clock: Arc<dyn Clock>,
    config: DoorConfig,
    owner: Option<UserId>,
    open: bool,
    locked: bool,
    live: Option<LiveDoor>,
    timers: TimerQueue,
    /// Bumped on every committed state change.
    generation: u64,
    /// Proximity marker → user it is attached to.
    markers: HashMap<ObjectId, UserId>,
    /// Users currently looking at a password prompt from this door.
    prompts: HashSet<UserId>,
}

impl DoorEngine {
    pub fn new(
        scene: SharedScene,
        clock: Arc<dyn Clock>,
        config: DoorConfig,
        owner: Option<UserId>,
    ) -> Self {
        Self {
            scene,
            clock,
            config,
            owner,
            open: false,
            locked: false,
            live: None,
            timers: TimerQueue::new(),
            generation: 0,
            markers: HashMap::new(),
            prompts: HashSet::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Bring a loaded structure to life: root, sounds, sensor and every part.
    pub fn initialize(&mut self, structure: Arc<DoorStructure>) -> Result<(), DoorError> {
        if self.live.is_some() {
            return Err(DoorError::AlreadyInitialized);
        }

        let mut guard = self.scene.lock();
        let scene: &mut dyn Scene = &mut *guard;

        let root = scene.create_root(self.owner.as_ref());

        let mut register = |name: &str, uri: &Option<String>| {
            uri.as_deref().map(|uri| scene.create_sound(name, uri))
        };
        let sounds = DoorSoundHandles {
            open: register("open", &structure.sounds.open),
            close: register("close", &structure.sounds.close),
            locked: register("locked", &structure.sounds.locked),
            greeting: register("greeting", &structure.sounds.greeting),
        };

        let trigger = structure.is_automatic.then(|| {
            scene.create_trigger_volume(TriggerVolume {
                parent: root,
                position: structure.sensor_position,
                dimensions: structure.sensor_dimensions,
                visible: structure.is_debug,
            })
        });

        let mut tree = PartTree::from_structure(&structure);
        PartUpdate {
            scene,
            timers: &mut self.timers,
            now: self.clock.now(),
            generation: self.generation,
            owner: self.owner.as_ref(),
            has_password: structure.password.is_some(),
            open: self.open,
            locked: self.locked,
            open_changed: false,
            lock_changed: false,
        }
        .walk(&mut tree, root);
        drop(guard);

        info!(
            "Door initialized at {} with {} parts (automatic={})",
            root,
            tree.len(),
            structure.is_automatic
        );
        self.live = Some(LiveDoor {
            root,
            structure,
            tree,
            sounds,
            trigger,
        });
        Ok(())
    }

    /// Release every object this door instantiated.
    pub fn stopped(&mut self) {
        self.timers.clear();
        self.markers.clear();
        self.prompts.clear();

        let Some(mut live) = self.live.take() else {
            return;
        };
        let mut scene = self.scene.lock();
        for object in live.tree.take_objects() {
            scene.destroy(object);
        }
        if let Some(trigger) = live.trigger {
            scene.destroy(trigger);
        }
        scene.destroy(live.root);
        info!("Door at {} released", live.root);
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_open(&mut self, open: bool) {
        self.set_state(open, self.locked);
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.set_state(self.open, locked);
    }

    /// The single entry point for every open/lock transition.
    pub fn set_state(&mut self, open: bool, locked: bool) {
        let Some(live) = self.live.as_mut() else {
            warn!("Ignoring door state change before the structure has loaded");
            return;
        };

        let mut open_changed = open != self.open;
        let lock_changed = locked != self.locked;
        if !open_changed && !lock_changed {
            return;
        }

        self.locked = locked;
        self.generation += 1;

        let mut guard = self.scene.lock();
        let scene: &mut dyn Scene = &mut *guard;
        let volume = self.config.default_volume;

        if self.locked && open_changed {
            live.play_cue(scene, volume, Cue::Locked);
            open_changed = false;
        }
        if open_changed {
            self.open = open;
            live.play_cue(scene, volume, if open { Cue::Open } else { Cue::Close });
        }

        info!(
            "Door at {} is now {} and {}",
            live.root,
            if self.open { "open" } else { "closed" },
            if self.locked { "locked" } else { "unlocked" }
        );

        let now = self.clock.now();
        PartUpdate {
            scene,
            timers: &mut self.timers,
            now,
            generation: self.generation,
            owner: self.owner.as_ref(),
            has_password: live.structure.password.is_some(),
            open: self.open,
            locked: self.locked,
            open_changed,
            lock_changed,
        }
        .walk(&mut live.tree, live.root);
        drop(guard);

        if self.open && live.structure.open_time > 0.0 {
            self.timers.schedule(
                after(now, live.structure.open_time),
                self.generation,
                TimerAction::AutoClose { locked },
            );
        }
        if self.open && live.structure.greeting_delay > 0.0 {
            self.timers.schedule(
                after(now, live.structure.greeting_delay),
                self.generation,
                TimerAction::Greeting,
            );
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Fire every timer that is due. Returns how many fired.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        while let Some(timer) = self.timers.pop_due(now) {
            self.fire(timer);
            fired += 1;
        }
        fired
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn is_superseded(&self, timer: &ScheduledTimer) -> bool {
        self.config.timer_policy == TimerPolicy::Supersede && timer.generation != self.generation
    }

    fn fire(&mut self, timer: ScheduledTimer) {
        match timer.action {
            TimerAction::AutoClose { .. } | TimerAction::Greeting if self.is_superseded(&timer) => {
                debug!("Dropping superseded {:?}", timer.action);
            }
            TimerAction::AutoClose { locked } => {
                debug!("Auto-closing door");
                self.set_state(false, locked);
            }
            TimerAction::Greeting => {
                let Some(live) = &self.live else { return };
                let mut scene = self.scene.lock();
                live.play_cue(&mut *scene, self.config.default_volume, Cue::Greeting);
            }
            TimerAction::Animate {
                part,
                target,
                duration,
            } => {
                let Some(live) = &self.live else { return };
                if let Some(object) = live.tree.node(part).object() {
                    self.scene
                        .lock()
                        .animate_to(object, target, duration, Ease::EaseInOutSine);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Interaction
    // -----------------------------------------------------------------------

    /// Route a scene callback to this door. Join/leave are the applet's job.
    pub fn handle_event(&mut self, event: &SceneEvent) {
        match event {
            SceneEvent::Clicked { object, user } => self.on_click(*object, user),
            SceneEvent::TriggerEntered { trigger, other } => self.on_trigger_enter(*trigger, *other),
            SceneEvent::PromptAnswered {
                user,
                submitted,
                text,
            } => self.on_prompt_answer(user, *submitted, text),
            SceneEvent::UserJoined(_) | SceneEvent::UserLeft(_) => {}
        }
    }

    pub fn on_click(&mut self, object: ObjectId, user: &UserId) {
        let Some(live) = &self.live else { return };
        let Some(idx) = live.tree.find_by_object(object) else {
            return;
        };

        let kind = live.tree.node(idx).kind;
        let has_password = live.structure.password.is_some();

        match kind {
            PartKind::Handle => {
                debug!("{} used the handle", user);
                self.set_open(!self.open);
            }
            PartKind::Terminal if has_password => {
                self.prompts.insert(user.clone());
                self.scene
                    .lock()
                    .prompt_text(user, &self.config.password_prompt, true);
            }
            PartKind::Terminal | PartKind::Plain => {}
        }
    }

    pub fn on_prompt_answer(&mut self, user: &UserId, submitted: bool, text: &str) {
        if !self.prompts.remove(user) {
            return;
        }
        let matches = self
            .live
            .as_ref()
            .and_then(|live| live.structure.password.as_deref())
            .is_some_and(|password| submitted && text == password);
        if matches {
            info!("{} entered the door password", user);
            self.set_open(true);
        } else {
            debug!("Password from {} rejected", user);
        }
    }

    pub fn on_trigger_enter(&mut self, trigger: ObjectId, other: ObjectId) {
        let ours = self.live.as_ref().and_then(|l| l.trigger) == Some(trigger);
        if !ours {
            return;
        }
        let Some(user) = self.markers.get(&other) else {
            return;
        };
        info!("User {} entered the door sensor", user);
        self.set_open(true);
    }

    // -----------------------------------------------------------------------
    // User registry
    // -----------------------------------------------------------------------

    pub fn add_user(&mut self, user: UserId, marker: ObjectId) {
        self.markers.insert(marker, user);
    }

    pub fn remove_user(&mut self, marker: ObjectId) -> Option<UserId> {
        self.markers.remove(&marker)
    }

    pub fn user_count(&self) -> usize {
        self.markers.len()
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn is_initialized(&self) -> bool {
        self.live.is_some()
    }

    pub fn root(&self) -> Option<ObjectId> {
        self.live.as_ref().map(|l| l.root)
    }

    pub fn trigger(&self) -> Option<ObjectId> {
        self.live.as_ref().and_then(|l| l.trigger)
    }

    pub fn tree(&self) -> Option<&PartTree> {
        self.live.as_ref().map(|l| &l.tree)
    }

    /// Live object of the first part of the given kind.
    pub fn part_object(&self, kind: PartKind) -> Option<ObjectId> {
        self.tree()?
            .iter()
            .find(|(_, n)| n.kind == kind)
            .and_then(|(_, n)| n.object())
    }
}
