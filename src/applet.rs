//! AutomaticDoorApplet – glue between scene callbacks and one [`DoorEngine`].
//!
//! Gives every user a small proximity marker as they join so the door's
//! sensor can tell who walked in, and forwards clicks, trigger entries and
//! prompt answers to the engine.

use crate::clock::Clock;
use crate::engine::DoorEngine;
use crate::error::DoorError;
use crate::scene::{SceneEvent, SharedScene};
use crate::structure::DoorStructure;
use crate::types::{DoorConfig, ObjectId, UserId};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

pub struct AutomaticDoorApplet {
    scene: SharedScene,
    engine: DoorEngine,
    user_markers: HashMap<UserId, ObjectId>,
}

impl AutomaticDoorApplet {
    pub fn new(scene: SharedScene, clock: Arc<dyn Clock>, config: DoorConfig) -> Self {
        Self {
            engine: DoorEngine::new(scene.clone(), clock, config, None),
            scene,
            user_markers: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &DoorEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DoorEngine {
        &mut self.engine
    }

    pub fn marker_of(&self, user: &UserId) -> Option<ObjectId> {
        self.user_markers.get(user).copied()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn started(&mut self, structure: Arc<DoorStructure>) -> Result<(), DoorError> {
        self.engine.initialize(structure)
    }

    pub fn stopped(&mut self) {
        self.engine.stopped();
        let mut scene = self.scene.lock();
        for (_, marker) in self.user_markers.drain() {
            scene.destroy(marker);
        }
    }

    pub fn tick(&mut self) -> usize {
        self.engine.tick()
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn user_joined(&mut self, user: UserId) {
        if let Some(stale) = self.user_markers.remove(&user) {
            debug!("Replacing stale marker {} for {}", stale, user);
            self.scene.lock().destroy(stale);
            self.engine.remove_user(stale);
        }
        let marker = self.scene.lock().create_user_marker(&user);
        self.user_markers.insert(user.clone(), marker);
        self.engine.add_user(user, marker);
    }

    pub fn user_left(&mut self, user: &UserId) {
        if let Some(marker) = self.user_markers.remove(user) {
            self.scene.lock().destroy(marker);
            self.engine.remove_user(marker);
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn handle_event(&mut self, event: SceneEvent) {
        match event {
            SceneEvent::UserJoined(user) => self.user_joined(user),
            SceneEvent::UserLeft(user) => self.user_left(&user),
            other => self.engine.handle_event(&other),
        }
    }
}
