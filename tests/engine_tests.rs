//! DoorEngine unit tests

#[cfg(test)]
mod tests {
    use door_engine::{
        clock::ManualClock,
        document::RawDoorStructure,
        engine::DoorEngine,
        error::DoorError,
        scene::{HeadlessScene, Interaction, SceneCall},
        structure::{DoorStructure, PartKind},
        types::{Dimensions, DoorConfig, ObjectId, TimerPolicy, UserId, Vec3},
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    type Scene = Arc<Mutex<HeadlessScene>>;

    fn full_door() -> Value {
        json!({
            "opensound": "open.ogg",
            "closesound": "close.ogg",
            "lockedsound": "locked.ogg",
            "greetingsound": "hello.ogg",
            "password": "sesame",
            "parts": [
                { "prefabid": "frame", "closed": {}, "parts": [
                    { "prefabid": "leaf",
                      "closed": {},
                      "open": { "rotation": { "x": 0, "y": 90, "z": 0 } },
                      "openduration": 1.0, "closeduration": 1.5,
                      "parts": [
                        { "prefabid": "handle", "closed": { "position": { "x": 0.4 } },
                          "isHandle": true }
                      ] }
                ] },
                { "prefabid": "terminal", "lockedprefabid": "terminal-red",
                  "closed": { "position": { "x": 1.2, "y": 1.0 } }, "isTerminal": true }
            ]
        })
    }

    fn structure(doc: Value) -> Arc<DoorStructure> {
        let raw = RawDoorStructure::from_json(doc).unwrap();
        Arc::new(DoorStructure::normalize(&raw))
    }

    fn make_engine_with(doc: Value, config: DoorConfig, owner: Option<UserId>) -> (DoorEngine, Scene, Arc<ManualClock>) {
        let scene = HeadlessScene::shared();
        let clock = Arc::new(ManualClock::new());
        let mut engine = DoorEngine::new(scene.clone(), clock.clone(), config, owner);
        engine.initialize(structure(doc)).unwrap();
        (engine, scene, clock)
    }

    fn make_engine(doc: Value) -> (DoorEngine, Scene, Arc<ManualClock>) {
        make_engine_with(doc, DoorConfig::default(), None)
    }

    fn part_objects(engine: &DoorEngine) -> Vec<ObjectId> {
        engine
            .tree()
            .unwrap()
            .iter()
            .filter_map(|(_, n)| n.object())
            .collect()
    }

    fn count(calls: &[SceneCall], pred: impl Fn(&SceneCall) -> bool) -> usize {
        calls.iter().filter(|c| pred(c)).count()
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    #[test]
    fn initialize_instantiates_tree_under_parents() {
        let (engine, scene, _clock) = make_engine(full_door());
        let scene = scene.lock();
        let root = engine.root().unwrap();

        let frame = scene.instances_of("frame")[0];
        let leaf = scene.instances_of("leaf")[0];
        let handle = scene.instances_of("handle")[0];
        let terminal = scene.instances_of("terminal")[0];

        assert_eq!(scene.object(frame).unwrap().parent, Some(root));
        assert_eq!(scene.object(leaf).unwrap().parent, Some(frame));
        assert_eq!(scene.object(handle).unwrap().parent, Some(leaf));
        assert_eq!(scene.object(terminal).unwrap().parent, Some(root));

        assert_eq!(scene.object(handle).unwrap().interaction, Some(Interaction::ToggleOpen));
        assert_eq!(
            scene.object(terminal).unwrap().interaction,
            Some(Interaction::PasswordPrompt)
        );
        assert_eq!(scene.object(frame).unwrap().interaction, None);
    }

    #[test]
    fn automatic_door_gets_sensor_with_defaults() {
        let (engine, scene, _clock) = make_engine(full_door());
        let scene = scene.lock();
        let trigger = engine.trigger().unwrap();

        let volume = scene
            .calls()
            .iter()
            .find_map(|c| match c {
                SceneCall::CreateTrigger { object, volume } if *object == trigger => Some(*volume),
                _ => None,
            })
            .unwrap();
        assert_eq!(volume.parent, engine.root().unwrap());
        assert_eq!(volume.dimensions.width, 2.0);
        assert_eq!(volume.position.y, 1.0);
        assert!(!volume.visible);
    }

    #[test]
    fn debug_sensor_uses_structure_geometry_and_is_visible() {
        let (engine, scene, _clock) = make_engine(json!({
            "isDebug": true,
            "sensorPosition": { "x": 1, "y": 0.5, "z": -2 },
            "sensorDimensions": { "width": 4, "height": 3, "depth": 1 },
            "parts": [ { "prefabid": "leaf", "closed": {} } ]
        }));
        let scene = scene.lock();
        let trigger = engine.trigger().unwrap();

        let volume = scene
            .calls()
            .iter()
            .find_map(|c| match c {
                SceneCall::CreateTrigger { object, volume } if *object == trigger => Some(*volume),
                _ => None,
            })
            .unwrap();
        assert_eq!(volume.position, Vec3::new(1.0, 0.5, -2.0));
        assert_eq!(volume.dimensions, Dimensions::new(4.0, 3.0, 1.0));
        assert!(volume.visible);
    }

    #[test]
    fn non_automatic_door_has_no_sensor() {
        let (engine, _scene, _clock) = make_engine(json!({
            "isAutomatic": false,
            "parts": [ { "prefabid": "leaf", "closed": {} } ]
        }));
        assert!(engine.trigger().is_none());
    }

    #[test]
    fn terminal_without_password_is_inert() {
        let (_engine, scene, _clock) = make_engine(json!({
            "parts": [ { "prefabid": "terminal", "closed": {}, "isTerminal": true } ]
        }));
        let scene = scene.lock();
        let terminal = scene.instances_of("terminal")[0];
        assert_eq!(scene.object(terminal).unwrap().interaction, None);
    }

    #[test]
    fn owner_makes_every_part_exclusive() {
        let owner = UserId::new("alice");
        let (_engine, scene, _clock) =
            make_engine_with(full_door(), DoorConfig::default(), Some(owner.clone()));
        let scene = scene.lock();
        for call in scene.calls() {
            match call {
                SceneCall::Instantiate { spec, .. } => {
                    assert_eq!(spec.exclusive_to.as_ref(), Some(&owner))
                }
                SceneCall::CreateRoot { exclusive_to, .. } => {
                    assert_eq!(exclusive_to.as_ref(), Some(&owner))
                }
                _ => {}
            }
        }
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let (mut engine, _scene, _clock) = make_engine(full_door());
        let err = engine.initialize(structure(full_door())).unwrap_err();
        assert!(matches!(err, DoorError::AlreadyInitialized));
    }

    #[test]
    fn state_changes_before_initialize_are_ignored() {
        let scene = HeadlessScene::shared();
        let mut engine = DoorEngine::new(
            scene.clone(),
            Arc::new(ManualClock::new()),
            DoorConfig::default(),
            None,
        );
        engine.set_open(true);
        assert!(!engine.is_open());
        assert!(scene.lock().calls().is_empty());
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    #[test]
    fn locking_wins_over_simultaneous_open() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        scene.lock().take_calls();

        engine.set_state(true, true);

        assert!(!engine.is_open());
        assert!(engine.is_locked());
        assert_eq!(scene.lock().played_sounds(), vec!["locked.ogg"]);
    }

    #[test]
    fn opening_a_locked_door_rattles_it() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        engine.set_locked(true);
        engine.set_open(true);

        assert!(!engine.is_open());
        assert_eq!(scene.lock().played_sounds(), vec!["locked.ogg"]);
    }

    #[test]
    fn unchanged_state_is_a_noop() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        scene.lock().take_calls();

        engine.set_state(false, false);

        assert!(scene.lock().calls().is_empty());
        assert_eq!(engine.pending_timers(), 0);
    }

    #[test]
    fn open_and_close_play_matching_sounds() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        engine.set_open(true);
        engine.set_open(false);
        assert_eq!(scene.lock().played_sounds(), vec!["open.ogg", "close.ogg"]);
    }

    #[test]
    fn sound_options_follow_structure() {
        let (mut engine, scene, _clock) = make_engine(json!({
            "opensound": "open.ogg", "volume": 0.4, "rolloff": 3,
            "parts": [ { "prefabid": "leaf", "closed": {} } ]
        }));
        engine.set_open(true);

        let scene = scene.lock();
        let options = scene
            .calls()
            .iter()
            .find_map(|c| match c {
                SceneCall::StartSound { options, .. } => Some(*options),
                _ => None,
            })
            .unwrap();
        assert!(!options.looping);
        assert_eq!(options.volume, 0.4);
        assert_eq!(options.rolloff_start_distance, Some(3.0));
    }

    // -----------------------------------------------------------------------
    // Re-instantiation vs animation
    // -----------------------------------------------------------------------

    #[test]
    fn toggling_open_animates_without_recreating() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        let before = part_objects(&engine);
        scene.lock().take_calls();

        engine.set_open(true);

        assert_eq!(part_objects(&engine), before);
        let calls = scene.lock().take_calls();
        assert_eq!(count(&calls, |c| matches!(c, SceneCall::Destroy { .. })), 0);
        assert_eq!(count(&calls, |c| matches!(c, SceneCall::Instantiate { .. })), 0);
        assert_eq!(count(&calls, |c| matches!(c, SceneCall::Animate { .. })), before.len());

        let leaf = scene.lock().instances_of("leaf")[0];
        let leaf_move = calls
            .iter()
            .find_map(|c| match c {
                SceneCall::Animate {
                    object,
                    target,
                    duration,
                    ..
                } if *object == leaf => Some((*target, *duration)),
                _ => None,
            })
            .unwrap();
        let expected = glam::Quat::from_rotation_y(90f32.to_radians());
        assert!(leaf_move.0.rotation.abs_diff_eq(expected, 1e-6));
        assert_eq!(leaf_move.1, 1.0);
    }

    #[test]
    fn toggling_lock_recreates_every_part() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        let before = part_objects(&engine);

        engine.set_locked(true);

        let after = part_objects(&engine);
        assert_eq!(after.len(), before.len());
        let scene = scene.lock();
        for old in &before {
            assert!(!scene.is_live(*old));
            assert!(!after.contains(old));
        }
        for new in &after {
            assert!(scene.is_live(*new));
        }
        // Children are re-parented to the fresh objects.
        let leaf = scene.instances_of("leaf")[0];
        let handle = scene.instances_of("handle")[0];
        assert_eq!(scene.object(handle).unwrap().parent, Some(leaf));
    }

    #[test]
    fn locking_while_closed_uses_locked_prefab_at_closed_pose() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        engine.set_locked(true);

        let scene = scene.lock();
        assert!(scene.instances_of("terminal").is_empty());
        let red = scene.instances_of("terminal-red");
        assert_eq!(red.len(), 1);
        let pose = scene.object(red[0]).unwrap().transform;
        assert_eq!(pose.position, glam::Vec3::new(1.2, 1.0, 0.0));
    }

    #[test]
    fn unlocking_while_open_reinstantiates_at_open_pose() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        engine.set_open(true);
        engine.set_locked(true);
        engine.set_locked(false);

        assert!(engine.is_open());
        let scene = scene.lock();
        let leaf = scene.instances_of("leaf")[0];
        let expected = glam::Quat::from_rotation_y(90f32.to_radians());
        assert!(scene.object(leaf).unwrap().transform.rotation.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn delayed_part_moves_wait_for_their_timer() {
        let (mut engine, scene, clock) = make_engine(json!({
            "isAutomatic": false,
            "parts": [ { "prefabid": "leaf", "closed": {},
                         "open": { "position": { "y": 2 } },
                         "opendelay": 1.5, "openduration": 2 } ]
        }));
        scene.lock().take_calls();

        engine.set_open(true);
        assert!(scene.lock().take_calls().iter().all(|c| !matches!(c, SceneCall::Animate { .. })));

        clock.advance_secs(1.0);
        assert_eq!(engine.tick(), 0);

        clock.advance_secs(0.5);
        assert_eq!(engine.tick(), 1);
        let leaf = scene.lock().instances_of("leaf")[0];
        assert_eq!(
            scene.lock().object(leaf).unwrap().transform.position,
            glam::Vec3::new(0.0, 2.0, 0.0)
        );
    }

    #[test]
    fn delayed_move_targets_part_recreated_by_lock() {
        let (mut engine, scene, clock) = make_engine(json!({
            "isAutomatic": false,
            "parts": [ { "prefabid": "leaf", "closed": {},
                         "open": { "position": { "y": 2 } },
                         "opendelay": 1.5 } ]
        }));
        let before = part_objects(&engine)[0];

        engine.set_open(true);
        engine.set_locked(true);
        let after = part_objects(&engine)[0];
        assert_ne!(before, after);
        scene.lock().take_calls();

        clock.advance_secs(1.5);
        assert_eq!(engine.tick(), 1);
        let calls = scene.lock().take_calls();
        assert_eq!(
            count(&calls, |c| matches!(c, SceneCall::Animate { object, .. } if *object == after)),
            1
        );
        assert_eq!(
            count(&calls, |c| matches!(c, SceneCall::Animate { object, .. } if *object == before)),
            0
        );
    }

    #[test]
    fn part_without_open_pose_moves_on_close_timing() {
        let (mut engine, scene, _clock) = make_engine(json!({
            "isAutomatic": false,
            "parts": [ { "prefabid": "frame", "closed": {},
                         "opendelay": 2, "openduration": 3,
                         "closedelay": 0, "closeduration": 0.75 } ]
        }));
        scene.lock().take_calls();

        engine.set_open(true);

        assert_eq!(engine.pending_timers(), 0);
        let calls = scene.lock().take_calls();
        let duration = calls
            .iter()
            .find_map(|c| match c {
                SceneCall::Animate { duration, .. } => Some(*duration),
                _ => None,
            })
            .unwrap();
        assert_eq!(duration, 0.75);
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    fn auto_close_door() -> Value {
        json!({
            "opensound": "open.ogg", "closesound": "close.ogg",
            "opentime": 5,
            "parts": [ { "prefabid": "leaf", "closed": {},
                         "open": { "position": { "x": 1 } } } ]
        })
    }

    #[test]
    fn open_door_closes_itself_after_opentime() {
        let (mut engine, scene, clock) = make_engine(auto_close_door());
        engine.set_open(true);

        clock.advance_secs(4.9);
        engine.tick();
        assert!(engine.is_open());

        clock.advance_secs(0.1);
        engine.tick();
        assert!(!engine.is_open());
        assert_eq!(scene.lock().played_sounds(), vec!["open.ogg", "close.ogg"]);
    }

    #[test]
    fn detached_timers_still_fire_after_reopen() {
        let (mut engine, _scene, clock) = make_engine(auto_close_door());
        engine.set_open(true);
        clock.advance_secs(1.0);
        engine.set_open(false);
        clock.advance_secs(1.0);
        engine.set_open(true);

        // First auto-close (scheduled at t=0) fires at t=5 and shuts the
        // door that was reopened at t=2.
        clock.advance_secs(3.0);
        engine.tick();
        assert!(!engine.is_open());
    }

    #[test]
    fn supersede_policy_drops_stale_auto_close() {
        let config = DoorConfig {
            timer_policy: TimerPolicy::Supersede,
            ..Default::default()
        };
        let (mut engine, _scene, clock) = make_engine_with(auto_close_door(), config, None);
        engine.set_open(true);
        clock.advance_secs(1.0);
        engine.set_open(false);
        clock.advance_secs(1.0);
        engine.set_open(true);

        clock.advance_secs(3.0);
        engine.tick();
        assert!(engine.is_open());

        clock.advance_secs(2.0);
        engine.tick();
        assert!(!engine.is_open());
    }

    #[test]
    fn greeting_plays_after_delay() {
        let (mut engine, scene, clock) = make_engine(json!({
            "opensound": "open.ogg", "greetingsound": "hello.ogg", "greetingdelay": 2,
            "parts": [ { "prefabid": "leaf", "closed": {} } ]
        }));
        engine.set_open(true);
        assert_eq!(scene.lock().played_sounds(), vec!["open.ogg"]);

        clock.advance_secs(2.0);
        engine.tick();
        assert_eq!(scene.lock().played_sounds(), vec!["open.ogg", "hello.ogg"]);
        assert!(engine.is_open());
    }

    #[test]
    fn greeting_uses_structure_sound_options() {
        let (mut engine, scene, clock) = make_engine(json!({
            "greetingsound": "hello.ogg", "greetingdelay": 1, "volume": 0.4,
            "parts": [ { "prefabid": "leaf", "closed": {} } ]
        }));
        engine.set_open(true);
        clock.advance_secs(1.0);
        engine.tick();

        let scene = scene.lock();
        assert_eq!(scene.played_sounds(), vec!["hello.ogg"]);
        let options = scene
            .calls()
            .iter()
            .find_map(|c| match c {
                SceneCall::StartSound { options, .. } => Some(*options),
                _ => None,
            })
            .unwrap();
        assert_eq!(options.volume, 0.4);
    }

    #[test]
    fn supersede_policy_drops_stale_greeting() {
        let config = DoorConfig {
            timer_policy: TimerPolicy::Supersede,
            ..Default::default()
        };
        let (mut engine, scene, clock) = make_engine_with(
            json!({
                "opensound": "open.ogg", "closesound": "close.ogg",
                "greetingsound": "hello.ogg", "greetingdelay": 2,
                "parts": [ { "prefabid": "leaf", "closed": {} } ]
            }),
            config,
            None,
        );
        engine.set_open(true);
        clock.advance_secs(1.0);
        engine.set_open(false);

        clock.advance_secs(1.5);
        engine.tick();
        assert_eq!(scene.lock().played_sounds(), vec!["open.ogg", "close.ogg"]);

        engine.set_open(true);
        clock.advance_secs(2.0);
        engine.tick();
        assert_eq!(
            scene.lock().played_sounds(),
            vec!["open.ogg", "close.ogg", "open.ogg", "hello.ogg"]
        );
    }

    // -----------------------------------------------------------------------
    // Interaction
    // -----------------------------------------------------------------------

    #[test]
    fn handle_click_toggles_open() {
        let (mut engine, _scene, _clock) = make_engine(full_door());
        let handle = engine.part_object(PartKind::Handle).unwrap();
        let user = UserId::new("bob");

        engine.on_click(handle, &user);
        assert!(engine.is_open());
        engine.on_click(handle, &user);
        assert!(!engine.is_open());
    }

    #[test]
    fn clicking_plain_part_does_nothing() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        let frame = scene.lock().instances_of("frame")[0];
        engine.on_click(frame, &UserId::new("bob"));
        assert!(!engine.is_open());
    }

    #[test]
    fn terminal_opens_only_on_exact_password() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        let terminal = engine.part_object(PartKind::Terminal).unwrap();
        let user = UserId::new("carol");

        engine.on_click(terminal, &user);
        let prompted = scene.lock().calls().iter().any(|c| {
            matches!(c, SceneCall::Prompt { user: u, message, secret: true }
                if *u == user && message == "Password:")
        });
        assert!(prompted);

        engine.on_prompt_answer(&user, true, "Sesame");
        assert!(!engine.is_open());

        // A second answer without a new prompt is ignored.
        engine.on_prompt_answer(&user, true, "sesame");
        assert!(!engine.is_open());

        engine.on_click(terminal, &user);
        engine.on_prompt_answer(&user, false, "sesame");
        assert!(!engine.is_open());

        engine.on_click(terminal, &user);
        engine.on_prompt_answer(&user, true, "sesame");
        assert!(engine.is_open());
    }

    // -----------------------------------------------------------------------
    // Proximity registry
    // -----------------------------------------------------------------------

    #[test]
    fn registered_marker_entering_sensor_opens_door() {
        let (mut engine, _scene, _clock) = make_engine(full_door());
        let trigger = engine.trigger().unwrap();
        let marker = ObjectId(900);
        engine.add_user(UserId::new("dave"), marker);
        assert_eq!(engine.user_count(), 1);

        engine.on_trigger_enter(trigger, marker);
        assert!(engine.is_open());
    }

    #[test]
    fn unknown_object_entering_sensor_is_ignored() {
        let (mut engine, _scene, _clock) = make_engine(full_door());
        let trigger = engine.trigger().unwrap();
        let marker = ObjectId(900);
        engine.add_user(UserId::new("dave"), marker);

        engine.on_trigger_enter(trigger, ObjectId(901));
        assert!(!engine.is_open());

        engine.on_trigger_enter(ObjectId(12345), marker);
        assert!(!engine.is_open());

        assert_eq!(engine.remove_user(marker), Some(UserId::new("dave")));
        engine.on_trigger_enter(trigger, marker);
        assert!(!engine.is_open());
    }

    #[test]
    fn proximity_cannot_open_locked_door() {
        let (mut engine, _scene, _clock) = make_engine(full_door());
        let trigger = engine.trigger().unwrap();
        engine.add_user(UserId::new("erin"), ObjectId(900));
        engine.set_locked(true);

        engine.on_trigger_enter(trigger, ObjectId(900));
        assert!(!engine.is_open());
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    #[test]
    fn stopped_releases_every_object() {
        let (mut engine, scene, _clock) = make_engine(full_door());
        engine.add_user(UserId::new("frank"), ObjectId(900));
        engine.set_open(true);

        engine.stopped();

        assert_eq!(scene.lock().live_count(), 0);
        assert!(!engine.is_initialized());
        assert_eq!(engine.user_count(), 0);
        assert_eq!(engine.pending_timers(), 0);
    }
}
