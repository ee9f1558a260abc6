//! Door Engine
//!
//! Declarative, animated doors for a shared real-time 3D scene.
//!
//! ## Architecture
//!
//! ```text
//! DoorDriver  (driver.rs)          ← tokio tick loop + event queue
//!   └── AutomaticDoorApplet  (applet.rs)  ← per-user proximity markers
//!         └── DoorEngine  (engine.rs)     ← open/locked state machine
//!               ├── PartTree  (structure.rs)
//!               ├── TimerQueue  (timer.rs)
//!               └── dyn Scene  (scene.rs)
//! StructureCache  (cache.rs)  ← shared, deduplicated document loads
//! ```
//!
//! A door's JSON description ([`document`]) is loaded through the
//! [`StructureCache`], normalized once into a [`DoorStructure`], and handed
//! to a [`DoorEngine`] which instantiates it into the scene.

// Document and runtime types are always available.
pub mod applet;
pub mod cache;
pub mod clock;
pub mod document;
pub mod engine;
pub mod error;
pub mod scene;
pub mod structure;
pub mod timer;
pub mod types;

// The tokio driver requires the `server` feature.
#[cfg(feature = "server")]
pub mod driver;

pub use applet::AutomaticDoorApplet;
pub use cache::{Fetcher, StructureCache};
#[cfg(feature = "server")]
pub use cache::HttpFetcher;
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{DoorSource, RawDoorPart, RawDoorStructure};
#[cfg(feature = "server")]
pub use driver::DoorDriver;
pub use engine::DoorEngine;
pub use error::{DoorError, LoadError};
pub use scene::{HeadlessScene, Scene, SceneEvent, SharedScene};
pub use structure::{DoorPart, DoorStructure, PartKind, PartTree};
pub use types::{DoorConfig, ObjectId, TimerPolicy, Transform, UserId, Vec3};
