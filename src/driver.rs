//! DoorDriver – runs an applet on a tokio runtime.
//!
//! ## Responsibilities
//!
//! | Step        | Effect                                                      |
//! |-------------|-------------------------------------------------------------|
//! | `start`     | awaits the structure load, then instantiates the door       |
//! | tick loop   | fires due door timers at `tick_rate_hz`                     |
//! | event queue | applies [`SceneEvent`]s sent through [`DoorDriver::events`] |
//! | shutdown    | releases every scene object via `stopped`                   |
//!
//! Everything runs on one task, so events and timers never interleave
//! inside a single state change.

use crate::applet::AutomaticDoorApplet;
use crate::cache::StructureCache;
use crate::document::DoorSource;
use crate::error::DoorError;
use crate::scene::SceneEvent;
use log::{error, info};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct DoorDriver {
    applet: Arc<Mutex<AutomaticDoorApplet>>,
    cache: Arc<StructureCache>,
    tick_rate_hz: f32,
    events_tx: mpsc::UnboundedSender<SceneEvent>,
    events_rx: mpsc::UnboundedReceiver<SceneEvent>,
}

impl DoorDriver {
    pub fn new(
        applet: Arc<Mutex<AutomaticDoorApplet>>,
        cache: Arc<StructureCache>,
        tick_rate_hz: f32,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            applet,
            cache,
            tick_rate_hz,
            events_tx,
            events_rx,
        }
    }

    pub fn applet(&self) -> &Arc<Mutex<AutomaticDoorApplet>> {
        &self.applet
    }

    /// Sender for scene callbacks; events are applied by [`DoorDriver::run`].
    pub fn events(&self) -> mpsc::UnboundedSender<SceneEvent> {
        self.events_tx.clone()
    }

    /// Load the door's structure and instantiate it.
    ///
    /// On failure the door stays uninitialized; the error is returned for
    /// the caller to surface.
    pub async fn start(&self, source: &DoorSource) -> Result<(), DoorError> {
        let structure = self.cache.load(source).await.map_err(|e| {
            error!("Door structure load failed: {}", e);
            e
        })?;
        self.applet.lock().started(structure)
    }

    /// Tick timers and apply events until `shutdown` resolves, then stop.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let interval = std::time::Duration::from_secs_f32(1.0 / self.tick_rate_hz.max(1.0));
        let mut timer = tokio::time::interval(interval);
        tokio::pin!(shutdown);

        info!("DoorDriver active – ticking at {:.0}Hz", self.tick_rate_hz);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.applet.lock().tick();
                }
                Some(event) = self.events_rx.recv() => {
                    self.applet.lock().handle_event(event);
                }
                _ = &mut shutdown => {
                    info!("DoorDriver shutting down");
                    break;
                }
            }
        }

        self.applet.lock().stopped();
    }
}
