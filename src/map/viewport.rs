use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::events::ViewEvent;
use crate::map::widget::{CameraSurface, CameraTarget};
use crate::models::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPhase {
    Idle,
    /// Waiting for the settle delay to elapse after the last idle event
    Settling,
}

/// Sole owner of the widget camera.
///
/// Turns bursts of widget idle events into a single debounced bounds
/// change, and issues programmatic camera moves while swallowing the idle
/// event each move produces.
pub struct ViewportBridge {
    events: UnboundedSender<ViewEvent>,
    settle_delay: Duration,
    epsilon: f64,
    phase: CameraPhase,
    previous_bounds: Option<Viewport>,
    /// Idle events still owed by the widget for commands the bridge issued
    pending_self_idles: u32,
    settle_generation: u64,
    settle_timer: Option<JoinHandle<()>>,
    parked: Option<CameraTarget>,
    ready: bool,
}

impl ViewportBridge {
    pub fn new(events: UnboundedSender<ViewEvent>, settle_delay: Duration, epsilon: f64) -> Self {
        Self {
            events,
            settle_delay,
            epsilon,
            phase: CameraPhase::Idle,
            previous_bounds: None,
            pending_self_idles: 0,
            settle_generation: 0,
            settle_timer: None,
            parked: None,
            ready: false,
        }
    }

    pub fn phase(&self) -> CameraPhase {
        self.phase
    }

    pub fn previous_bounds(&self) -> Option<Viewport> {
        self.previous_bounds
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn pending_self_idles(&self) -> u32 {
        self.pending_self_idles
    }

    /// The widget finished loading. Its first idle event is the initial
    /// layout, not a user gesture, so it is swallowed.
    pub fn mark_ready(&mut self, camera: &mut impl CameraSurface) {
        if self.ready {
            return;
        }
        self.ready = true;
        self.previous_bounds = camera.bounds();
        self.pending_self_idles += 1;

        if let Some(target) = self.parked.take() {
            debug!("Flushing camera move parked before the widget was ready");
            self.move_camera_to(camera, target);
        }
    }

    pub fn on_camera_idle(&mut self, camera: &impl CameraSurface) {
        if !self.ready {
            return;
        }

        if self.pending_self_idles > 0 {
            self.pending_self_idles -= 1;
            // The camera now rests where the last command put it
            if let Some(bounds) = camera.bounds() {
                self.previous_bounds = Some(bounds);
            }
            debug!("Swallowed self-triggered camera idle");
            return;
        }

        self.restart_settle_timer();
    }

    /// Settle delay elapsed: report the new bounds if they moved materially.
    pub fn on_settle_elapsed(
        &mut self,
        generation: u64,
        camera: &impl CameraSurface,
    ) -> Option<Viewport> {
        if generation != self.settle_generation || self.phase != CameraPhase::Settling {
            debug!("Ignoring superseded settle timer #{}", generation);
            return None;
        }
        self.phase = CameraPhase::Idle;
        self.settle_timer = None;

        let bounds = camera.bounds()?;
        if let Some(previous) = self.previous_bounds {
            if !bounds.differs_from(&previous, self.epsilon) {
                debug!("Camera settled within {}° of previous bounds", self.epsilon);
                return None;
            }
        }

        self.previous_bounds = Some(bounds);
        Some(bounds)
    }

    /// The only sanctioned way to move the camera programmatically.
    pub fn move_camera_to(&mut self, camera: &mut impl CameraSurface, target: CameraTarget) {
        if !self.ready {
            self.parked = Some(target);
            return;
        }

        if let CameraTarget::FitBounds { bounds, .. } = target {
            if camera.bounds() == Some(bounds) {
                // No motion means no idle event to swallow
                return;
            }
        }

        self.cancel_settle_timer();
        self.pending_self_idles += 1;

        match target {
            CameraTarget::FitBounds { bounds, padding } => {
                debug!("Fitting camera to {:?}", bounds);
                camera.fit_bounds(bounds, padding);
            }
            CameraTarget::CenterAndZoom { center, zoom } => {
                debug!("Centering camera on {:?} at zoom {}", center, zoom);
                camera.set_center(center);
                camera.set_zoom(zoom);
            }
        }
    }

    fn restart_settle_timer(&mut self) {
        self.cancel_settle_timer();
        self.settle_generation += 1;
        self.phase = CameraPhase::Settling;

        let generation = self.settle_generation;
        let deadline = Instant::now() + self.settle_delay;
        let events = self.events.clone();
        self.settle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = events.send(ViewEvent::SettleElapsed { generation });
        }));
    }

    fn cancel_settle_timer(&mut self) {
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
        self.phase = CameraPhase::Idle;
    }
}

impl Drop for ViewportBridge {
    fn drop(&mut self) {
        self.cancel_settle_timer();
    }
}
