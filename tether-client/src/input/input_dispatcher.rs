use crate::error::CapabilityError;
use crate::util::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tether_core::{InputEvent, KeyboardEventKind, MouseEvent, MouseEventKind, SpecialKey};
use tracing::debug;

/// Pointer travel, in normalized units, below which a down/up pair is a tap.
const TAP_SLOP: f64 = 0.02;
const DEFAULT_SWIPE: Duration = Duration::from_millis(300);
const MIN_SWIPE: Duration = Duration::from_millis(50);
const MAX_SWIPE: Duration = Duration::from_millis(2000);

/// Platform input injection on the host. Coordinates are normalized.
pub trait RemoteInputCapability: Send + Sync {
    fn is_service_enabled(&self) -> bool;

    fn perform_tap(&self, x: f64, y: f64) -> Result<(), CapabilityError>;

    fn perform_long_press(&self, x: f64, y: f64) -> Result<(), CapabilityError>;

    fn perform_swipe(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        duration: Duration,
    ) -> Result<(), CapabilityError>;

    fn perform_scroll(&self, x: f64, y: f64, dx: f64, dy: f64) -> Result<(), CapabilityError>;

    fn perform_global_action(&self, action: &str) -> Result<(), CapabilityError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Performed,
    /// Part of a gesture that completes on a later event.
    Pending,
    Ignored,
}

struct Gesture {
    start: (f64, f64),
    moved: bool,
    started_at: Instant,
}

/// Turns inbound semantic events into capability calls while remote control is on.
pub struct InputDispatcher {
    capability: Arc<dyn RemoteInputCapability>,
    remote_control: AtomicBool,
    gesture: Mutex<Option<Gesture>>,
}

impl InputDispatcher {
    pub fn new(capability: Arc<dyn RemoteInputCapability>) -> Self {
        Self {
            capability,
            remote_control: AtomicBool::new(false),
            gesture: Mutex::new(None),
        }
    }

    pub fn set_remote_control(&self, enabled: bool) {
        debug!(enabled, "Remote control toggled");
        self.remote_control.store(enabled, Ordering::SeqCst);
        if !enabled {
            lock(&self.gesture).take();
        }
    }

    pub fn is_remote_control_enabled(&self) -> bool {
        self.remote_control.load(Ordering::SeqCst)
    }

    pub fn dispatch(&self, event: &InputEvent) -> Result<Dispatched, CapabilityError> {
        if !self.is_remote_control_enabled() {
            return Ok(Dispatched::Ignored);
        }
        if !self.capability.is_service_enabled() {
            return Err(CapabilityError::PermissionDenied(
                "input injection service is not enabled".into(),
            ));
        }

        match event {
            InputEvent::Mouse(mouse) => self.pointer(mouse),
            InputEvent::Keyboard(key) => {
                if key.kind == KeyboardEventKind::Up {
                    return Ok(Dispatched::Ignored);
                }
                match SpecialKey::from_key(&key.key).and_then(|k| k.global_action()) {
                    Some(action) => {
                        self.capability.perform_global_action(action)?;
                        Ok(Dispatched::Performed)
                    }
                    None => Ok(Dispatched::Ignored),
                }
            }
        }
    }

    fn pointer(&self, event: &MouseEvent) -> Result<Dispatched, CapabilityError> {
        let cap = &self.capability;
        let at = (event.x, event.y);

        match event.kind {
            MouseEventKind::Down => {
                *lock(&self.gesture) = Some(Gesture {
                    start: at,
                    moved: false,
                    started_at: Instant::now(),
                });
                return Ok(Dispatched::Pending);
            }
            MouseEventKind::Move => {
                if let Some(gesture) = lock(&self.gesture).as_mut() {
                    gesture.moved |= distance(gesture.start, at) > TAP_SLOP;
                    return Ok(Dispatched::Pending);
                }
                return Ok(Dispatched::Ignored);
            }
            MouseEventKind::Up => {
                let Some(gesture) = lock(&self.gesture).take() else {
                    return Ok(Dispatched::Ignored);
                };
                if gesture.moved || distance(gesture.start, at) > TAP_SLOP {
                    let duration = gesture.started_at.elapsed().clamp(MIN_SWIPE, MAX_SWIPE);
                    cap.perform_swipe(gesture.start, at, duration)?;
                } else {
                    cap.perform_tap(at.0, at.1)?;
                }
            }
            MouseEventKind::Click => cap.perform_tap(at.0, at.1)?,
            MouseEventKind::DoubleClick => {
                cap.perform_tap(at.0, at.1)?;
                cap.perform_tap(at.0, at.1)?;
            }
            MouseEventKind::RightClick => cap.perform_long_press(at.0, at.1)?,
            MouseEventKind::Wheel => cap.perform_scroll(at.0, at.1, event.delta_x, event.delta_y)?,
            MouseEventKind::Swipe => {
                let to = (
                    (event.x + event.delta_x).clamp(0.0, 1.0),
                    (event.y + event.delta_y).clamp(0.0, 1.0),
                );
                cap.perform_swipe(at, to, DEFAULT_SWIPE)?;
            }
        }
        Ok(Dispatched::Performed)
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
