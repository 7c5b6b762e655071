use crate::error::{InputError, SignalingError};
use crate::input::Viewport;
use crate::signaling::SignalingClient;
use crate::transport::DataPipe;
use crate::util::lock;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tether_core::{
    InputEvent, KeyboardEvent, KeyboardEventKind, MouseButton, MouseEvent, MouseEventKind,
    SessionCode, SpecialKey,
};
use tracing::{debug, warn};

/// Fallback path for input events when the direct channel is not open.
pub trait InputRelay: Send + Sync {
    fn is_available(&self) -> bool;

    fn relay(&self, session_id: &SessionCode, event: &InputEvent) -> Result<(), SignalingError>;
}

impl InputRelay for SignalingClient {
    fn is_available(&self) -> bool {
        self.is_connected()
    }

    fn relay(&self, session_id: &SessionCode, event: &InputEvent) -> Result<(), SignalingError> {
        match event {
            InputEvent::Mouse(mouse) => self.send_mouse_event(session_id, *mouse),
            InputEvent::Keyboard(key) => self.send_keyboard_event(session_id, key.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPath {
    Direct,
    Relay,
}

/// Sends semantic input to the host over whichever path is usable right now.
///
/// The path is chosen on every send: the "input" channel when it is open, the
/// signaling relay otherwise. An event whose direct send fails goes to the
/// relay instead of being dropped.
pub struct InputSender {
    direct: Mutex<Option<Arc<dyn DataPipe>>>,
    relay: Arc<dyn InputRelay>,
    session_id: Mutex<Option<SessionCode>>,
    viewport: Mutex<Viewport>,
}

impl InputSender {
    pub fn new(relay: Arc<dyn InputRelay>) -> Self {
        Self {
            direct: Mutex::new(None),
            relay,
            session_id: Mutex::new(None),
            viewport: Mutex::new(Viewport::default()),
        }
    }

    pub fn attach(&self, pipe: Arc<dyn DataPipe>) {
        debug!("Direct input path attached");
        *lock(&self.direct) = Some(pipe);
    }

    pub fn detach(&self) {
        if lock(&self.direct).take().is_some() {
            debug!("Direct input path detached");
        }
    }

    pub fn set_session(&self, session_id: Option<SessionCode>) {
        *lock(&self.session_id) = session_id;
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        *lock(&self.viewport) = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        *lock(&self.viewport)
    }

    /// Whether either path can carry an event.
    pub fn is_ready(&self) -> bool {
        self.open_pipe().is_some() || self.relay_target().is_some()
    }

    fn open_pipe(&self) -> Option<Arc<dyn DataPipe>> {
        lock(&self.direct).clone().filter(|p| p.is_open())
    }

    fn relay_target(&self) -> Option<SessionCode> {
        let session_id = lock(&self.session_id).clone()?;
        self.relay.is_available().then_some(session_id)
    }

    pub async fn send(&self, event: InputEvent) -> Result<InputPath, InputError> {
        if let Some(pipe) = self.open_pipe() {
            let bytes = Bytes::from(event.encode()?);
            match pipe.send_bytes(&bytes).await {
                Ok(()) => return Ok(InputPath::Direct),
                Err(e) => warn!("Direct input send failed, relaying instead: {}", e),
            }
        }

        let session_id = self.relay_target().ok_or(InputError::NoPath)?;
        self.relay.relay(&session_id, &event)?;
        Ok(InputPath::Relay)
    }

    fn pointer(&self, kind: MouseEventKind, x: f64, y: f64) -> MouseEvent {
        let (nx, ny) = self.viewport().normalize(x, y);
        MouseEvent::at(kind, nx, ny)
    }

    pub async fn pointer_down(&self, x: f64, y: f64) -> Result<InputPath, InputError> {
        self.send(self.pointer(MouseEventKind::Down, x, y).into())
            .await
    }

    pub async fn pointer_move(&self, x: f64, y: f64) -> Result<InputPath, InputError> {
        self.send(self.pointer(MouseEventKind::Move, x, y).into())
            .await
    }

    pub async fn pointer_up(&self, x: f64, y: f64) -> Result<InputPath, InputError> {
        self.send(self.pointer(MouseEventKind::Up, x, y).into()).await
    }

    pub async fn click(&self, x: f64, y: f64) -> Result<InputPath, InputError> {
        self.send(self.pointer(MouseEventKind::Click, x, y).into())
            .await
    }

    pub async fn double_click(&self, x: f64, y: f64) -> Result<InputPath, InputError> {
        self.send(self.pointer(MouseEventKind::DoubleClick, x, y).into())
            .await
    }

    pub async fn right_click(&self, x: f64, y: f64) -> Result<InputPath, InputError> {
        let event = self
            .pointer(MouseEventKind::RightClick, x, y)
            .with_button(MouseButton::Right);
        self.send(event.into()).await
    }

    pub async fn wheel(&self, x: f64, y: f64, dx: f64, dy: f64) -> Result<InputPath, InputError> {
        let (ndx, ndy) = self.viewport().normalize_delta(dx, dy);
        let event = self
            .pointer(MouseEventKind::Wheel, x, y)
            .with_delta(ndx, ndy);
        self.send(event.into()).await
    }

    pub async fn swipe(
        &self,
        from: (f64, f64),
        to: (f64, f64),
    ) -> Result<InputPath, InputError> {
        let viewport = self.viewport();
        let (fx, fy) = viewport.normalize(from.0, from.1);
        let (tx, ty) = viewport.normalize(to.0, to.1);
        let event = MouseEvent::at(MouseEventKind::Swipe, fx, fy).with_delta(tx - fx, ty - fy);
        self.send(event.into()).await
    }

    pub async fn key(
        &self,
        kind: KeyboardEventKind,
        key: &str,
        code: &str,
    ) -> Result<InputPath, InputError> {
        let event = KeyboardEvent {
            kind,
            key: key.to_owned(),
            code: code.to_owned(),
        };
        self.send(event.into()).await
    }

    pub async fn key_down(&self, key: &str, code: &str) -> Result<InputPath, InputError> {
        self.key(KeyboardEventKind::Down, key, code).await
    }

    pub async fn key_up(&self, key: &str, code: &str) -> Result<InputPath, InputError> {
        self.key(KeyboardEventKind::Up, key, code).await
    }

    pub async fn key_press(&self, key: &str, code: &str) -> Result<InputPath, InputError> {
        self.key(KeyboardEventKind::Press, key, code).await
    }

    pub async fn special_key(&self, key: SpecialKey) -> Result<InputPath, InputError> {
        self.send(key.event(KeyboardEventKind::Press).into()).await
    }
}
