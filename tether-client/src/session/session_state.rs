use crate::error::{SessionError, SignalingError};
use crate::observer::{Observers, Subscription};
use crate::session::{HistoryStore, SessionRecord};
use crate::signaling::{SignalingClient, SignalingEvent};
use crate::util::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::{PeerId, Role, SessionCode};
use tracing::{debug, info, warn};

/// Snapshot of the current session. All fields are unset while idle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub is_active: bool,
    pub role: Option<Role>,
    pub session_id: Option<SessionCode>,
    pub peer_id: Option<PeerId>,
    pub is_screen_sharing: bool,
    pub is_connected: bool,
}

impl SessionState {
    fn active(role: Role, session_id: SessionCode, peer_id: Option<PeerId>) -> Self {
        Self {
            is_active: true,
            role: Some(role),
            session_id: Some(session_id),
            peer_id,
            is_screen_sharing: false,
            is_connected: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub previous: SessionState,
    pub next: SessionState,
}

#[derive(Default)]
struct Tracked {
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    /// Role of the create or join request still waiting for its reply.
    requested: Option<Role>,
}

struct MachineInner {
    tracked: Mutex<Tracked>,
    observers: Observers<SessionChange>,
    signaling: SignalingClient,
    history: Arc<dyn HistoryStore>,
    platform: String,
    create_timeout: Duration,
    join_timeout: Duration,
}

/// The single source of truth for "is there a session, and what is my part in it".
///
/// Lives as long as the application, independent of any screen. Listeners are
/// notified after the state lock is released, so they may call back into the
/// machine from their callback.
#[derive(Clone)]
pub struct SessionStateMachine {
    inner: Arc<MachineInner>,
}

impl SessionStateMachine {
    pub fn new(
        signaling: SignalingClient,
        history: Arc<dyn HistoryStore>,
        platform: impl Into<String>,
        create_timeout: Duration,
        join_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(MachineInner {
                tracked: Mutex::new(Tracked::default()),
                observers: Observers::new(),
                signaling,
                history,
                platform: platform.into(),
                create_timeout,
                join_timeout,
            }),
        }
    }

    pub fn get_state(&self) -> SessionState {
        lock(&self.inner.tracked).state.clone()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner.tracked).state.is_active
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionChange) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(listener)
    }

    /// Hosts a new session; resolves with its code once the state shows it.
    pub async fn create_session(&self) -> Result<SessionCode, SessionError> {
        self.begin_request(Role::Host)?;

        let timeout = self.inner.create_timeout;
        let work = async {
            self.inner.signaling.connect().await?;
            let code = self
                .inner
                .signaling
                .create_session(&self.inner.platform)
                .await?;
            if !self.activate(Role::Host, code.clone(), None) {
                return Err(SessionError::NotActive);
            }
            Ok(code)
        };

        let result = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Session was not created within {:?}", timeout);
                Err(SessionError::Timeout(timeout))
            }
        };
        self.finish_request(Role::Host);
        result
    }

    /// Joins an existing session by its code, with or without the dash.
    pub async fn join_session(&self, code: &str) -> Result<SessionCode, SessionError> {
        if self.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        let code = SessionCode::parse(code).map_err(SignalingError::from)?;
        self.begin_request(Role::Guest)?;

        let timeout = self.inner.join_timeout;
        let work = async {
            self.inner.signaling.connect().await?;
            let (session_id, host_id) = self.inner.signaling.join_session(&code).await?;
            if !self.activate(Role::Guest, session_id.clone(), Some(host_id)) {
                return Err(SessionError::NotActive);
            }
            Ok(session_id)
        };

        let result = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Session was not joined within {:?}", timeout);
                Err(SessionError::Timeout(timeout))
            }
        };
        self.finish_request(Role::Guest);
        result
    }

    /// Ends the current session. Calling it while idle does nothing.
    pub fn end_session(&self) {
        let session_id = {
            let mut tracked = lock(&self.inner.tracked);
            tracked.requested = None;
            tracked.state.session_id.clone()
        };
        let Some(session_id) = session_id else {
            return;
        };
        if let Err(e) = self.inner.signaling.end_session(&session_id) {
            warn!(session = %session_id, "Could not notify rendezvous of session end: {}", e);
        }
        self.deactivate("ended locally");
    }

    pub fn set_screen_sharing(&self, sharing: bool) {
        self.update(|tracked| {
            if tracked.state.is_active {
                tracked.state.is_screen_sharing = sharing;
            }
        });
    }

    pub fn set_webrtc_connected(&self, connected: bool) {
        self.update(|tracked| {
            if tracked.state.is_active {
                tracked.state.is_connected = connected;
            }
        });
    }

    /// Folds a signaling lifecycle event into the state.
    ///
    /// Session replies only activate while their request is outstanding, so a
    /// reply still queued after `end_session` cannot revive the session.
    pub fn apply(&self, event: &SignalingEvent) {
        match event {
            SignalingEvent::SessionCreated(code) => {
                self.activate(Role::Host, code.clone(), None);
            }
            SignalingEvent::SessionJoined {
                session_id,
                host_id,
            } => {
                self.activate(Role::Guest, session_id.clone(), Some(*host_id));
            }
            SignalingEvent::GuestJoined(guest_id) => self.update(|tracked| {
                if tracked.state.role == Some(Role::Host) {
                    tracked.state.peer_id = Some(*guest_id);
                }
            }),
            SignalingEvent::GuestLeft(guest_id) => self.update(|tracked| {
                if tracked.state.peer_id == Some(*guest_id) {
                    tracked.state.peer_id = None;
                    tracked.state.is_connected = false;
                }
            }),
            SignalingEvent::HostDisconnected => self.deactivate("host disconnected"),
            SignalingEvent::SessionEnded => self.deactivate("ended by peer"),
            _ => {}
        }
    }

    /// Whether `session_id` is the live session and this side plays `role` in it.
    pub fn is_current(&self, role: Role, session_id: &SessionCode) -> bool {
        let tracked = lock(&self.inner.tracked);
        tracked.state.role == Some(role) && tracked.state.session_id.as_ref() == Some(session_id)
    }

    fn begin_request(&self, role: Role) -> Result<(), SessionError> {
        let mut tracked = lock(&self.inner.tracked);
        if tracked.state.is_active {
            return Err(SessionError::AlreadyActive);
        }
        tracked.requested = Some(role);
        Ok(())
    }

    fn finish_request(&self, role: Role) {
        let mut tracked = lock(&self.inner.tracked);
        if tracked.requested == Some(role) {
            tracked.requested = None;
        }
    }

    /// Returns false when the reply no longer belongs to an outstanding request.
    fn activate(&self, role: Role, session_id: SessionCode, peer_id: Option<PeerId>) -> bool {
        let mut activated = false;
        self.update(|tracked| {
            let state = &mut tracked.state;
            if state.role == Some(role) && state.session_id.as_ref() == Some(&session_id) {
                if peer_id.is_some() {
                    state.peer_id = peer_id;
                }
                activated = true;
                return;
            }
            if tracked.requested != Some(role) {
                debug!(session = %session_id, ?role, "Ignoring reply to a settled request");
                return;
            }
            info!(session = %session_id, ?role, "Session active");
            tracked.requested = None;
            tracked.state = SessionState::active(role, session_id, peer_id);
            tracked.started_at = Some(Utc::now());
            activated = true;
        });
        activated
    }

    fn deactivate(&self, reason: &str) {
        let mut finished = None;
        self.update(|tracked| {
            if !tracked.state.is_active {
                return;
            }
            info!(reason, "Session over");
            let previous = std::mem::take(&mut tracked.state);
            if let (Some(start), Some(session_id), Some(role)) =
                (tracked.started_at.take(), previous.session_id, previous.role)
            {
                finished = Some(SessionRecord::new(
                    session_id,
                    role,
                    start,
                    Utc::now(),
                    previous.peer_id,
                ));
            }
        });

        if let Some(record) = finished {
            self.persist(record);
        }
    }

    fn persist(&self, record: SessionRecord) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available; session history record dropped");
            return;
        };
        let history = self.inner.history.clone();
        runtime.spawn(async move {
            let session_id = record.session_id.clone();
            match history.append(record).await {
                Ok(()) => debug!(session = %session_id, "Session history recorded"),
                Err(e) => warn!(session = %session_id, "Failed to record session history: {}", e),
            }
        });
    }

    /// Mutates under the lock, then notifies outside it if anything changed.
    fn update(&self, mutate: impl FnOnce(&mut Tracked)) {
        let change = {
            let mut tracked = lock(&self.inner.tracked);
            let previous = tracked.state.clone();
            mutate(&mut tracked);
            (previous != tracked.state).then(|| SessionChange {
                previous,
                next: tracked.state.clone(),
            })
        };

        if let Some(change) = change {
            self.inner.observers.notify(&change);
        }
    }
}
