use crate::rendezvous::generate_code;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tether_core::{
    ClientSignal, IceServerConfig, PeerId, ServerSignal, SessionCode, SignalErrorCode,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct Session {
    host: PeerId,
    guest: Option<PeerId>,
    platform: String,
}

impl Session {
    fn other(&self, peer: PeerId) -> Option<PeerId> {
        if self.host == peer {
            self.guest
        } else {
            Some(self.host)
        }
    }
}

struct RendezvousInner {
    peers: DashMap<PeerId, mpsc::UnboundedSender<ServerSignal>>,
    sessions: DashMap<SessionCode, Session>,
    membership: DashMap<PeerId, SessionCode>,
    ice_servers: Vec<IceServerConfig>,
}

/// In-process client link: what a participant writes and what it is sent.
pub struct LocalLink {
    pub peer_id: PeerId,
    pub outgoing: mpsc::UnboundedSender<ClientSignal>,
    pub incoming: mpsc::UnboundedReceiver<ServerSignal>,
}

/// Pairs one host and at most one guest per session code and relays between them.
#[derive(Clone)]
pub struct RendezvousService {
    inner: Arc<RendezvousInner>,
}

impl RendezvousService {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(RendezvousInner {
                peers: DashMap::new(),
                sessions: DashMap::new(),
                membership: DashMap::new(),
                ice_servers,
            }),
        }
    }

    pub fn get_ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn session_of(&self, peer: PeerId) -> Option<SessionCode> {
        self.inner.membership.get(&peer).map(|c| c.value().clone())
    }

    /// Registers a new participant and greets it with `welcome` then `iceConfig`.
    pub fn attach(&self, tx: mpsc::UnboundedSender<ServerSignal>) -> PeerId {
        let peer_id = PeerId::new();
        self.inner.peers.insert(peer_id, tx);
        info!(peer = %peer_id, "Participant attached");

        self.send_signal(peer_id, ServerSignal::Welcome { peer_id });
        self.send_signal(
            peer_id,
            ServerSignal::IceConfig {
                ice_servers: self.get_ice_servers(),
            },
        );
        peer_id
    }

    /// Forgets a participant and tells the other member of its session.
    pub fn detach(&self, peer: PeerId) {
        self.inner.peers.remove(&peer);
        info!(peer = %peer, "Participant detached");

        let Some((_, code)) = self.inner.membership.remove(&peer) else {
            return;
        };
        let is_host = self.inner.sessions.get(&code).map(|s| s.host == peer);

        match is_host {
            Some(true) => {
                if let Some((_, session)) = self.inner.sessions.remove(&code) {
                    info!(session = %code, "Host left; session closed");
                    if let Some(guest) = session.guest {
                        self.inner.membership.remove(&guest);
                        self.send_signal(guest, ServerSignal::HostDisconnected);
                    }
                }
            }
            Some(false) => {
                let host = self.inner.sessions.get_mut(&code).map(|mut s| {
                    s.guest = None;
                    s.host
                });
                if let Some(host) = host {
                    info!(session = %code, "Guest left; session stays open");
                    self.send_signal(host, ServerSignal::GuestLeft { guest_id: peer });
                }
            }
            None => {}
        }
    }

    pub fn handle(&self, peer: PeerId, signal: ClientSignal) {
        match signal {
            ClientSignal::CreateSession { platform } => self.create_session(peer, platform),
            ClientSignal::JoinSession { code } => self.join_session(peer, &code),
            ClientSignal::EndSession { session_id } => self.end_session(peer, &session_id),
            other => self.relay(peer, other),
        }
    }

    /// Attaches an in-process participant. Dropping `outgoing` detaches it.
    pub fn connect_local(&self) -> LocalLink {
        let (server_tx, incoming) = mpsc::unbounded_channel();
        let (outgoing, mut client_rx) = mpsc::unbounded_channel::<ClientSignal>();
        let peer_id = self.attach(server_tx);

        let service = self.clone();
        tokio::spawn(async move {
            while let Some(signal) = client_rx.recv().await {
                service.handle(peer_id, signal);
            }
            service.detach(peer_id);
        });

        LocalLink {
            peer_id,
            outgoing,
            incoming,
        }
    }

    pub fn send_signal(&self, peer: PeerId, msg: ServerSignal) {
        if let Some(tx) = self.inner.peers.get(&peer) {
            if tx.send(msg).is_err() {
                debug!(peer = %peer, "Participant link already closed");
            }
        } else {
            warn!(peer = %peer, "Attempted to send signal to disconnected participant");
        }
    }

    fn reject(&self, peer: PeerId, code: SignalErrorCode, message: &str) {
        debug!(peer = %peer, ?code, "{}", message);
        self.send_signal(
            peer,
            ServerSignal::Error {
                code,
                message: message.to_owned(),
            },
        );
    }

    fn create_session(&self, peer: PeerId, platform: String) {
        if self.inner.membership.contains_key(&peer) {
            return self.reject(peer, SignalErrorCode::BadRequest, "already in a session");
        }

        let code = loop {
            let code = generate_code();
            if let Entry::Vacant(slot) = self.inner.sessions.entry(code.clone()) {
                slot.insert(Session {
                    host: peer,
                    guest: None,
                    platform,
                });
                break code;
            }
        };
        self.inner.membership.insert(peer, code.clone());

        info!(session = %code, host = %peer, "Session created");
        self.send_signal(peer, ServerSignal::SessionCreated { session_id: code });
    }

    fn join_session(&self, peer: PeerId, raw_code: &str) {
        let Ok(code) = SessionCode::parse(raw_code) else {
            return self.reject(peer, SignalErrorCode::JoinFailed, "invalid session code");
        };
        if self.inner.membership.contains_key(&peer) {
            return self.reject(peer, SignalErrorCode::JoinFailed, "already in a session");
        }

        let joined = match self.inner.sessions.get_mut(&code) {
            None => Err("session not found"),
            Some(session) if session.guest.is_some() => Err("session is full"),
            Some(mut session) => {
                session.guest = Some(peer);
                debug!(session = %code, platform = %session.platform, "Guest admitted");
                Ok(session.host)
            }
        };

        match joined {
            Ok(host) => {
                self.inner.membership.insert(peer, code.clone());
                info!(session = %code, guest = %peer, "Guest joined");
                self.send_signal(
                    peer,
                    ServerSignal::SessionJoined {
                        session_id: code,
                        host_id: host,
                    },
                );
                self.send_signal(host, ServerSignal::GuestJoined { guest_id: peer });
            }
            Err(reason) => self.reject(peer, SignalErrorCode::JoinFailed, reason),
        }
    }

    fn end_session(&self, peer: PeerId, session_id: &SessionCode) {
        if !self.is_member(peer, session_id) {
            return self.reject(peer, SignalErrorCode::NotInSession, "not in that session");
        }
        let Some((_, session)) = self.inner.sessions.remove(session_id) else {
            return;
        };

        self.inner.membership.remove(&session.host);
        if let Some(guest) = session.guest {
            self.inner.membership.remove(&guest);
        }
        info!(session = %session_id, "Session ended");

        if let Some(other) = session.other(peer) {
            self.send_signal(other, ServerSignal::SessionEnded);
        }
    }

    fn is_member(&self, peer: PeerId, session_id: &SessionCode) -> bool {
        self.inner
            .membership
            .get(&peer)
            .is_some_and(|c| c.value() == session_id)
    }

    fn relay(&self, peer: PeerId, signal: ClientSignal) {
        let Some(session_id) = signal.session_id().cloned() else {
            return;
        };
        if !self.is_member(peer, &session_id) {
            return self.reject(peer, SignalErrorCode::NotInSession, "not in that session");
        }
        let Some(target) = self
            .inner
            .sessions
            .get(&session_id)
            .and_then(|s| s.other(peer))
        else {
            debug!(session = %session_id, "No counterpart yet; dropping relayed frame");
            return;
        };

        let forwarded = match signal {
            ClientSignal::Offer { sdp, .. } => ServerSignal::Offer { sdp },
            ClientSignal::Answer { sdp, .. } => ServerSignal::Answer { sdp },
            ClientSignal::IceCandidate { candidate, .. } => ServerSignal::IceCandidate { candidate },
            ClientSignal::MouseEvent { event, .. } => ServerSignal::MouseEvent { event },
            ClientSignal::KeyboardEvent { event, .. } => ServerSignal::KeyboardEvent { event },
            ClientSignal::EnableRemoteControl { .. } => {
                ServerSignal::RemoteControl { enabled: true }
            }
            ClientSignal::DisableRemoteControl { .. } => {
                ServerSignal::RemoteControl { enabled: false }
            }
            ClientSignal::CreateSession { .. }
            | ClientSignal::JoinSession { .. }
            | ClientSignal::EndSession { .. } => return,
        };
        self.send_signal(target, forwarded);
    }
}
