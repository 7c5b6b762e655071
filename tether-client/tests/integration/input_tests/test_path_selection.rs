use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tether_client::InputError;
use tether_client::SignalingError;
use tether_client::input::{InputPath, InputRelay, InputSender, Viewport};
use tether_client::transport::PipeMessage;
use tether_core::{ChannelLabel, InputEvent, MouseEventKind, SessionCode, SpecialKey};

use crate::integration::init_tracing;
use crate::utils::MemoryPipe;

#[derive(Default)]
struct RecordingRelay {
    available: AtomicBool,
    relayed: Mutex<Vec<InputEvent>>,
}

impl RecordingRelay {
    fn available() -> Arc<Self> {
        let relay = Self::default();
        relay.available.store(true, Ordering::SeqCst);
        Arc::new(relay)
    }

    fn relayed(&self) -> Vec<InputEvent> {
        self.relayed.lock().unwrap().clone()
    }
}

impl InputRelay for RecordingRelay {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn relay(&self, _session_id: &SessionCode, event: &InputEvent) -> Result<(), SignalingError> {
        self.relayed.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn session() -> Option<SessionCode> {
    SessionCode::parse("AB12CD34").ok()
}

fn decode(message: PipeMessage) -> InputEvent {
    match message {
        PipeMessage::Binary(bytes) => InputEvent::decode(&bytes).unwrap(),
        other => panic!("expected binary input, got {:?}", other),
    }
}

#[tokio::test]
async fn test_open_channel_carries_events_in_order() {
    init_tracing();
    let relay = RecordingRelay::available();
    let sender = InputSender::new(relay.clone());
    let (pipe, mut rx) = MemoryPipe::new(ChannelLabel::Input);
    sender.attach(pipe);
    sender.set_session(session());

    for x in [0.1, 0.2, 0.3] {
        assert_eq!(sender.pointer_move(x, 0.5).await.unwrap(), InputPath::Direct);
    }

    for x in [0.1, 0.2, 0.3] {
        match decode(rx.recv().await.unwrap()) {
            InputEvent::Mouse(m) => {
                assert_eq!(m.kind, MouseEventKind::Move);
                assert_eq!(m.x, x);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert!(relay.relayed().is_empty());
}

#[tokio::test]
async fn test_closed_channel_falls_back_to_relay() {
    init_tracing();
    let relay = RecordingRelay::available();
    let sender = InputSender::new(relay.clone());
    let (pipe, _rx) = MemoryPipe::new(ChannelLabel::Input);
    sender.attach(pipe.clone());
    sender.set_session(session());

    pipe.close();
    let path = sender.special_key(SpecialKey::Back).await.unwrap();

    assert_eq!(path, InputPath::Relay);
    assert!(matches!(relay.relayed()[0], InputEvent::Keyboard(ref k) if k.key == SpecialKey::Back.key()));
}

#[tokio::test]
async fn test_failed_direct_send_is_relayed_not_dropped() {
    init_tracing();
    let relay = RecordingRelay::available();
    let sender = InputSender::new(relay.clone());
    let (pipe, mut rx) = MemoryPipe::new(ChannelLabel::Input);
    sender.attach(pipe.clone());
    sender.set_session(session());

    pipe.set_failing(true);
    let path = sender.click(0.5, 0.5).await.unwrap();

    assert_eq!(path, InputPath::Relay);
    assert_eq!(relay.relayed().len(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_no_path_is_an_error() {
    init_tracing();
    let relay = Arc::new(RecordingRelay::default());
    let sender = InputSender::new(relay.clone());
    sender.set_session(session());

    assert!(!sender.is_ready());
    let err = sender.pointer_down(0.1, 0.1).await.unwrap_err();
    assert!(matches!(err, InputError::NoPath));

    // An available relay is still useless without a session to address.
    relay.available.store(true, Ordering::SeqCst);
    sender.set_session(None);
    assert!(matches!(
        sender.pointer_down(0.1, 0.1).await,
        Err(InputError::NoPath)
    ));
}

#[tokio::test]
async fn test_coordinates_are_normalized_by_viewport() {
    init_tracing();
    let sender = InputSender::new(RecordingRelay::available());
    let (pipe, mut rx) = MemoryPipe::new(ChannelLabel::Input);
    sender.attach(pipe);
    sender.set_viewport(Viewport::new(200.0, 100.0).with_origin(100.0, 0.0));

    sender.pointer_move(150.0, 25.0).await.unwrap();
    sender.pointer_move(1000.0, -5.0).await.unwrap();

    match decode(rx.recv().await.unwrap()) {
        InputEvent::Mouse(m) => assert_eq!((m.x, m.y), (0.25, 0.25)),
        other => panic!("unexpected {:?}", other),
    }
    match decode(rx.recv().await.unwrap()) {
        InputEvent::Mouse(m) => assert_eq!((m.x, m.y), (1.0, 0.0)),
        other => panic!("unexpected {:?}", other),
    }
}
