use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseEventKind {
    Down,
    Move,
    Up,
    Click,
    DoubleClick,
    RightClick,
    Wheel,
    Swipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

/// Pointer event in normalized coordinates: `x`, `y` in `[0, 1]` relative to the
/// sender's viewport, deltas scaled by the same viewport.
///
/// For `Swipe` the deltas are the displacement from the start point, for `Wheel`
/// they are the scroll amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MouseEvent {
    #[serde(rename = "type")]
    pub kind: MouseEventKind,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub button: MouseButton,
    #[serde(default)]
    pub delta_x: f64,
    #[serde(default)]
    pub delta_y: f64,
}

impl MouseEvent {
    pub fn at(kind: MouseEventKind, x: f64, y: f64) -> Self {
        Self {
            kind,
            x,
            y,
            button: MouseButton::Left,
            delta_x: 0.0,
            delta_y: 0.0,
        }
    }

    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }

    pub fn with_delta(mut self, delta_x: f64, delta_y: f64) -> Self {
        self.delta_x = delta_x;
        self.delta_y = delta_y;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyboardEventKind {
    Down,
    Up,
    Press,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardEvent {
    #[serde(rename = "type")]
    pub kind: KeyboardEventKind,
    pub key: String,
    pub code: String,
}

#[derive(Debug, Error)]
#[error("input event codec: {0}")]
pub struct InputCodecError(#[from] postcard::Error);

/// Semantic input event carried on the "input" channel (postcard) or relayed
/// through signaling (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Mouse(MouseEvent),
    Keyboard(KeyboardEvent),
}

impl InputEvent {
    pub fn encode(&self) -> Result<Vec<u8>, InputCodecError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, InputCodecError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

impl From<MouseEvent> for InputEvent {
    fn from(event: MouseEvent) -> Self {
        Self::Mouse(event)
    }
}

impl From<KeyboardEvent> for InputEvent {
    fn from(event: KeyboardEvent) -> Self {
        Self::Keyboard(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKey {
    Enter,
    Backspace,
    Tab,
    Escape,
    Delete,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    PageUp,
    PageDown,
    Back,
    HomeScreen,
    Recents,
    Notifications,
}

impl SpecialKey {
    pub const ALL: [SpecialKey; 17] = [
        Self::Enter,
        Self::Backspace,
        Self::Tab,
        Self::Escape,
        Self::Delete,
        Self::ArrowUp,
        Self::ArrowDown,
        Self::ArrowLeft,
        Self::ArrowRight,
        Self::Home,
        Self::End,
        Self::PageUp,
        Self::PageDown,
        Self::Back,
        Self::HomeScreen,
        Self::Recents,
        Self::Notifications,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Backspace => "Backspace",
            Self::Tab => "Tab",
            Self::Escape => "Escape",
            Self::Delete => "Delete",
            Self::ArrowUp => "ArrowUp",
            Self::ArrowDown => "ArrowDown",
            Self::ArrowLeft => "ArrowLeft",
            Self::ArrowRight => "ArrowRight",
            Self::Home => "Home",
            Self::End => "End",
            Self::PageUp => "PageUp",
            Self::PageDown => "PageDown",
            Self::Back => "BrowserBack",
            Self::HomeScreen => "GoHome",
            Self::Recents => "AppSwitch",
            Self::Notifications => "Notification",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Back => "BrowserBack",
            Self::HomeScreen => "BrowserHome",
            Self::Recents => "AppSwitch",
            Self::Notifications => "Notification",
            other => other.key(),
        }
    }

    /// Platform global action this key maps to, if it is one of the navigation keys.
    pub fn global_action(&self) -> Option<&'static str> {
        match self {
            Self::Back => Some("back"),
            Self::HomeScreen => Some("home"),
            Self::Recents => Some("recents"),
            Self::Notifications => Some("notifications"),
            _ => None,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn event(&self, kind: KeyboardEventKind) -> KeyboardEvent {
        KeyboardEvent {
            kind,
            key: self.key().to_owned(),
            code: self.code().to_owned(),
        }
    }
}
