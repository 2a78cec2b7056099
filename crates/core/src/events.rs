//! Session event definitions.
//!
//! Every captured interaction becomes a [`SessionEvent`]: a timestamp, an
//! optional target and a payload whose shape is fixed by its kind.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::clock::Timestamp;
use crate::limits::MAX_ELEMENT_ID_LEN;

/// Element an event was aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
pub struct EventTarget {
    /// Stable identifier (`#id`, `.class.tokens` or `tag:nth-child(n)`)
    #[validate(length(min = 1, max = 256))]
    pub element: String,
    /// Element tag name, lowercased
    #[validate(length(min = 1, max = 64))]
    pub element_type: String,
}

/// Scroll direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Click event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ClickData {
    #[validate(range(min = 0.0))]
    pub x: f64,
    #[validate(range(min = 0.0))]
    pub y: f64,
    /// Mouse button (0 = primary)
    #[serde(default)]
    pub button: u8,
}

/// Scroll event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ScrollData {
    #[validate(range(min = 0.0))]
    pub scroll_y: f64,
    /// Scroll depth as percentage (0-100)
    #[validate(range(min = 0.0, max = 100.0))]
    pub depth_percent: f64,
    pub direction: ScrollDirection,
}

/// Input event data. Only the shape of what was typed is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct InputData {
    #[validate(length(max = 32))]
    pub field_type: String,
    pub value_length: usize,
}

/// Resize event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ResizeData {
    #[validate(range(min = 1))]
    pub width: u32,
    #[validate(range(min = 1))]
    pub height: u32,
}

/// Navigation event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NavigationData {
    #[validate(length(max = 2000))]
    pub from: String,
    #[validate(length(min = 1, max = 2000))]
    pub to: String,
}

/// Modifier keys held during a keypress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

/// Keypress metadata. Never carries the produced character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct KeypressData {
    /// Physical key code (e.g. `KeyA`, `Enter`)
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    pub modifiers: Modifiers,
    /// Whether the key would have produced a printable character
    pub printable: bool,
}

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    Click(ClickData),
    Scroll(ScrollData),
    Input(InputData),
    Focus,
    Blur,
    Resize(ResizeData),
    Navigation(NavigationData),
    Keypress(KeypressData),
}

/// Discriminator of an [`EventPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    Scroll,
    Input,
    Focus,
    Blur,
    Resize,
    Navigation,
    Keypress,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Scroll => "scroll",
            Self::Input => "input",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::Resize => "resize",
            Self::Navigation => "navigation",
            Self::Keypress => "keypress",
        }
    }
}

impl EventPayload {
    /// Returns the event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Click(_) => EventKind::Click,
            Self::Scroll(_) => EventKind::Scroll,
            Self::Input(_) => EventKind::Input,
            Self::Focus => EventKind::Focus,
            Self::Blur => EventKind::Blur,
            Self::Resize(_) => EventKind::Resize,
            Self::Navigation(_) => EventKind::Navigation,
            Self::Keypress(_) => EventKind::Keypress,
        }
    }

    fn validate_inner(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            Self::Click(d) => d.validate(),
            Self::Scroll(d) => d.validate(),
            Self::Input(d) => d.validate(),
            Self::Resize(d) => d.validate(),
            Self::Navigation(d) => d.validate(),
            Self::Keypress(d) => d.validate(),
            Self::Focus | Self::Blur => Ok(()),
        }
    }
}

/// A single captured interaction inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<EventTarget>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl SessionEvent {
    pub fn new(timestamp: Timestamp, target: Option<EventTarget>, payload: EventPayload) -> Self {
        Self {
            timestamp,
            target,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Validates the event at the capture boundary.
    pub fn validate(&self) -> crate::Result<()> {
        if self.timestamp < 0 {
            return Err(crate::Error::validation("negative timestamp"));
        }
        if let Some(target) = &self.target {
            target.validate()?;
            if target.element.chars().count() > MAX_ELEMENT_ID_LEN {
                return Err(crate::Error::validation("element identifier too long"));
            }
        }
        self.payload.validate_inner()?;
        Ok(())
    }
}
