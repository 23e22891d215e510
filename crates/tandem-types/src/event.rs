//! Event (packet) model and its wire form.
//!
//! An [`Event`] is immutable once created. Its payload is typed per
//! [`EventKind`] and validated at construction, so an `Event` value can
//! never carry an out-of-range mood or battery level.
//!
//! On the wire an event is the JSON object
//! `{"kind", "payload", "timestamp", "origin", "serverArrival"?}` described
//! by [`WireEvent`]. `timestamp` is the canonical hybrid timestamp string.
//! Decoding re-validates everything and reports typed errors.

use core::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use ts_rs::TS;

use crate::ids::{EmptyNodeId, NodeId};
use crate::timestamp::{ClockParseError, HybridTimestamp};

/// The five kinds of event carried by the shared stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum EventKind {
    /// A chat message.
    Chat,
    /// A mood declaration (level 1..=5).
    Mood,
    /// A battery report (percent 0..=100).
    Battery,
    /// An image reference.
    Image,
    /// An attention nudge with no payload.
    Nudge,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chat => "CHAT",
            Self::Mood => "MOOD",
            Self::Battery => "BATTERY",
            Self::Image => "IMAGE",
            Self::Nudge => "NUDGE",
        };
        f.write_str(name)
    }
}

/// A payload that does not match its declared kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPayloadError {
    /// The payload JSON does not have the fields the kind requires.
    #[error("{kind} payload has the wrong shape: {reason}")]
    Shape {
        /// Declared kind.
        kind: EventKind,
        /// What was wrong.
        reason: String,
    },

    /// A level is outside the range allowed for its kind.
    #[error("{kind} level {value} is outside {min}..={max}")]
    OutOfRange {
        /// Declared kind.
        kind: EventKind,
        /// The rejected value.
        value: i64,
        /// Smallest allowed value.
        min: i64,
        /// Largest allowed value.
        max: i64,
    },

    /// An IMAGE payload without a blob reference.
    #[error("IMAGE payload must reference a non-empty blob")]
    EmptyImage,
}

/// Errors produced when decoding an event from its wire form.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The input is not a JSON object of the wire shape.
    #[error("malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The `timestamp` field is not a canonical hybrid timestamp.
    #[error("invalid event timestamp: {0}")]
    Timestamp(#[from] ClockParseError),

    /// The payload does not match the declared kind.
    #[error("invalid event payload: {0}")]
    Payload(#[from] InvalidPayloadError),

    /// The `origin` field is empty.
    #[error("invalid event origin: {0}")]
    Origin(#[from] EmptyNodeId),

    /// The `origin` field names a different node than the timestamp.
    #[error("event origin {origin:?} does not match timestamp node {node:?}")]
    OriginMismatch {
        /// The claimed author.
        origin: String,
        /// The node encoded in the timestamp.
        node: String,
    },
}

/// Declared mood, from 1 (low) to 5 (high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MoodLevel(u8);

impl MoodLevel {
    /// Lowest mood level.
    pub const MIN: u8 = 1;
    /// Highest mood level.
    pub const MAX: u8 = 5;
    /// The middle of the scale, used when a peer has not declared a mood yet.
    pub const NEUTRAL: Self = Self(3);

    /// Validate a raw mood level.
    pub fn new(level: i64) -> Result<Self, InvalidPayloadError> {
        checked_level(EventKind::Mood, level, Self::MIN, Self::MAX).map(Self)
    }

    /// The numeric level.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Absolute distance between two mood levels (0..=4).
    pub const fn distance(self, other: Self) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl TryFrom<i64> for MoodLevel {
    type Error = InvalidPayloadError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MoodLevel> for i64 {
    fn from(level: MoodLevel) -> Self {
        Self::from(level.0)
    }
}

/// Battery charge in percent, 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct BatteryLevel(u8);

impl BatteryLevel {
    /// Empty battery.
    pub const MIN: u8 = 0;
    /// Full battery.
    pub const MAX: u8 = 100;
    /// Below this percentage a battery counts as low.
    pub const LOW_THRESHOLD: u8 = 20;

    /// Validate a raw battery percentage.
    pub fn new(level: i64) -> Result<Self, InvalidPayloadError> {
        checked_level(EventKind::Battery, level, Self::MIN, Self::MAX).map(Self)
    }

    /// The numeric percentage.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Whether the charge is below [`Self::LOW_THRESHOLD`].
    pub const fn is_low(self) -> bool {
        self.0 < Self::LOW_THRESHOLD
    }
}

impl TryFrom<i64> for BatteryLevel {
    type Error = InvalidPayloadError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BatteryLevel> for i64 {
    fn from(level: BatteryLevel) -> Self {
        Self::from(level.0)
    }
}

fn checked_level(kind: EventKind, value: i64, min: u8, max: u8) -> Result<u8, InvalidPayloadError> {
    let out_of_range = || InvalidPayloadError::OutOfRange {
        kind,
        value,
        min: i64::from(min),
        max: i64::from(max),
    };
    let level = u8::try_from(value).map_err(|_overflow| out_of_range())?;
    if (min..=max).contains(&level) {
        Ok(level)
    } else {
        Err(out_of_range())
    }
}

/// Kind-specific event content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Chat text.
    Chat {
        /// Message body.
        text: String,
    },
    /// Mood declaration.
    Mood {
        /// Declared level.
        level: MoodLevel,
    },
    /// Battery report.
    Battery {
        /// Reported percentage.
        level: BatteryLevel,
    },
    /// Image reference (a data URL or a storage URL).
    Image {
        /// Blob reference.
        image: String,
    },
    /// Attention nudge.
    Nudge,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TextBody {
    text: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LevelBody {
    level: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ImageBody {
    image: String,
}

impl Payload {
    /// A chat payload.
    pub fn chat(text: impl Into<String>) -> Self {
        Self::Chat { text: text.into() }
    }

    /// A mood payload, validating the level.
    pub fn mood(level: i64) -> Result<Self, InvalidPayloadError> {
        MoodLevel::new(level).map(|level| Self::Mood { level })
    }

    /// A battery payload, validating the percentage.
    pub fn battery(level: i64) -> Result<Self, InvalidPayloadError> {
        BatteryLevel::new(level).map(|level| Self::Battery { level })
    }

    /// An image payload, rejecting an empty reference.
    pub fn image(reference: impl Into<String>) -> Result<Self, InvalidPayloadError> {
        let payload = Self::Image {
            image: reference.into(),
        };
        payload.validate()?;
        Ok(payload)
    }

    /// A nudge payload.
    pub const fn nudge() -> Self {
        Self::Nudge
    }

    /// The kind this payload belongs to.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Chat { .. } => EventKind::Chat,
            Self::Mood { .. } => EventKind::Mood,
            Self::Battery { .. } => EventKind::Battery,
            Self::Image { .. } => EventKind::Image,
            Self::Nudge => EventKind::Nudge,
        }
    }

    /// Check invariants that the variant types cannot express.
    pub fn validate(&self) -> Result<(), InvalidPayloadError> {
        match self {
            Self::Image { image } if image.is_empty() => Err(InvalidPayloadError::EmptyImage),
            _ => Ok(()),
        }
    }

    /// Encode the payload as the JSON object stored on the wire.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Chat { text } => json!({ "text": text }),
            Self::Mood { level } => json!({ "level": level.get() }),
            Self::Battery { level } => json!({ "level": level.get() }),
            Self::Image { image } => json!({ "image": image }),
            Self::Nudge => json!({}),
        }
    }

    /// Decode and validate a wire payload for the given kind.
    pub fn from_value(kind: EventKind, value: &Value) -> Result<Self, InvalidPayloadError> {
        let payload = match kind {
            EventKind::Chat => Self::Chat {
                text: shaped::<TextBody>(kind, value)?.text,
            },
            EventKind::Mood => Self::Mood {
                level: MoodLevel::new(shaped::<LevelBody>(kind, value)?.level)?,
            },
            EventKind::Battery => Self::Battery {
                level: BatteryLevel::new(shaped::<LevelBody>(kind, value)?.level)?,
            },
            EventKind::Image => Self::Image {
                image: shaped::<ImageBody>(kind, value)?.image,
            },
            EventKind::Nudge => match value {
                Value::Object(map) if map.is_empty() => Self::Nudge,
                _ => {
                    return Err(InvalidPayloadError::Shape {
                        kind,
                        reason: "expected an empty object".to_owned(),
                    });
                }
            },
        };
        payload.validate()?;
        Ok(payload)
    }
}

fn shaped<T: DeserializeOwned>(kind: EventKind, value: &Value) -> Result<T, InvalidPayloadError> {
    serde_json::from_value(value.clone()).map_err(|e| InvalidPayloadError::Shape {
        kind,
        reason: e.to_string(),
    })
}

/// An immutable entry of the shared stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub struct Event {
    payload: Payload,
    timestamp: HybridTimestamp,
    server_arrival: Option<u64>,
}

impl Event {
    /// Assemble an event from an already-issued timestamp. The author is
    /// the node the timestamp was issued by.
    ///
    /// Most callers want the clock-stamping constructor in the core crate;
    /// this one exists for decoding and for tests.
    pub fn new(payload: Payload, timestamp: HybridTimestamp) -> Result<Self, InvalidPayloadError> {
        payload.validate()?;
        Ok(Self {
            payload,
            timestamp,
            server_arrival: None,
        })
    }

    /// Return a copy carrying the store's arrival time.
    #[must_use]
    pub fn with_server_arrival(mut self, millis: u64) -> Self {
        self.server_arrival = Some(millis);
        self
    }

    /// The event kind.
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// The typed payload.
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The causal order key.
    pub const fn timestamp(&self) -> &HybridTimestamp {
        &self.timestamp
    }

    /// The authoring node, always the timestamp's node.
    pub const fn origin(&self) -> &NodeId {
        &self.timestamp.node
    }

    /// Advisory arrival time recorded by the durable store, if any.
    pub const fn server_arrival(&self) -> Option<u64> {
        self.server_arrival
    }

    /// Whether the event was authored by `node`.
    pub fn is_from(&self, node: &NodeId) -> bool {
        self.origin() == node
    }

    /// Encode as wire JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireEvent::from(self))
    }

    /// Decode from wire JSON with typed errors.
    pub fn from_json(input: &str) -> Result<Self, DecodeError> {
        let wire: WireEvent = serde_json::from_str(input)?;
        Self::try_from(wire)
    }
}

/// Transport-neutral form of an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct WireEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Kind-specific payload object.
    pub payload: Value,
    /// Canonical hybrid timestamp string.
    pub timestamp: String,
    /// Authoring node id.
    pub origin: String,
    /// Advisory store arrival time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub server_arrival: Option<u64>,
}

impl From<&Event> for WireEvent {
    fn from(event: &Event) -> Self {
        Self {
            kind: event.kind(),
            payload: event.payload.to_value(),
            timestamp: event.timestamp.to_string(),
            origin: event.origin().as_str().to_owned(),
            server_arrival: event.server_arrival,
        }
    }
}

impl From<Event> for WireEvent {
    fn from(event: Event) -> Self {
        Self::from(&event)
    }
}

impl TryFrom<WireEvent> for Event {
    type Error = DecodeError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let timestamp = HybridTimestamp::parse(&wire.timestamp)?;
        let origin = NodeId::new(wire.origin)?;
        if origin != timestamp.node {
            return Err(DecodeError::OriginMismatch {
                origin: origin.as_str().to_owned(),
                node: timestamp.node.as_str().to_owned(),
            });
        }
        let payload = Payload::from_value(wire.kind, &wire.payload)?;
        Ok(Self {
            payload,
            timestamp,
            server_arrival: wire.server_arrival,
        })
    }
}
