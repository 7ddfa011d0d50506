//! The [`Signal`] type: the single unit of information that flows through
//! a bus, gets persisted to a recording, and gets folded back into a
//! snapshot by a [`crate::player::Player`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a signal came from. All fields are optional — most signals are
/// emitted directly by user code and carry no producer chain at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Id of the signal that causally preceded this one, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// UI rendering hints. Purely advisory — nothing in the bus or executor
/// reads these fields to make decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayType {
    Status,
    Notification,
    Stream,
    Progress,
    Log,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<DisplayType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// An immutable, named record emitted on a bus.
///
/// `timestamp` is a per-bus logical clock value, not wall-clock time: it is
/// what gives a recording a total, race-free order. `emitted_at` carries the
/// wall-clock time for display purposes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub timestamp: u64,
    pub emitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SignalSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayHint>,
}

impl Signal {
    /// Construct a signal with a fresh id and the given logical timestamp.
    /// Used by a bus at emission time; callers normally build signals via
    /// [`Signal::named`] and let the bus stamp `id`/`timestamp`.
    pub fn new(name: impl Into<String>, payload: serde_json::Value, timestamp: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            payload,
            timestamp,
            emitted_at: Utc::now(),
            source: None,
            display: None,
        }
    }

    /// Build a signal with no timestamp assigned yet (`timestamp = 0`,
    /// overwritten by the bus on emit). Convenience for user code that
    /// does not own a logical clock.
    pub fn named(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(name, payload, 0)
    }

    pub fn with_source(mut self, source: SignalSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_display(mut self, display: DisplayHint) -> Self {
        self.display = Some(display);
        self
    }

    /// True when `name`'s last colon-separated segment is one of the
    /// well-known delta/content suffixes a [`crate::player::Player`]
    /// snapshot folder accumulates text from.
    pub fn is_delta(&self) -> bool {
        self.name.ends_with(":delta") || self.name.ends_with(":content")
    }
}
