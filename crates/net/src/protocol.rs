//! Relay protocol message types
//!
//! Every unit on the wire is a single JSON object. Inbound frames decode
//! into an [`Envelope`] (the superset of every event kind); the payload is
//! extracted into a typed record per kind at dispatch time. Outbound frames
//! are built as `serde_json` values and encoded with sorted keys and fixed
//! indentation so the same request always produces the same bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Hard cap applied to channel-message and tell text.
pub const MAX_MESSAGE_LEN: usize = 120;

/// Outcome reported by the relay for a correlated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

/// Decoded inbound frame.
///
/// Only `event` is meaningful on every frame; a frame without one is
/// ignored by the dispatcher. Unknown fields are dropped during decode.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(Status::Success))
    }

    /// Extract the payload as a typed record; `None` when the payload is
    /// missing or does not carry the record's required fields.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// `channels/broadcast` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastPayload {
    pub channel: String,
    pub name: String,
    pub game: String,
    pub message: String,
}

/// `players/sign-in` / `players/sign-out` payload. The `game` field is
/// only present on foreign-player notifications; our own confirmations
/// carry the name alone (or no payload at all).
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerEventPayload {
    pub name: String,
    #[serde(default)]
    pub game: Option<String>,
}

/// `games/connect` / `games/disconnect` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct GamePayload {
    pub game: String,
}

/// `restart` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RestartPayload {
    pub downtime: u64,
}

/// `players/status` response payload for one game.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayersStatusPayload {
    pub game: String,
    #[serde(default)]
    pub players: Vec<String>,
}

/// `tells/receive` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TellPayload {
    pub from_name: String,
    #[serde(default)]
    pub from_game: String,
    pub to_name: String,
    #[serde(default)]
    pub sent_at: String,
    pub message: String,
}

/// `games/status` response payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameStatusReport {
    pub game: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage_url: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub connections: u32,
    #[serde(default)]
    pub supports: Vec<String>,
    #[serde(default)]
    pub players_online_count: u32,
}

/// Encode an outbound frame. `serde_json` maps keep their keys sorted and
/// pretty printing fixes the indentation, which keeps wire fixtures
/// byte-deterministic.
pub fn encode_frame(value: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Case-normalize a player name the way the network renders them: first
/// letter upper, remainder lower.
pub fn normalize_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Silently cap message text at [`MAX_MESSAGE_LEN`] characters.
pub fn truncate_message(text: &str) -> String {
    text.chars().take(MAX_MESSAGE_LEN).collect()
}
