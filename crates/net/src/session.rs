//! Relay session: connection lifecycle, outbound request builders, and
//! the inbound/outbound pumps.
//!
//! The session is a single-threaded state machine. Nothing here blocks:
//! every protocol-generating operation enqueues a frame, and the
//! embedding host's scheduler drains the queues one frame per pulse via
//! [`Session::pump_inbound`] / [`Session::pump_outbound`].

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::correlation::{CorrelationTable, PendingRequest};
use crate::dispatch::{self, RelayEvent};
use crate::error::Error;
use crate::presence::PresenceCache;
use crate::protocol::{encode_frame, normalize_name, truncate_message, Envelope};
use crate::roster::PlayerRoster;
use crate::transport::Transport;

/// Identity and capability declaration sent to the relay.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Capability groups this client declares (`channels`, `games`, ...).
    pub supports: Vec<String>,
    /// Broadcast channels to subscribe after authentication.
    pub channels: Vec<String>,
    pub version: String,
    pub user_agent: String,
}

pub struct Session {
    config: SessionConfig,
    connected: bool,
    authenticated: bool,
    /// Desired channels only; incoming traffic toggles these flags but
    /// never adds entries.
    subscribed: HashMap<String, bool>,
    pub(crate) presence: PresenceCache,
    pub(crate) pending: CorrelationTable,
    inbound: VecDeque<String>,
    outbound: VecDeque<String>,
    transport: Option<Box<dyn Transport>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let subscribed = config
            .channels
            .iter()
            .map(|channel| (channel.clone(), false))
            .collect();
        Self {
            config,
            connected: false,
            authenticated: false,
            subscribed,
            presence: PresenceCache::new(),
            pending: CorrelationTable::new(),
            inbound: VecDeque::new(),
            outbound: VecDeque::new(),
            transport: None,
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Attach an opened transport and queue the authenticate request.
    pub fn connect(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
        self.connected = true;
        info!("Connected to relay");
        self.authenticate();
    }

    /// Tear the session down. Idempotent: a disconnected session stays
    /// disconnected. Everything in flight is abandoned.
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if self.connected {
            info!("Disconnected from relay");
        }
        self.connected = false;
        self.authenticated = false;
        for flag in self.subscribed.values_mut() {
            *flag = false;
        }
        self.presence.clear();
        self.pending.clear();
        self.inbound.clear();
        self.outbound.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscribed.get(channel).copied().unwrap_or(false)
    }

    /// Toggle a desired channel's subscription status. Channels outside
    /// the desired set are ignored.
    pub(crate) fn mark_subscribed(&mut self, channel: &str, subscribed: bool) {
        if let Some(flag) = self.subscribed.get_mut(channel) {
            *flag = subscribed;
        }
    }

    pub fn presence(&self) -> &PresenceCache {
        &self.presence
    }

    pub(crate) fn desired_channels(&self) -> Vec<String> {
        self.config.channels.clone()
    }

    /// Frames waiting for the outbound pump.
    pub fn queued_outbound(&self) -> usize {
        self.outbound.len()
    }

    // ── Outbound builders ──────────────────────────────────────────

    /// Queue the authenticate request. The relay requires the `channels`
    /// key to be absent (not an empty list) when there is nothing to
    /// subscribe.
    pub fn authenticate(&mut self) {
        let mut payload = json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "supports": self.config.supports,
            "version": self.config.version,
            "user_agent": self.config.user_agent,
        });
        if !self.config.channels.is_empty() {
            payload["channels"] = json!(self.config.channels);
        }
        self.enqueue(json!({"event": "authenticate", "payload": payload}));
    }

    /// Answer a relay heartbeat with the current local player list.
    pub fn heartbeat_reply(&mut self, players: Vec<String>) {
        let players: Vec<String> = players.iter().map(|p| normalize_name(p)).collect();
        self.enqueue(json!({"event": "heartbeat", "payload": {"players": players}}));
    }

    /// No-op if the channel is already marked subscribed.
    pub fn subscribe_channel(&mut self, channel: &str) {
        if self.is_subscribed(channel) {
            debug!(channel, "Already subscribed");
            return;
        }
        let reference = new_ref();
        self.pending.record(
            reference.clone(),
            PendingRequest::Subscribe {
                channel: channel.to_string(),
            },
        );
        self.enqueue(json!({
            "event": "channels/subscribe",
            "ref": reference,
            "payload": {"channel": channel}
        }));
    }

    pub fn unsubscribe_channel(&mut self, channel: &str) {
        let reference = new_ref();
        self.pending.record(
            reference.clone(),
            PendingRequest::Unsubscribe {
                channel: channel.to_string(),
            },
        );
        self.enqueue(json!({
            "event": "channels/unsubscribe",
            "ref": reference,
            "payload": {"channel": channel}
        }));
    }

    /// Announce a local player signing in.
    pub fn sign_in(&mut self, player: &str) {
        let name = normalize_name(player);
        let reference = new_ref();
        self.pending
            .record(reference.clone(), PendingRequest::SignIn { name: name.clone() });
        self.enqueue(json!({
            "event": "players/sign-in",
            "ref": reference,
            "payload": {"name": name}
        }));
    }

    /// Announce a local player signing out.
    pub fn sign_out(&mut self, player: &str) {
        let name = normalize_name(player);
        let reference = new_ref();
        self.pending
            .record(reference.clone(), PendingRequest::SignOut { name: name.clone() });
        self.enqueue(json!({
            "event": "players/sign-out",
            "ref": reference,
            "payload": {"name": name}
        }));
    }

    /// Send a channel message. No-op unless the channel is currently
    /// subscribed; text is capped at the network maximum.
    pub fn send_channel_message(&mut self, player: &str, channel: &str, message: &str) {
        if !self.is_subscribed(channel) {
            debug!(channel, "Not subscribed, dropping channel message");
            return;
        }
        let reference = new_ref();
        self.pending.record(
            reference.clone(),
            PendingRequest::ChannelSend {
                channel: channel.to_string(),
            },
        );
        self.enqueue(json!({
            "event": "channels/send",
            "ref": reference,
            "payload": {
                "channel": channel,
                "name": normalize_name(player),
                "message": truncate_message(message),
            }
        }));
    }

    /// Send a private tell to a player in a remote game.
    pub fn send_tell(&mut self, from_player: &str, to_player: &str, to_game: &str, message: &str) {
        let from_name = normalize_name(from_player);
        let to_name = normalize_name(to_player);
        let reference = new_ref();
        self.pending.record(
            reference.clone(),
            PendingRequest::Tell {
                from_name: from_name.clone(),
                to_name: to_name.clone(),
                to_game: to_game.to_string(),
            },
        );
        self.enqueue(json!({
            "event": "tells/send",
            "ref": reference,
            "payload": {
                "from_name": from_name,
                "to_name": to_name,
                "to_game": to_game,
                "sent_at": Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                "message": truncate_message(message),
            }
        }));
    }

    /// Query game status: one game, or the whole network when `None`
    /// (the payload is omitted for the network-wide form).
    pub fn games_status_query(&mut self, game: Option<&str>) {
        let reference = new_ref();
        self.pending.record(
            reference.clone(),
            PendingRequest::GamesStatus {
                game: game.map(str::to_string),
            },
        );
        let frame = match game {
            Some(game) => json!({
                "event": "games/status",
                "ref": reference,
                "payload": {"game": game}
            }),
            None => json!({"event": "games/status", "ref": reference}),
        };
        self.enqueue(frame);
    }

    /// Query online players: one game, or the whole network when `None`.
    pub fn players_status_query(&mut self, game: Option<&str>) {
        let reference = new_ref();
        self.pending.record(
            reference.clone(),
            PendingRequest::PlayersStatus {
                game: game.map(str::to_string),
            },
        );
        let frame = match game {
            Some(game) => json!({
                "event": "players/status",
                "ref": reference,
                "payload": {"game": game}
            }),
            None => json!({"event": "players/status", "ref": reference}),
        };
        self.enqueue(frame);
    }

    fn enqueue(&mut self, frame: Value) {
        match encode_frame(&frame) {
            Ok(text) => self.outbound.push_back(text),
            Err(e) => warn!(error = %e, "Failed to encode outbound frame"),
        }
    }

    // ── Pumps ──────────────────────────────────────────────────────

    /// One non-blocking read, then dispatch at most one buffered frame.
    /// Transport failures are swallowed here; a closed connection tears
    /// the session down so the host's liveness check can reconnect.
    pub fn pump_inbound(&mut self, roster: &dyn PlayerRoster) -> Option<RelayEvent> {
        let mut lost = false;
        if let Some(transport) = self.transport.as_mut() {
            match transport.try_recv() {
                Ok(Some(frame)) => self.inbound.push_back(frame),
                Ok(None) => {}
                Err(Error::ConnectionClosed) => {
                    warn!("Relay closed the connection");
                    lost = true;
                }
                Err(e) => warn!(error = %e, "Receive failed"),
            }
        }
        if lost {
            self.disconnect();
            return None;
        }

        let frame = self.inbound.pop_front()?;
        let envelope = match Envelope::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "Ignoring undecodable frame");
                return None;
            }
        };
        dispatch::dispatch(self, envelope, roster)
    }

    /// Flush any partial write, then transmit at most one queued frame.
    pub fn pump_outbound(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if let Err(e) = transport.flush() {
            warn!(error = %e, "Flush failed");
            return;
        }
        if let Some(frame) = self.outbound.pop_front() {
            if let Err(e) = transport.try_send(&frame) {
                warn!(error = %e, "Send failed");
            }
        }
    }
}

fn new_ref() -> String {
    Uuid::new_v4().to_string()
}
