//! Inbound event dispatch.
//!
//! Each decoded frame is routed by its event kind to a handler that
//! updates session state (presence cache, subscription flags, pending
//! requests) and produces a normalized [`RelayEvent`] for the host to
//! format and deliver. Frames with no event field and unrecognized kinds
//! are dropped without complaint, as are responses whose ref the table
//! no longer holds.

use tracing::{debug, info};

use crate::correlation::PendingRequest;
use crate::protocol::{
    normalize_name, BroadcastPayload, Envelope, GamePayload, GameStatusReport,
    PlayerEventPayload, PlayersStatusPayload, RestartPayload, TellPayload,
};
use crate::roster::PlayerRoster;
use crate::session::Session;

/// Normalized result handed back to the embedding host.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Channel chatter from a player in a remote game.
    Broadcast {
        channel: String,
        name: String,
        game: String,
        message: String,
    },
    PlayerSignedIn {
        name: String,
        game: String,
    },
    PlayerSignedOut {
        name: String,
        game: String,
    },
    GameConnected {
        game: String,
    },
    GameDisconnected {
        game: String,
    },
    GameStatus(GameStatusReport),
    GameStatusFailed {
        /// The queried game, when the original request named one.
        game: Option<String>,
        error: String,
    },
    TellReceived {
        from_name: String,
        from_game: String,
        to_name: String,
        sent_at: String,
        message: String,
    },
    /// A tell we sent bounced; the host should notify the sender.
    TellFailed {
        from_name: String,
        to_name: String,
        to_game: String,
        error: String,
    },
    /// The relay is going down for `downtime_secs`; the host must tear
    /// the session down and rebuild it after the window passes.
    Restart {
        downtime_secs: u64,
    },
}

pub(crate) fn dispatch(
    session: &mut Session,
    envelope: Envelope,
    roster: &dyn PlayerRoster,
) -> Option<RelayEvent> {
    let event = envelope.event.clone()?;
    match event.as_str() {
        "heartbeat" => {
            session.heartbeat_reply(roster.online_players());
            None
        }
        "authenticate" => on_authenticate(session, &envelope),
        "restart" => {
            let payload = envelope.payload_as::<RestartPayload>()?;
            info!(downtime_secs = payload.downtime, "Relay restart announced");
            Some(RelayEvent::Restart {
                downtime_secs: payload.downtime,
            })
        }
        "channels/broadcast" => {
            let payload = envelope.payload_as::<BroadcastPayload>()?;
            Some(RelayEvent::Broadcast {
                channel: payload.channel,
                name: payload.name,
                game: payload.game,
                message: payload.message,
            })
        }
        "channels/subscribe" => on_subscribe_reply(session, &envelope),
        "channels/unsubscribe" => on_unsubscribe_reply(session, &envelope),
        "channels/send" => {
            if envelope.is_success() {
                if let Some(reference) = envelope.reference.as_deref() {
                    session.pending.resolve(reference);
                }
            }
            None
        }
        "players/sign-in" => on_player_event(session, &envelope, true),
        "players/sign-out" => on_player_event(session, &envelope, false),
        "games/connect" => {
            let payload = envelope.payload_as::<GamePayload>()?;
            session.presence.reset(&payload.game);
            // Refresh the whole cache; the new game's roster arrives with it
            session.players_status_query(None);
            Some(RelayEvent::GameConnected { game: payload.game })
        }
        "games/disconnect" => {
            let payload = envelope.payload_as::<GamePayload>()?;
            session.presence.remove_game(&payload.game);
            Some(RelayEvent::GameDisconnected { game: payload.game })
        }
        "games/status" => on_game_status(session, &envelope),
        "players/status" => on_players_status(session, &envelope),
        "tells/send" => on_tell_reply(session, &envelope),
        "tells/receive" => {
            let payload = envelope.payload_as::<TellPayload>()?;
            Some(RelayEvent::TellReceived {
                from_name: payload.from_name,
                from_game: payload.from_game,
                to_name: payload.to_name,
                sent_at: payload.sent_at,
                message: payload.message,
            })
        }
        other => {
            debug!(event = other, "Ignoring unrecognized event");
            None
        }
    }
}

/// Success: mark authenticated and queue the post-auth requests (one
/// subscribe per desired channel, then a network-wide player refresh).
/// Failure while still unauthenticated: try again.
fn on_authenticate(session: &mut Session, envelope: &Envelope) -> Option<RelayEvent> {
    if envelope.is_success() {
        info!("Authenticated with relay");
        session.mark_authenticated();
        for channel in session.desired_channels() {
            session.subscribe_channel(&channel);
        }
        session.players_status_query(None);
    } else if !session.is_authenticated() {
        info!(error = ?envelope.error, "Authentication rejected, retrying");
        session.authenticate();
    }
    None
}

fn on_subscribe_reply(session: &mut Session, envelope: &Envelope) -> Option<RelayEvent> {
    let reference = envelope.reference.as_deref()?;
    if let Some(PendingRequest::Subscribe { channel }) = session.pending.resolve(reference) {
        let subscribed = envelope.is_success();
        if !subscribed {
            info!(channel = %channel, error = ?envelope.error, "Subscribe rejected");
        }
        session.mark_subscribed(&channel, subscribed);
    }
    None
}

/// Unsubscribe confirmations clear the flag regardless of status.
fn on_unsubscribe_reply(session: &mut Session, envelope: &Envelope) -> Option<RelayEvent> {
    let reference = envelope.reference.as_deref()?;
    if let Some(PendingRequest::Unsubscribe { channel }) = session.pending.resolve(reference) {
        session.mark_subscribed(&channel, false);
    }
    None
}

/// A `game` field in the payload marks a foreign-player notification;
/// everything else is the relay confirming one of our own sign-in/out
/// requests, which pops silently.
fn on_player_event(
    session: &mut Session,
    envelope: &Envelope,
    signed_in: bool,
) -> Option<RelayEvent> {
    if let Some(payload) = envelope.payload_as::<PlayerEventPayload>() {
        if let Some(game) = payload.game {
            let name = normalize_name(&payload.name);
            return Some(if signed_in {
                session.presence.sign_in(&game, &name);
                RelayEvent::PlayerSignedIn { name, game }
            } else {
                session.presence.sign_out(&game, &name);
                RelayEvent::PlayerSignedOut { name, game }
            });
        }
    }
    if envelope.is_success() {
        if let Some(reference) = envelope.reference.as_deref() {
            session.pending.resolve(reference);
        }
    }
    None
}

fn on_game_status(session: &mut Session, envelope: &Envelope) -> Option<RelayEvent> {
    let reference = envelope.reference.as_deref()?;
    let pending = session.pending.resolve(reference)?;
    if envelope.is_success() {
        let report = envelope.payload_as::<GameStatusReport>()?;
        Some(RelayEvent::GameStatus(report))
    } else {
        let game = match pending {
            PendingRequest::GamesStatus { game } => game,
            _ => None,
        };
        Some(RelayEvent::GameStatusFailed {
            game,
            error: envelope.error.clone().unwrap_or_default(),
        })
    }
}

/// One players/status query fans out to one response per connected game;
/// only the first response still finds the ref, so a missing entry is
/// expected. The payload list replaces the game's cache entry.
fn on_players_status(session: &mut Session, envelope: &Envelope) -> Option<RelayEvent> {
    if let Some(reference) = envelope.reference.as_deref() {
        session.pending.resolve(reference);
    }
    let payload = envelope.payload_as::<PlayersStatusPayload>()?;
    session.presence.replace(&payload.game, payload.players);
    None
}

/// Successful tells need no action. A failure is matched back to the
/// original request so the host can tell the sender it bounced.
fn on_tell_reply(session: &mut Session, envelope: &Envelope) -> Option<RelayEvent> {
    if envelope.is_success() {
        return None;
    }
    let reference = envelope.reference.as_deref()?;
    match session.pending.resolve(reference)? {
        PendingRequest::Tell {
            from_name,
            to_name,
            to_game,
        } => Some(RelayEvent::TellFailed {
            from_name,
            to_name,
            to_game,
            error: envelope
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".into()),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::transport::MemoryTransport;

    struct FixedRoster(Vec<String>);

    impl PlayerRoster for FixedRoster {
        fn online_players(&self) -> Vec<String> {
            self.0.clone()
        }
        fn deliver(&self, _player: &str, _text: &str) -> bool {
            true
        }
    }

    fn roster() -> FixedRoster {
        FixedRoster(vec!["Ada".into()])
    }

    fn session_with(channels: &[&str]) -> (Session, MemoryTransport) {
        let handle = MemoryTransport::new();
        let mut session = Session::new(SessionConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            supports: vec!["channels".into()],
            channels: channels.iter().map(|c| c.to_string()).collect(),
            version: "0.1.0".into(),
            user_agent: "Trellis test".into(),
        });
        session.connect(Box::new(handle.clone()));
        (session, handle)
    }

    /// Feed one frame through the pump and return the dispatch result.
    fn feed(session: &mut Session, handle: &MemoryTransport, frame: &str) -> Option<RelayEvent> {
        handle.push_incoming(frame);
        session.pump_inbound(&roster())
    }

    /// The ref of the most recently queued request frame.
    fn last_ref(handle: &MemoryTransport, session: &mut Session) -> String {
        while session.queued_outbound() > 0 {
            session.pump_outbound();
        }
        let sent = handle.sent();
        let envelope = Envelope::decode(sent.last().unwrap()).unwrap();
        envelope.reference.unwrap()
    }

    #[test]
    fn test_auth_success_queues_subscribe_and_player_query() {
        let (mut session, handle) = session_with(&["gossip"]);
        // Drop the queued authenticate frame to count only what follows
        session.pump_outbound();
        assert_eq!(session.queued_outbound(), 0);

        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"authenticate","status":"success"}"#,
        );
        assert!(result.is_none());
        assert!(session.is_authenticated());
        assert_eq!(session.queued_outbound(), 2);

        while session.queued_outbound() > 0 {
            session.pump_outbound();
        }
        let sent = handle.sent();
        let events: Vec<String> = sent[1..]
            .iter()
            .map(|f| Envelope::decode(f).unwrap().event.unwrap())
            .collect();
        assert_eq!(events, vec!["channels/subscribe", "players/status"]);
    }

    #[test]
    fn test_auth_failure_retries_until_authenticated() {
        let (mut session, handle) = session_with(&[]);
        session.pump_outbound();

        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"authenticate","status":"failure","error":"bad secret"}"#,
        );
        assert!(result.is_none());
        assert!(!session.is_authenticated());
        // A fresh authenticate request is queued
        assert_eq!(session.queued_outbound(), 1);
    }

    #[test]
    fn test_heartbeat_generates_reply() {
        let (mut session, handle) = session_with(&[]);
        session.pump_outbound();

        feed(&mut session, &handle, r#"{"event":"heartbeat"}"#);
        assert_eq!(session.queued_outbound(), 1);
        session.pump_outbound();

        let envelope = Envelope::decode(handle.sent().last().unwrap()).unwrap();
        assert_eq!(envelope.event.as_deref(), Some("heartbeat"));
        assert_eq!(envelope.payload["players"][0], "Ada");
    }

    #[test]
    fn test_restart_surfaces_downtime() {
        let (mut session, handle) = session_with(&[]);
        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"restart","payload":{"downtime":15}}"#,
        );
        assert_eq!(result, Some(RelayEvent::Restart { downtime_secs: 15 }));
    }

    #[test]
    fn test_broadcast_returns_message_fields() {
        let (mut session, handle) = session_with(&[]);
        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"channels/broadcast","payload":{"channel":"gossip","name":"Rig","game":"OtherMUD","message":"hail"}}"#,
        );
        assert_eq!(
            result,
            Some(RelayEvent::Broadcast {
                channel: "gossip".into(),
                name: "Rig".into(),
                game: "OtherMUD".into(),
                message: "hail".into(),
            })
        );
    }

    #[test]
    fn test_subscribe_failure_clears_flag() {
        let (mut session, handle) = session_with(&["gossip"]);
        session.pump_outbound();
        session.subscribe_channel("gossip");
        let reference = last_ref(&handle, &mut session);

        // Failure clears the flag regardless of its prior value
        session.mark_subscribed("gossip", true);
        let frame = format!(
            r#"{{"event":"channels/subscribe","status":"failure","ref":"{}","error":"closed"}}"#,
            reference
        );
        feed(&mut session, &handle, &frame);
        assert!(!session.is_subscribed("gossip"));
        assert!(session.pending.is_empty());
    }

    #[test]
    fn test_subscribe_success_sets_flag() {
        let (mut session, handle) = session_with(&["gossip"]);
        session.pump_outbound();
        session.subscribe_channel("gossip");
        let reference = last_ref(&handle, &mut session);

        let frame = format!(
            r#"{{"event":"channels/subscribe","status":"success","ref":"{}"}}"#,
            reference
        );
        feed(&mut session, &handle, &frame);
        assert!(session.is_subscribed("gossip"));
    }

    #[test]
    fn test_unsubscribe_clears_flag_unconditionally() {
        let (mut session, handle) = session_with(&["gossip"]);
        session.mark_subscribed("gossip", true);
        session.pump_outbound();
        session.unsubscribe_channel("gossip");
        let reference = last_ref(&handle, &mut session);

        // Even a failure status clears the flag
        let frame = format!(
            r#"{{"event":"channels/unsubscribe","status":"failure","ref":"{}"}}"#,
            reference
        );
        feed(&mut session, &handle, &frame);
        assert!(!session.is_subscribed("gossip"));
    }

    #[test]
    fn test_stale_ref_is_benign() {
        let (mut session, handle) = session_with(&["gossip"]);
        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"channels/subscribe","status":"success","ref":"long-gone"}"#,
        );
        assert!(result.is_none());
        assert!(!session.is_subscribed("gossip"));
    }

    #[test]
    fn test_own_sign_in_confirmation_pops_silently() {
        let (mut session, handle) = session_with(&[]);
        session.pump_outbound();
        session.sign_in("ada");
        let reference = last_ref(&handle, &mut session);
        assert_eq!(session.pending.len(), 1);

        let frame = format!(
            r#"{{"event":"players/sign-in","status":"success","ref":"{}"}}"#,
            reference
        );
        let result = feed(&mut session, &handle, &frame);
        assert!(result.is_none());
        assert!(session.pending.is_empty());
        // Our own confirmation is not a foreign-player event
        assert!(session.presence().games().next().is_none());
    }

    #[test]
    fn test_foreign_sign_in_updates_cache() {
        let (mut session, handle) = session_with(&[]);
        session.presence.sign_in("OtherMUD", "Zed");

        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"players/sign-in","payload":{"name":"Rig","game":"OtherMUD"}}"#,
        );
        assert_eq!(
            result,
            Some(RelayEvent::PlayerSignedIn {
                name: "Rig".into(),
                game: "OtherMUD".into(),
            })
        );
        let players = session.presence().players("OtherMUD").unwrap();
        assert!(players.contains("Zed"));
        assert!(players.contains("Rig"));
    }

    #[test]
    fn test_foreign_sign_out_updates_cache() {
        let (mut session, handle) = session_with(&[]);
        session.presence.sign_in("OtherMUD", "Rig");

        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"players/sign-out","payload":{"name":"Rig","game":"OtherMUD"}}"#,
        );
        assert_eq!(
            result,
            Some(RelayEvent::PlayerSignedOut {
                name: "Rig".into(),
                game: "OtherMUD".into(),
            })
        );
        assert!(session.presence().players("OtherMUD").unwrap().is_empty());
    }

    #[test]
    fn test_game_connect_resets_entry_and_queues_refresh() {
        let (mut session, handle) = session_with(&[]);
        session.presence.sign_in("OtherMUD", "Rig");
        session.pump_outbound();

        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"games/connect","payload":{"game":"OtherMUD"}}"#,
        );
        assert_eq!(
            result,
            Some(RelayEvent::GameConnected {
                game: "OtherMUD".into()
            })
        );
        assert!(session.presence().players("OtherMUD").unwrap().is_empty());
        assert_eq!(session.queued_outbound(), 1);

        session.pump_outbound();
        let envelope = Envelope::decode(handle.sent().last().unwrap()).unwrap();
        assert_eq!(envelope.event.as_deref(), Some("players/status"));
    }

    #[test]
    fn test_game_disconnect_removes_entry() {
        let (mut session, handle) = session_with(&[]);
        session.presence.sign_in("OtherMUD", "Rig");

        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"games/disconnect","payload":{"game":"OtherMUD"}}"#,
        );
        assert_eq!(
            result,
            Some(RelayEvent::GameDisconnected {
                game: "OtherMUD".into()
            })
        );
        assert!(!session.presence().contains("OtherMUD"));
    }

    #[test]
    fn test_players_status_replaces_cache_entry() {
        let (mut session, handle) = session_with(&[]);
        session.players_status_query(None);
        let reference = last_ref(&handle, &mut session);

        let frame = format!(
            r#"{{"event":"players/status","status":"success","ref":"{}","payload":{{"game":"OtherMUD","players":["rig","RIG","zed"]}}}}"#,
            reference
        );
        assert!(feed(&mut session, &handle, &frame).is_none());

        let players = session.presence().players("OtherMUD").unwrap();
        assert_eq!(
            players.iter().cloned().collect::<Vec<_>>(),
            vec!["Rig".to_string(), "Zed".to_string()]
        );

        // Second response for the same query: the ref is already gone,
        // which is tolerated
        let frame = r#"{"event":"players/status","status":"success","ref":"already-popped","payload":{"game":"ThirdMUD","players":["Ada"]}}"#;
        assert!(feed(&mut session, &handle, frame).is_none());
        assert!(session.presence().contains("ThirdMUD"));
    }

    #[test]
    fn test_games_status_success_returns_report() {
        let (mut session, handle) = session_with(&[]);
        session.games_status_query(Some("OtherMUD"));
        let reference = last_ref(&handle, &mut session);

        let frame = format!(
            r#"{{"event":"games/status","status":"success","ref":"{}","payload":{{"game":"OtherMUD","display_name":"Other MUD","description":"A place","homepage_url":"https://other.example","user_agent":"OtherLib 1.0","connections":3,"supports":["channels","tells"],"players_online_count":12}}}}"#,
            reference
        );
        let result = feed(&mut session, &handle, &frame);
        match result {
            Some(RelayEvent::GameStatus(report)) => {
                assert_eq!(report.game, "OtherMUD");
                assert_eq!(report.display_name, "Other MUD");
                assert_eq!(report.connections, 3);
                assert_eq!(report.supports, vec!["channels", "tells"]);
                assert_eq!(report.players_online_count, 12);
            }
            other => panic!("expected GameStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_games_status_failure_returns_game_and_error() {
        let (mut session, handle) = session_with(&[]);
        session.games_status_query(Some("GhostMUD"));
        let reference = last_ref(&handle, &mut session);

        let frame = format!(
            r#"{{"event":"games/status","status":"failure","ref":"{}","error":"unknown game"}}"#,
            reference
        );
        let result = feed(&mut session, &handle, &frame);
        assert_eq!(
            result,
            Some(RelayEvent::GameStatusFailed {
                game: Some("GhostMUD".into()),
                error: "unknown game".into(),
            })
        );
    }

    #[test]
    fn test_tell_failure_reports_bounce_to_sender() {
        let (mut session, handle) = session_with(&[]);
        session.send_tell("Alice", "Bob", "OtherMUD", "hello");
        let reference = last_ref(&handle, &mut session);

        let frame = format!(
            r#"{{"event":"tells/send","status":"failure","ref":"{}","error":"player offline"}}"#,
            reference
        );
        let result = feed(&mut session, &handle, &frame);
        assert_eq!(
            result,
            Some(RelayEvent::TellFailed {
                from_name: "Alice".into(),
                to_name: "Bob".into(),
                to_game: "OtherMUD".into(),
                error: "player offline".into(),
            })
        );
    }

    #[test]
    fn test_tell_success_is_discarded() {
        let (mut session, handle) = session_with(&[]);
        session.send_tell("Alice", "Bob", "OtherMUD", "hello");
        let reference = last_ref(&handle, &mut session);

        let frame = format!(
            r#"{{"event":"tells/send","status":"success","ref":"{}"}}"#,
            reference
        );
        assert!(feed(&mut session, &handle, &frame).is_none());
        // Only failures pop; the entry is reclaimed at disconnect
        assert_eq!(session.pending.len(), 1);
    }

    #[test]
    fn test_tell_receive_returns_delivery_fields() {
        let (mut session, handle) = session_with(&[]);
        let result = feed(
            &mut session,
            &handle,
            r#"{"event":"tells/receive","payload":{"from_name":"Rig","from_game":"OtherMUD","to_name":"Ada","sent_at":"2026-08-06T12:00:00Z","message":"hi"}}"#,
        );
        assert_eq!(
            result,
            Some(RelayEvent::TellReceived {
                from_name: "Rig".into(),
                from_game: "OtherMUD".into(),
                to_name: "Ada".into(),
                sent_at: "2026-08-06T12:00:00Z".into(),
                message: "hi".into(),
            })
        );
    }

    #[test]
    fn test_channel_send_confirmation_pops_entry() {
        let (mut session, handle) = session_with(&["gossip"]);
        session.mark_subscribed("gossip", true);
        session.send_channel_message("Ada", "gossip", "hi");
        let reference = last_ref(&handle, &mut session);
        assert_eq!(session.pending.len(), 1);

        let frame = format!(
            r#"{{"event":"channels/send","status":"success","ref":"{}"}}"#,
            reference
        );
        assert!(feed(&mut session, &handle, &frame).is_none());
        assert!(session.pending.is_empty());
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let (mut session, handle) = session_with(&[]);
        assert!(feed(&mut session, &handle, r#"{"event":"wizardry/cast"}"#).is_none());
    }

    #[test]
    fn test_missing_event_field_is_ignored() {
        let (mut session, handle) = session_with(&[]);
        assert!(feed(&mut session, &handle, r#"{"status":"success"}"#).is_none());
    }
}
