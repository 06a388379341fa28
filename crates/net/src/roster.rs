//! Host capability seam: the embedding game's player registry.

/// What the session needs from the embedding game server. The session
/// itself only enumerates players (heartbeat replies); `deliver` is
/// consumed by the host when it fans normalized events out to players.
pub trait PlayerRoster {
    /// Display names of currently connected local players.
    fn online_players(&self) -> Vec<String>;

    /// Deliver a text line to a local player. Returns `false` when the
    /// player is not connected.
    fn deliver(&self, player: &str, text: &str) -> bool;
}
