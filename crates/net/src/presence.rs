//! Presence cache: which players are online in which remote games.
//!
//! A game with an entry (even an empty one) is believed to be connected
//! to the network. Player names are case-normalized and unique per game.

use std::collections::{BTreeSet, HashMap};

use crate::protocol::normalize_name;

#[derive(Debug, Default)]
pub struct PresenceCache {
    games: HashMap<String, BTreeSet<String>>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a foreign player signing in. Creates the game's entry if
    /// this is the first we hear of it.
    pub fn sign_in(&mut self, game: &str, name: &str) {
        self.games
            .entry(game.to_string())
            .or_default()
            .insert(normalize_name(name));
    }

    /// Record a foreign player signing out. The game's entry stays (the
    /// game itself is still connected).
    pub fn sign_out(&mut self, game: &str, name: &str) {
        if let Some(players) = self.games.get_mut(game) {
            players.remove(&normalize_name(name));
        }
    }

    /// Replace a game's entry with a status-refresh player list,
    /// deduplicated and normalized.
    pub fn replace<I, S>(&mut self, game: &str, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let players = names
            .into_iter()
            .map(|name| normalize_name(name.as_ref()))
            .collect();
        self.games.insert(game.to_string(), players);
    }

    /// Mark a game as connected with no players known yet.
    pub fn reset(&mut self, game: &str) {
        self.games.insert(game.to_string(), BTreeSet::new());
    }

    /// Forget a game entirely (it left the network).
    pub fn remove_game(&mut self, game: &str) -> bool {
        self.games.remove(game).is_some()
    }

    pub fn contains(&self, game: &str) -> bool {
        self.games.contains_key(game)
    }

    pub fn players(&self, game: &str) -> Option<&BTreeSet<String>> {
        self.games.get(game)
    }

    pub fn games(&self) -> impl Iterator<Item = &str> {
        self.games.keys().map(|g| g.as_str())
    }

    pub fn clear(&mut self) {
        self.games.clear();
    }
}
