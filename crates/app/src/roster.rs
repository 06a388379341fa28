//! Stand-in player roster for the reference host.

use tracing::info;

use trellis_net::PlayerRoster;

/// In-memory roster seeded from settings. An embedding game server would
/// implement [`PlayerRoster`] against its real connection registry; here
/// deliveries go to the log.
#[derive(Debug, Default)]
pub struct LocalRoster {
    players: Vec<String>,
}

impl LocalRoster {
    pub fn new(players: Vec<String>) -> Self {
        Self { players }
    }
}

impl PlayerRoster for LocalRoster {
    fn online_players(&self) -> Vec<String> {
        self.players.clone()
    }

    fn deliver(&self, player: &str, text: &str) -> bool {
        if self
            .players
            .iter()
            .any(|p| p.eq_ignore_ascii_case(player))
        {
            info!(player, "{}", text);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_matches_case_insensitively() {
        let roster = LocalRoster::new(vec!["Ada".into()]);
        assert!(roster.deliver("ada", "hello"));
        assert!(!roster.deliver("Grace", "hello"));
    }

    #[test]
    fn test_online_players() {
        let roster = LocalRoster::new(vec!["Ada".into(), "Grace".into()]);
        assert_eq!(roster.online_players(), vec!["Ada", "Grace"]);
    }
}
