//! Correlation of outbound requests to their asynchronous responses.
//!
//! Requests that expect a response carry a generated `ref`; the relay
//! echoes it back whenever it answers. Responses routinely reference refs
//! the table no longer holds (one players/status query fans out to one
//! response per connected game, disconnects abandon what is in flight),
//! so a missing entry is a benign no-op, never an error.

use std::collections::HashMap;

/// An outbound request awaiting its response, reduced to the fields the
/// response handlers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingRequest {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    SignIn { name: String },
    SignOut { name: String },
    ChannelSend { channel: String },
    Tell {
        from_name: String,
        to_name: String,
        to_game: String,
    },
    GamesStatus { game: Option<String> },
    PlayersStatus { game: Option<String> },
}

/// Pending-request table keyed by correlation ref.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: HashMap<String, PendingRequest>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a request until its response arrives. Refs are random
    /// 128-bit identifiers, so collisions are not handled.
    pub fn record(&mut self, reference: String, request: PendingRequest) {
        self.pending.insert(reference, request);
    }

    /// Remove and return the request a response refers to, if it is
    /// still held.
    pub fn resolve(&mut self, reference: &str) -> Option<PendingRequest> {
        self.pending.remove(reference)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Abandon everything in flight (connection teardown).
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_removes_entry() {
        let mut table = CorrelationTable::new();
        table.record(
            "r-1".into(),
            PendingRequest::Subscribe {
                channel: "gossip".into(),
            },
        );

        let request = table.resolve("r-1");
        assert_eq!(
            request,
            Some(PendingRequest::Subscribe {
                channel: "gossip".into()
            })
        );
        assert!(table.is_empty());

        // Second resolve of the same ref is a no-op
        assert_eq!(table.resolve("r-1"), None);
    }

    #[test]
    fn test_unknown_ref_is_benign() {
        let mut table = CorrelationTable::new();
        assert_eq!(table.resolve("never-sent"), None);
    }

    #[test]
    fn test_clear_abandons_in_flight() {
        let mut table = CorrelationTable::new();
        table.record("a".into(), PendingRequest::GamesStatus { game: None });
        table.record(
            "b".into(),
            PendingRequest::SignIn { name: "Ada".into() },
        );
        assert_eq!(table.len(), 2);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.resolve("a"), None);
    }
}
