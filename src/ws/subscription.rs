//! Per-connection subscription manager.
//!
//! Tracks which feeds a WebSocket client is subscribed to and provides
//! server-side event filtering.

use std::collections::HashSet;

use serde_json::Value;

use crate::domain::FeedId;

/// Feed selection parsed from a command's `feed_ids`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FeedSelection {
    /// Explicit feed IDs.
    pub ids: Vec<FeedId>,
    /// `true` if `"*"` was listed.
    pub wildcard: bool,
}

impl FeedSelection {
    /// Parses `feed_ids` entries: integers, numeric strings, or `"*"`.
    ///
    /// # Errors
    ///
    /// Returns the first entry that is none of those.
    pub fn parse(values: &[Value]) -> Result<Self, String> {
        let mut selection = Self::default();
        for value in values {
            match value {
                Value::Number(n) => match n.as_i64() {
                    Some(id) => selection.ids.push(FeedId::new(id)),
                    None => return Err(format!("invalid feed id: {n}")),
                },
                Value::String(s) if s == "*" => selection.wildcard = true,
                Value::String(s) => match s.parse::<i64>() {
                    Ok(id) => selection.ids.push(FeedId::new(id)),
                    Err(_) => return Err(format!("invalid feed id: {s}")),
                },
                other => return Err(format!("invalid feed id: {other}")),
            }
        }
        Ok(selection)
    }
}

/// Manages the set of feed subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed feed IDs. If `subscribe_all` is true, this set is ignored.
    feed_ids: HashSet<FeedId>,
    /// Whether the client subscribes to all feeds (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the selected feeds. `"*"` enables the wildcard.
    pub fn subscribe(&mut self, selection: &FeedSelection) {
        if selection.wildcard {
            self.subscribe_all = true;
        }
        self.feed_ids.extend(selection.ids.iter().copied());
    }

    /// Removes the selected feeds. `"*"` disables the wildcard.
    pub fn unsubscribe(&mut self, selection: &FeedSelection) {
        if selection.wildcard {
            self.subscribe_all = false;
        }
        for id in &selection.ids {
            self.feed_ids.remove(id);
        }
    }

    /// Returns `true` if the given feed matches the subscription filter.
    #[must_use]
    pub fn matches(&self, feed_id: FeedId) -> bool {
        self.subscribe_all || self.feed_ids.contains(&feed_id)
    }

    /// Returns the number of explicitly subscribed feeds.
    #[must_use]
    pub fn count(&self) -> usize {
        self.feed_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn selection(values: Value) -> FeedSelection {
        let Value::Array(values) = values else {
            panic!("expected an array");
        };
        let Ok(selection) = FeedSelection::parse(&values) else {
            panic!("selection should parse");
        };
        selection
    }

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(FeedId::new(1)));
    }

    #[test]
    fn numbers_and_numeric_strings_select_feeds() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&selection(json!([1, "2"])));
        assert!(mgr.matches(FeedId::new(1)));
        assert!(mgr.matches(FeedId::new(2)));
        assert!(!mgr.matches(FeedId::new(3)));
        assert_eq!(mgr.count(), 2);
    }

    #[test]
    fn wildcard_comes_and_goes() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&selection(json!(["*"])));
        assert!(mgr.matches(FeedId::new(42)));
        mgr.unsubscribe(&selection(json!(["*"])));
        assert!(!mgr.is_subscribed_all());
        assert!(!mgr.matches(FeedId::new(42)));
    }

    #[test]
    fn unsubscribe_removes_feed() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&selection(json!([7])));
        mgr.unsubscribe(&selection(json!([7])));
        assert!(!mgr.matches(FeedId::new(7)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(FeedSelection::parse(&[json!("abc")]).is_err());
        assert!(FeedSelection::parse(&[json!(true)]).is_err());
    }
}
