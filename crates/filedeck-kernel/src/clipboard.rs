//! Per-session virtual clipboard.
//!
//! Cut and copy only stage virtual paths; nothing touches the disk until a
//! paste drains the entry into a job.

use std::time::SystemTime;

use dashmap::DashMap;
use filedeck_types::{ClipboardAction, OperationResult};

/// What a session staged with its last cut or copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEntry {
    pub session_key: String,
    pub items: Vec<String>,
    pub action: ClipboardAction,
    pub created_at: SystemTime,
}

/// One clipboard entry per session key.
#[derive(Debug, Default)]
pub struct ClipboardStore {
    entries: DashMap<String, ClipboardEntry>,
}

impl ClipboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage items to be moved. Replaces any previous entry.
    pub fn cut(&self, session: &str, items: Vec<String>) -> OperationResult {
        self.stage(session, items, ClipboardAction::Move)
    }

    /// Stage items to be copied. Replaces any previous entry.
    pub fn copy(&self, session: &str, items: Vec<String>) -> OperationResult {
        self.stage(session, items, ClipboardAction::Copy)
    }

    fn stage(&self, session: &str, items: Vec<String>, action: ClipboardAction) -> OperationResult {
        let count = items.len();
        let entry = ClipboardEntry {
            session_key: session.to_string(),
            items,
            action,
            created_at: SystemTime::now(),
        };
        tracing::debug!(session = %session, action = %action, count, "clipboard staged");
        self.entries.insert(session.to_string(), entry);

        let noun = if count == 1 { "item" } else { "items" };
        let verb = match action {
            ClipboardAction::Move => "cut",
            ClipboardAction::Copy => "copied",
        };
        OperationResult::success(format!("{verb} {count} {noun} to the virtual clipboard"))
    }

    /// Remove and return the session's entry.
    pub fn take(&self, session: &str) -> Option<ClipboardEntry> {
        self.entries.remove(session).map(|(_, entry)| entry)
    }

    /// Remove and return the session's entry if it stages at least one item.
    ///
    /// An empty entry stays where it is.
    pub fn take_nonempty(&self, session: &str) -> Option<ClipboardEntry> {
        self.entries
            .remove_if(session, |_, entry| !entry.items.is_empty())
            .map(|(_, entry)| entry)
    }

    /// Snapshot of the session's entry.
    pub fn peek(&self, session: &str) -> Option<ClipboardEntry> {
        self.entries.get(session).map(|e| e.value().clone())
    }

    /// Drop the session's entry.
    pub fn clear(&self, session: &str) {
        self.entries.remove(session);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedeck_types::ResultCode;

    fn items(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cut_message() {
        let store = ClipboardStore::new();
        let result = store.cut("s1", items(&["/docs/a.txt", "/docs/b.txt"]));
        assert_eq!(result.code, ResultCode::Success);
        assert_eq!(result.message, "cut 2 items to the virtual clipboard");
    }

    #[test]
    fn test_copy_single_item_message() {
        let store = ClipboardStore::new();
        let result = store.copy("s1", items(&["/docs/a.txt"]));
        assert_eq!(result.message, "copied 1 item to the virtual clipboard");
    }

    #[test]
    fn test_second_cut_replaces_first() {
        let store = ClipboardStore::new();
        store.cut("s1", items(&["/docs/a.txt"]));
        store.cut("s1", items(&["/docs/b.txt"]));
        let entry = store.peek("s1").unwrap();
        assert_eq!(entry.items, items(&["/docs/b.txt"]));
        assert_eq!(entry.action, ClipboardAction::Move);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = ClipboardStore::new();
        store.cut("s1", items(&["/docs/a.txt"]));
        store.copy("s2", items(&["/docs/b.txt"]));
        assert_eq!(store.len(), 2);
        assert_eq!(store.take("s1").unwrap().action, ClipboardAction::Move);
        assert!(store.peek("s1").is_none());
        assert_eq!(store.peek("s2").unwrap().action, ClipboardAction::Copy);
    }

    #[test]
    fn test_take_nonempty_leaves_empty_entry() {
        let store = ClipboardStore::new();
        store.copy("s1", Vec::new());
        assert!(store.take_nonempty("s1").is_none());
        assert!(store.peek("s1").is_some());
        assert!(store.take_nonempty("nobody").is_none());

        store.cut("s1", items(&["/docs/a.txt"]));
        assert!(store.take_nonempty("s1").is_some());
        assert!(store.is_empty());
    }
}
