//! Conversation memory.
//!
//! Histories are keyed by a caller-chosen session id. Each session keeps at
//! most `max_turns` turns; the oldest turns are dropped first, and a reply
//! whose question was dropped goes with it. Callers that send no session id
//! all share [`DEFAULT_SESSION`].
//!
//! Nothing is persisted. Restarting the process forgets every session.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::models::{Role, Turn};

pub const DEFAULT_SESSION: &str = "default";

pub struct ConversationMemory {
    max_turns: usize,
    sessions: Mutex<HashMap<String, VecDeque<Turn>>>,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(2),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Append a single turn to `session`.
    pub fn append(&self, session: &str, role: Role, text: impl Into<String>) {
        self.push_all(session, [Turn {
            role,
            text: text.into(),
        }]);
    }

    /// Append a user turn and its reply under one lock, so the pair stays
    /// adjacent even when requests on the same session overlap.
    pub fn append_exchange(&self, session: &str, user: &str, assistant: &str) {
        self.push_all(session, [Turn::user(user), Turn::assistant(assistant)]);
    }

    /// Snapshot of the session's turns, oldest first, or `None` when the
    /// session has no history yet.
    pub fn history(&self, session: &str) -> Option<Vec<Turn>> {
        let sessions = self.lock();
        sessions
            .get(session)
            .filter(|turns| !turns.is_empty())
            .map(|turns| turns.iter().cloned().collect())
    }

    fn push_all<const N: usize>(&self, session: &str, turns: [Turn; N]) {
        let mut sessions = self.lock();
        let history = sessions.entry(session.to_string()).or_default();
        for turn in turns {
            history.push_back(turn);
        }
        while history.len() > self.max_turns {
            history.pop_front();
        }
        // Never start a history with an orphaned reply.
        while history
            .front()
            .is_some_and(|turn| turn.role == Role::Assistant)
        {
            history.pop_front();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Turn>>> {
        // Poisoned: keep using the inner map.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Render turns as `User: …` / `Assistant: …` lines.
pub fn render(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_session_has_no_history() {
        let memory = ConversationMemory::new(10);
        assert!(memory.history(DEFAULT_SESSION).is_none());
    }

    #[test]
    fn test_exchange_is_recorded_in_order() {
        let memory = ConversationMemory::new(10);
        memory.append_exchange(DEFAULT_SESSION, "Hi", "Hello there!");
        let turns = memory.history(DEFAULT_SESSION).unwrap();
        assert_eq!(
            turns,
            vec![Turn::user("Hi"), Turn::assistant("Hello there!")]
        );
        assert_eq!(render(&turns), "User: Hi\nAssistant: Hello there!");
    }

    #[test]
    fn test_oldest_turns_evicted() {
        let memory = ConversationMemory::new(4);
        for i in 0..3 {
            memory.append_exchange("s", &format!("q{}", i), &format!("a{}", i));
        }
        let turns = memory.history("s").unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0], Turn::user("q1"));
        assert_eq!(turns[3], Turn::assistant("a2"));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let memory = ConversationMemory::new(10);
        memory.append("alice", Role::User, "I like tea");
        memory.append("bob", Role::User, "I like coffee");
        let alice = memory.history("alice").unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].text, "I like tea");
        assert!(memory.history("carol").is_none());
    }

    #[test]
    fn test_odd_limit_evicts_whole_exchange() {
        let memory = ConversationMemory::new(3);
        memory.append_exchange("s", "q0", "a0");
        memory.append_exchange("s", "q1", "a1");
        let turns = memory.history("s").unwrap();
        assert_eq!(turns, vec![Turn::user("q1"), Turn::assistant("a1")]);
        assert!(render(&turns).starts_with("User: q1"));
    }
}
