use std::sync::{Arc, Mutex, MutexGuard};

use elara_common::Turn;
use indexmap::IndexMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

type SessionTurns = Arc<AsyncMutex<Vec<Turn>>>;

/// In-memory conversation history keyed by session id.
///
/// Each session owns its own async mutex. Holding a [`SessionGuard`] for the
/// whole exchange serializes requests for the same session in arrival order,
/// while unrelated sessions proceed in parallel. The map itself is ordered by
/// recency: touching a session moves it to the back, and inserting a new one
/// past `capacity` evicts from the front.
pub struct SessionStore {
    sessions: Mutex<IndexMap<String, SessionTurns>>,
    capacity: usize,
    max_retained: usize,
}

impl SessionStore {
    pub fn new(capacity: usize, max_retained: usize) -> Self {
        info!(
            "session store ready (capacity {}, {} turns retained per session)",
            capacity, max_retained
        );
        Self {
            sessions: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
            max_retained: max_retained.max(2),
        }
    }

    fn map(&self) -> MutexGuard<'_, IndexMap<String, SessionTurns>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the session's turn list, creating it if needed, and mark it most recently used.
    fn touch_or_create(&self, session_id: &str) -> SessionTurns {
        let mut map = self.map();
        if let Some(turns) = map.shift_remove(session_id) {
            map.insert(session_id.to_string(), Arc::clone(&turns));
            return turns;
        }

        // Every clone of a session's Arc is taken under the map lock, so a
        // strong count of 1 means no exchange holds or is waiting on it.
        while map.len() >= self.capacity {
            let Some(index) = map.values().position(|turns| Arc::strong_count(turns) == 1) else {
                warn!(
                    "all {} sessions are in use; exceeding capacity {} until one is released",
                    map.len(),
                    self.capacity
                );
                break;
            };
            if let Some((evicted, _)) = map.shift_remove_index(index) {
                debug!("evicting least recently used session {}", evicted);
            }
        }

        let turns: SessionTurns = Arc::new(AsyncMutex::new(Vec::new()));
        map.insert(session_id.to_string(), Arc::clone(&turns));
        turns
    }

    /// Look up an existing session without creating it.
    fn touch(&self, session_id: &str) -> Option<SessionTurns> {
        let mut map = self.map();
        let turns = map.shift_remove(session_id)?;
        map.insert(session_id.to_string(), Arc::clone(&turns));
        Some(turns)
    }

    /// Acquire exclusive access to a session for the duration of an exchange.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        let turns = self.touch_or_create(session_id);
        SessionGuard {
            turns: turns.lock_owned().await,
            max_retained: self.max_retained,
        }
    }

    pub async fn append(&self, session_id: &str, turn: Turn) {
        self.lock(session_id).await.push(turn);
    }

    /// The last `window` turns of a session, oldest first. Unknown sessions are empty.
    pub async fn recent(&self, session_id: &str, window: usize) -> Vec<Turn> {
        let Some(turns) = self.touch(session_id) else {
            return Vec::new();
        };
        let guard = turns.lock().await;
        tail(&guard, window)
    }

    /// Empty a session's history. Clearing an unknown session is a no-op.
    pub async fn clear(&self, session_id: &str) {
        if let Some(turns) = self.touch(session_id) {
            turns.lock().await.clear();
            info!("cleared session {}", session_id);
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.map().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

/// Exclusive handle on one session's history.
pub struct SessionGuard {
    turns: OwnedMutexGuard<Vec<Turn>>,
    max_retained: usize,
}

impl SessionGuard {
    pub fn recent(&self, window: usize) -> Vec<Turn> {
        tail(&self.turns, window)
    }

    /// Append a turn, dropping the oldest pair once the retention cap is exceeded.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.turns.len() > self.max_retained {
            let excess = self.turns.len() - self.max_retained;
            // Keep the sequence starting on a user turn.
            let count = (excess + excess % 2).min(self.turns.len());
            self.turns.drain(..count);
        }
    }
}

fn tail(turns: &[Turn], window: usize) -> Vec<Turn> {
    let start = turns.len().saturating_sub(window);
    turns[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use elara_common::TurnRole;
    use std::time::Duration;

    fn store() -> SessionStore {
        SessionStore::new(16, 50)
    }

    #[tokio::test]
    async fn append_then_recent_round_trip() {
        let store = store();
        store.append("s1", Turn::user("hello")).await;
        store.append("s1", Turn::assistant("hi there")).await;

        let recent = store.recent("s1", 2).await;
        assert_eq!(recent, vec![Turn::user("hello"), Turn::assistant("hi there")]);
    }

    #[tokio::test]
    async fn recent_returns_most_recent_window_oldest_first() {
        let store = store();
        for i in 0..5 {
            store.append("s1", Turn::user(format!("q{i}"))).await;
            store.append("s1", Turn::assistant(format!("a{i}"))).await;
        }

        let recent = store.recent("s1", 6).await;
        let contents: Vec<&str> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q2", "a2", "q3", "a3", "q4", "a4"]);
        assert_eq!(recent[0].role, TurnRole::User);
    }

    #[tokio::test]
    async fn recent_on_short_session_returns_everything() {
        let store = store();
        store.append("s1", Turn::user("only")).await;
        assert_eq!(store.recent("s1", 6).await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_session_reads_empty_without_creating() {
        let store = store();
        assert!(store.recent("missing", 6).await.is_empty());
        assert!(!store.contains("missing"));
    }

    #[tokio::test]
    async fn clear_empties_and_is_idempotent() {
        let store = store();
        store.append("s1", Turn::user("hello")).await;
        store.append("s1", Turn::assistant("hi")).await;

        store.clear("s1").await;
        assert!(store.recent("s1", 6).await.is_empty());

        store.clear("s1").await;
        store.clear("never-existed").await;
        assert!(store.recent("s1", 6).await.is_empty());
        assert!(!store.contains("never-existed"));
    }

    #[tokio::test]
    async fn least_recently_used_session_is_evicted() {
        let store = SessionStore::new(2, 50);
        store.append("a", Turn::user("a")).await;
        store.append("b", Turn::user("b")).await;

        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(store.recent("a", 1).await.len(), 1);
        store.append("c", Turn::user("c")).await;

        assert_eq!(store.len(), 2);
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
    }

    #[tokio::test]
    async fn retention_cap_drops_oldest_pairs() {
        let store = SessionStore::new(4, 4);
        for i in 0..3 {
            store.append("s1", Turn::user(format!("q{i}"))).await;
            store.append("s1", Turn::assistant(format!("a{i}"))).await;
        }

        let all = store.recent("s1", 100).await;
        let contents: Vec<&str> = all.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn guard_serializes_same_session_in_arrival_order() {
        let store = Arc::new(store());

        let mut first = store.lock("s1").await;

        let second_store = Arc::clone(&store);
        let second = tokio::spawn(async move {
            let mut guard = second_store.lock("s1").await;
            guard.push(Turn::user("second"));
        });

        // Give the spawned task time to queue on the session lock.
        tokio::time::sleep(Duration::from_millis(20)).await;
        first.push(Turn::user("first"));
        drop(first);

        second.await.unwrap();
        let turns = store.recent("s1", 10).await;
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn locked_session_survives_eviction_pressure() {
        let store = Arc::new(SessionStore::new(1, 50));
        let mut first = store.lock("a").await;

        store.append("b", Turn::user("other")).await;
        assert!(store.contains("a"));

        // Same-session requests still queue behind the held guard.
        let waiting = tokio::time::timeout(Duration::from_millis(100), store.lock("a")).await;
        assert!(waiting.is_err());

        first.push(Turn::user("hello"));
        first.push(Turn::assistant("hi"));
        drop(first);

        let turns = store.recent("a", 10).await;
        assert_eq!(turns, vec![Turn::user("hello"), Turn::assistant("hi")]);

        // Once released, idle sessions are evicted again on the next insert.
        store.append("c", Turn::user("c")).await;
        assert_eq!(store.len(), 1);
        assert!(store.contains("c"));
    }

    #[tokio::test]
    async fn different_sessions_do_not_block_each_other() {
        let store = store();
        let _held = store.lock("s1").await;
        let other = tokio::time::timeout(Duration::from_millis(100), store.lock("s2")).await;
        assert!(other.is_ok());
    }
}
