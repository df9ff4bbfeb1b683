//! Persisted conversation history replayed to `/query` as context.

use std::sync::Arc;

use chrono::Utc;
use pagechat_shared::{Message, PageChatError, Result};
use pagechat_storage::KvStore;
use tracing::{debug, warn};

/// Store key holding the ledger as a JSON array of messages.
pub const HISTORY_KEY: &str = "pagechat.sessionHistory";
/// Key used by older clients; read only when [`HISTORY_KEY`] is absent.
pub const LEGACY_HISTORY_KEY: &str = "sessionHistory";
/// RFC 3339 timestamp of the last ledger mutation.
pub const LAST_ACTIVITY_KEY: &str = "pagechat.lastActivity";

/// Ordered conversation history backed by a [`KvStore`].
///
/// Mutations happen in memory; [`SessionLedger::persist`] writes the whole
/// ledger back. Only successful question/answer pairs are ever appended.
pub struct SessionLedger {
    store: Arc<dyn KvStore>,
    messages: Vec<Message>,
    /// Maximum retained turns (user + assistant pairs); 0 means unbounded.
    max_turns: usize,
}

impl std::fmt::Debug for SessionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLedger")
            .field("messages", &self.messages.len())
            .field("max_turns", &self.max_turns)
            .finish_non_exhaustive()
    }
}

impl SessionLedger {
    /// Load the ledger, falling back to the legacy key and then to empty.
    pub async fn load(store: Arc<dyn KvStore>, max_turns: usize) -> Result<Self> {
        let raw = match store.get(HISTORY_KEY).await? {
            Some(raw) => Some((HISTORY_KEY, raw)),
            None => store
                .get(LEGACY_HISTORY_KEY)
                .await?
                .map(|raw| (LEGACY_HISTORY_KEY, raw)),
        };

        let messages = match raw {
            Some((key, raw)) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) => {
                    debug!(key, messages = messages.len(), "ledger loaded");
                    messages
                }
                Err(e) => {
                    warn!(key, error = %e, "ignoring undecodable session history");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut ledger = Self {
            store,
            messages,
            max_turns,
        };
        ledger.enforce_cap();
        Ok(ledger)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append one question/answer pair.
    pub fn append_turn(&mut self, question: &str, answer: &str) {
        self.messages.push(Message::user(question));
        self.messages.push(Message::assistant(answer));
        self.enforce_cap();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Write the full ledger and the activity timestamp to the store.
    pub async fn persist(&self) -> Result<()> {
        let json = serde_json::to_string(&self.messages)
            .map_err(|e| PageChatError::Storage(format!("failed to encode history: {e}")))?;
        self.store.set(HISTORY_KEY, &json).await?;
        self.store
            .set(LAST_ACTIVITY_KEY, &Utc::now().to_rfc3339())
            .await?;
        debug!(messages = self.messages.len(), "ledger persisted");
        Ok(())
    }

    fn enforce_cap(&mut self) {
        if self.max_turns == 0 {
            return;
        }
        let limit = self.max_turns.saturating_mul(2);
        if self.messages.len() > limit {
            let excess = self.messages.len() - limit;
            self.messages.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagechat_shared::Role;
    use pagechat_storage::MemoryStore;

    async fn load(store: MemoryStore, max_turns: usize) -> SessionLedger {
        SessionLedger::load(Arc::new(store), max_turns).await.unwrap()
    }

    #[tokio::test]
    async fn prefers_canonical_key() {
        let store = MemoryStore::new()
            .with_entry(HISTORY_KEY, r#"[{"role":"user","content":"new"}]"#)
            .with_entry(LEGACY_HISTORY_KEY, r#"[{"role":"user","content":"old"}]"#);
        let ledger = load(store, 0).await;
        assert_eq!(ledger.messages(), &[Message::user("new")]);
    }

    #[tokio::test]
    async fn falls_back_to_legacy_key() {
        let store = MemoryStore::new().with_entry(
            LEGACY_HISTORY_KEY,
            r#"[{"role":"user","content":"q"},{"role":"assistant","content":"a"}]"#,
        );
        let ledger = load(store, 0).await;
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.messages()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn missing_or_garbage_history_is_empty() {
        assert!(load(MemoryStore::new(), 0).await.is_empty());
        let garbage = MemoryStore::new().with_entry(HISTORY_KEY, "{not json");
        assert!(load(garbage, 0).await.is_empty());
    }

    #[tokio::test]
    async fn persist_writes_history_and_activity() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = SessionLedger::load(store.clone(), 0).await.unwrap();

        ledger.append_turn("What?", "That.");
        ledger.persist().await.unwrap();

        let saved = store.get(HISTORY_KEY).await.unwrap().unwrap();
        assert_eq!(
            saved,
            r#"[{"role":"user","content":"What?"},{"role":"assistant","content":"That."}]"#
        );
        let stamp = store.get(LAST_ACTIVITY_KEY).await.unwrap().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());

        let reloaded = SessionLedger::load(store, 0).await.unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn cleared_ledger_shadows_legacy_history() {
        let store = Arc::new(
            MemoryStore::new()
                .with_entry(LEGACY_HISTORY_KEY, r#"[{"role":"user","content":"old"}]"#),
        );
        let mut ledger = SessionLedger::load(store.clone(), 0).await.unwrap();
        assert_eq!(ledger.len(), 1);

        ledger.clear();
        ledger.persist().await.unwrap();

        assert!(SessionLedger::load(store, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retention_drops_oldest_turns() {
        let mut ledger = load(MemoryStore::new(), 2).await;
        ledger.append_turn("q1", "a1");
        ledger.append_turn("q2", "a2");
        ledger.append_turn("q3", "a3");

        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.messages()[0], Message::user("q2"));
        assert_eq!(ledger.messages()[3], Message::assistant("a3"));
    }
}
