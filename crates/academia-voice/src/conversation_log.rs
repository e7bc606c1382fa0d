//! Best-effort durable log of voice turns, scoped per signed-in user.
//!
//! The session never waits on storage: turns go into a one-way queue and a
//! background worker writes them. Write failures are logged and dropped.

use crate::error::VoiceResult;
use crate::turn::Turn;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "voice/";
const TREE_NAME: &str = "voice_turns";

/// Who the session belongs to. Guests are never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserScope {
    Guest,
    User(String),
}

/// One persisted turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub user_id: String,
    /// Activation timestamp (ms); strictly increasing per log writer.
    pub session_key: u64,
    /// Position of the turn within its session.
    pub sequence: u32,
    pub turn: Turn,
}

impl LogEntry {
    /// `voice/{user}/{session:020}/{sequence:08}`: lexical order = chronological order.
    pub fn key(&self) -> String {
        format!(
            "{}{}/{:020}/{:08}",
            KEY_PREFIX, self.user_id, self.session_key, self.sequence
        )
    }
}

/// Storage backend behind the log worker.
pub trait ConversationStore: Send + Sync {
    fn append(&self, entry: &LogEntry) -> VoiceResult<()>;
}

/// Sled-backed store.
pub struct SledConversationLog {
    tree: sled::Tree,
}

impl SledConversationLog {
    pub fn open_path<P: AsRef<Path>>(path: P) -> VoiceResult<Self> {
        let db = sled::open(path)?;
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { tree })
    }

    /// All entries for `user_id`, oldest first.
    pub fn entries(&self, user_id: &str) -> VoiceResult<Vec<LogEntry>> {
        let prefix = format!("{}{}/", KEY_PREFIX, user_id);
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(prefix.as_bytes()) {
            let (_key, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}

impl ConversationStore for SledConversationLog {
    fn append(&self, entry: &LogEntry) -> VoiceResult<()> {
        let value = serde_json::to_vec(entry)?;
        self.tree.insert(entry.key().as_bytes(), value)?;
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryConversationLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ConversationStore for MemoryConversationLog {
    fn append(&self, entry: &LogEntry) -> VoiceResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

/// Writer side of the log: cheap to clone, never blocks, never fails.
#[derive(Clone)]
pub struct ConversationLog {
    user_id: String,
    last_session_key: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<LogEntry>,
}

impl ConversationLog {
    /// Spawn the persistence worker. Returns `None` for guests: nothing to write.
    /// Must be called inside a tokio runtime.
    pub fn spawn(scope: UserScope, store: Arc<dyn ConversationStore>) -> Option<Self> {
        let user_id = match scope {
            UserScope::Guest => return None,
            UserScope::User(id) => id,
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<LogEntry>();
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(e) = store.append(&entry) {
                    warn!(target: "academia::voice", key = %entry.key(), error = %e, "conversation log write failed");
                }
            }
            debug!(target: "academia::voice", "conversation log worker stopped");
        });
        Some(Self {
            user_id,
            last_session_key: Arc::new(AtomicU64::new(0)),
            tx,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Open a new session stream keyed by the activation time.
    pub(crate) fn begin_session(&self) -> SessionLog {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let previous = self
            .last_session_key
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(0);
        SessionLog {
            log: self.clone(),
            session_key: now.max(previous + 1),
            next_sequence: 0,
        }
    }
}

/// Turn stream of a single activation.
pub(crate) struct SessionLog {
    log: ConversationLog,
    session_key: u64,
    next_sequence: u32,
}

impl SessionLog {
    pub(crate) fn append(&mut self, turn: &Turn) {
        let entry = LogEntry {
            user_id: self.log.user_id.clone(),
            session_key: self.session_key,
            sequence: self.next_sequence,
            turn: turn.clone(),
        };
        self.next_sequence += 1;
        if self.log.tx.send(entry).is_err() {
            warn!(target: "academia::voice", "conversation log worker gone; turn not persisted");
        }
    }

    #[cfg(test)]
    pub(crate) fn session_key(&self) -> u64 {
        self.session_key
    }
}
