//! Async session store (§4.1) — per-session KV: histories, context, slots,
//! tool outputs, backed here by an in-memory hash-of-fields with an
//! `op_timeout` applied the way a real KV round-trip would be bounded.
//!
//! `SetContextKey` locks only the context sub-map, never the whole
//! session record, so a hot flag write (`tts_interrupted`, `bot_speaking`)
//! never contends with a histories append or a queue drain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::timeout;

use va_domain::{
    summarize_latency_samples, Error, LatencyStageSummary, QueuedUtterance, Result, Session, SessionContext,
    TurnEntry,
};

/// A context key reachable through the field-level fast path. Known flags
/// get their own variant so a set doesn't round-trip through JSON; anything
/// else falls into the free-form `extra` map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKey {
    TtsInterrupted,
    BotSpeaking,
    Greeted,
    CallActive,
    IntakeCompleted,
    Extra(String),
}

impl ContextKey {
    pub fn extra(name: impl Into<String>) -> Self {
        ContextKey::Extra(name.into())
    }
}

/// Which top-level fields of a session changed since the caller's last
/// known versions, as reported by [`SessionStore::refresh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshResult {
    pub context_changed: bool,
    pub histories_changed: bool,
    pub queue_changed: bool,
}

impl RefreshResult {
    pub fn any_changed(&self) -> bool {
        self.context_changed || self.histories_changed || self.queue_changed
    }
}

#[derive(Default)]
struct Versions {
    context: AtomicU64,
    histories: AtomicU64,
    queue: AtomicU64,
}

/// Caller-held bookkeeping from a previous `Load`/`Refresh`, used to
/// compute what changed on the next `Refresh` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionStamp {
    context: u64,
    histories: u64,
    queue: u64,
}

struct SessionRecord {
    context: RwLock<SessionContext>,
    histories: RwLock<HashMap<String, Vec<TurnEntry>>>,
    message_queue: RwLock<std::collections::VecDeque<QueuedUtterance>>,
    latency_samples: RwLock<HashMap<String, Vec<va_domain::LatencySample>>>,
    authenticated: RwLock<bool>,
    active_agent: RwLock<Option<String>>,
    versions: Versions,
    created_at: chrono::DateTime<Utc>,
    updated_at: RwLock<chrono::DateTime<Utc>>,
    ttl: RwLock<Option<Duration>>,
}

impl SessionRecord {
    fn fresh(id: &str) -> Self {
        let _ = id;
        let now = Utc::now();
        Self {
            context: RwLock::new(SessionContext::default()),
            histories: RwLock::new(HashMap::new()),
            message_queue: RwLock::new(std::collections::VecDeque::new()),
            latency_samples: RwLock::new(HashMap::new()),
            authenticated: RwLock::new(false),
            active_agent: RwLock::new(None),
            versions: Versions::default(),
            created_at: now,
            updated_at: RwLock::new(now),
            ttl: RwLock::new(None),
        }
    }

    fn to_session(&self, id: &str) -> Session {
        Session {
            id: id.to_owned(),
            authenticated: *self.authenticated.read(),
            active_agent: self.active_agent.read().clone(),
            histories: self.histories.read().clone(),
            context: self.context.read().clone(),
            message_queue: self.message_queue.read().clone(),
            latency_samples: self.latency_samples.read().clone(),
            created_at: self.created_at,
            updated_at: *self.updated_at.read(),
        }
    }

    fn version_stamp(&self) -> VersionStamp {
        VersionStamp {
            context: self.versions.context.load(Ordering::SeqCst),
            histories: self.versions.histories.load(Ordering::SeqCst),
            queue: self.versions.queue.load(Ordering::SeqCst),
        }
    }

    fn touch(&self) {
        *self.updated_at.write() = Utc::now();
    }
}

/// Async, field-level-atomic session store (§4.1).
pub struct SessionStore {
    records: RwLock<HashMap<String, Arc<SessionRecord>>>,
    op_timeout: Duration,
}

impl SessionStore {
    pub fn new(op_timeout_ms: u64) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            op_timeout: Duration::from_millis(op_timeout_ms),
        }
    }

    fn record(&self, id: &str) -> Arc<SessionRecord> {
        if let Some(r) = self.records.read().get(id) {
            return r.clone();
        }
        let mut records = self.records.write();
        records
            .entry(id.to_owned())
            .or_insert_with(|| Arc::new(SessionRecord::fresh(id)))
            .clone()
    }

    async fn bounded<F, T>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        timeout(self.op_timeout, fut)
            .await
            .map_err(|_| Error::KvTimeout(self.op_timeout.as_millis() as u64))
            .map_err(|e| {
                tracing::warn!(op, "session store operation timed out");
                e
            })
    }

    /// `Load(id) → Session`. Returns a fresh session with invariants
    /// restored (empty histories, default context) if no record exists.
    pub async fn load(&self, id: &str) -> Result<(Session, VersionStamp)> {
        let record = self.record(id);
        self.bounded("load", async {
            (record.to_session(id), record.version_stamp())
        })
        .await
    }

    /// `Persist(Session, ttl?)`. Serializes `histories` and `context` as
    /// the two JSON fields of the session's hash; does not touch the
    /// queue, which callers own and reconcile themselves.
    pub async fn persist(&self, session: &Session, ttl: Option<Duration>) -> Result<()> {
        let record = self.record(&session.id);
        self.bounded("persist", async {
            *record.context.write() = session.context.clone();
            record.versions.context.fetch_add(1, Ordering::SeqCst);
            *record.histories.write() = session.histories.clone();
            record.versions.histories.fetch_add(1, Ordering::SeqCst);
            *record.latency_samples.write() = session.latency_samples.clone();
            *record.authenticated.write() = session.authenticated;
            *record.active_agent.write() = session.active_agent.clone();
            if let Some(t) = ttl {
                *record.ttl.write() = Some(t);
            }
            record.touch();
        })
        .await
        .map(|_| ())
    }

    /// `GetContextKey(id, key) → value?`.
    pub async fn get_context_key(&self, id: &str, key: &ContextKey) -> Result<Option<Value>> {
        let record = self.record(id);
        self.bounded("get_context_key", async {
            let ctx = record.context.read();
            Some(match key {
                ContextKey::TtsInterrupted => Value::Bool(ctx.tts_interrupted),
                ContextKey::BotSpeaking => Value::Bool(ctx.bot_speaking),
                ContextKey::Greeted => Value::Bool(ctx.greeted),
                ContextKey::CallActive => Value::Bool(ctx.call_active),
                ContextKey::IntakeCompleted => Value::Bool(ctx.intake_completed),
                ContextKey::Extra(name) => return ctx.extra.get(name).cloned(),
            })
        })
        .await
    }

    /// `SetContextKey(id, key, value)` — the only legal fast path for
    /// cross-owner live flags. Locks just the context sub-map; never
    /// reads or rewrites histories or the queue.
    pub async fn set_context_key(&self, id: &str, key: ContextKey, value: Value) -> Result<()> {
        let record = self.record(id);
        self.bounded("set_context_key", async {
            {
                let mut ctx = record.context.write();
                match &key {
                    ContextKey::TtsInterrupted => {
                        ctx.tts_interrupted = value.as_bool().unwrap_or(false)
                    }
                    ContextKey::BotSpeaking => ctx.bot_speaking = value.as_bool().unwrap_or(false),
                    ContextKey::Greeted => ctx.greeted = value.as_bool().unwrap_or(false),
                    ContextKey::CallActive => ctx.call_active = value.as_bool().unwrap_or(false),
                    ContextKey::IntakeCompleted => {
                        ctx.intake_completed = value.as_bool().unwrap_or(false)
                    }
                    ContextKey::Extra(name) => {
                        ctx.extra.insert(name.clone(), value);
                    }
                }
            }
            record.versions.context.fetch_add(1, Ordering::SeqCst);
            record.touch();
        })
        .await
        .map(|_| ())
    }

    /// `Refresh(id) → changed-flags` — compares the caller's last-known
    /// version stamp against the current one, field by field.
    pub async fn refresh(&self, id: &str, since: VersionStamp) -> Result<(RefreshResult, VersionStamp)> {
        let record = self.record(id);
        self.bounded("refresh", async {
            let now = record.version_stamp();
            let result = RefreshResult {
                context_changed: now.context != since.context,
                histories_changed: now.histories != since.histories,
                queue_changed: now.queue != since.queue,
            };
            (result, now)
        })
        .await
    }

    /// Append a turn entry and bump the histories version (used by the
    /// orchestrator instead of a full `persist` round-trip per turn).
    pub async fn append_turn(&self, id: &str, agent: &str, entry: TurnEntry) -> Result<()> {
        let record = self.record(id);
        self.bounded("append_turn", async {
            record
                .histories
                .write()
                .entry(agent.to_owned())
                .or_default()
                .push(entry);
            record.versions.histories.fetch_add(1, Ordering::SeqCst);
            record.touch();
        })
        .await
        .map(|_| ())
    }

    /// Push a queued utterance (owned by the turn controller, not synced
    /// through `persist`).
    pub async fn push_queue(&self, id: &str, utterance: QueuedUtterance) -> Result<()> {
        let record = self.record(id);
        self.bounded("push_queue", async {
            record.message_queue.write().push_back(utterance);
            record.versions.queue.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .map(|_| ())
    }

    pub async fn pop_queue(&self, id: &str) -> Result<Option<QueuedUtterance>> {
        let record = self.record(id);
        self.bounded("pop_queue", async {
            let popped = record.message_queue.write().pop_front();
            if popped.is_some() {
                record.versions.queue.fetch_add(1, Ordering::SeqCst);
            }
            popped
        })
        .await
    }

    /// `Delete(id)`.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.bounded("delete", async {
            self.records.write().remove(id);
        })
        .await
        .map(|_| ())
    }

    pub fn active_count(&self) -> usize {
        self.records.read().len()
    }

    /// Record one {start, end} sample for `stage` without a full
    /// load/persist round-trip — mirrors `append_turn`'s direct-write
    /// shape. Called at each STT/LLM/TTS stage boundary (§3, SPEC_FULL §B).
    pub async fn note_latency(&self, id: &str, stage: &str, start_ms: i64, end_ms: i64) -> Result<()> {
        let record = self.record(id);
        self.bounded("note_latency", async {
            record
                .latency_samples
                .write()
                .entry(stage.to_owned())
                .or_default()
                .push(va_domain::LatencySample { start_ms, end_ms });
            record.touch();
        })
        .await
        .map(|_| ())
    }

    /// Merge every call's per-stage latency samples into one process-wide
    /// summary — the metrics-surface counterpart to `Session::latency_summary`
    /// (SPEC_FULL §B).
    pub fn aggregate_latency_summary(&self) -> HashMap<String, LatencyStageSummary> {
        let mut merged: HashMap<String, Vec<va_domain::LatencySample>> = HashMap::new();
        for record in self.records.read().values() {
            for (stage, samples) in record.latency_samples.read().iter() {
                merged.entry(stage.clone()).or_default().extend(samples.iter().copied());
            }
        }
        merged
            .into_iter()
            .map(|(stage, samples)| (stage, summarize_latency_samples(&samples)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_of_unknown_id_returns_fresh_session() {
        let store = SessionStore::new(800);
        let (session, _) = store.load("call-1").await.unwrap();
        assert!(session.histories.is_empty());
        assert!(!session.context.call_active);
    }

    #[tokio::test]
    async fn set_context_key_does_not_disturb_histories() {
        let store = SessionStore::new(800);
        store
            .append_turn(
                "call-1",
                "voice",
                TurnEntry::User { text: "hello".into() },
            )
            .await
            .unwrap();
        let (_, before) = store.load("call-1").await.unwrap();

        store
            .set_context_key("call-1", ContextKey::TtsInterrupted, Value::Bool(true))
            .await
            .unwrap();

        let (refresh, _) = store.refresh("call-1", before).await.unwrap();
        assert!(refresh.context_changed);
        assert!(!refresh.histories_changed);
    }

    #[tokio::test]
    async fn refresh_reports_per_field_changes() {
        let store = SessionStore::new(800);
        let (_, stamp0) = store.load("call-2").await.unwrap();

        store
            .push_queue(
                "call-2",
                QueuedUtterance {
                    text: "hi".into(),
                    use_ssml: false,
                    voice: None,
                    locale: "en-US".into(),
                },
            )
            .await
            .unwrap();

        let (refresh, stamp1) = store.refresh("call-2", stamp0).await.unwrap();
        assert!(refresh.queue_changed);
        assert!(!refresh.context_changed);
        assert!(!refresh.histories_changed);

        let (refresh2, _) = store.refresh("call-2", stamp1).await.unwrap();
        assert!(!refresh2.any_changed());
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let store = SessionStore::new(800);
        store.load("call-3").await.unwrap();
        assert_eq!(store.active_count(), 1);
        store.delete("call-3").await.unwrap();
        assert_eq!(store.active_count(), 0);
    }

    #[tokio::test]
    async fn note_latency_is_visible_in_the_next_load() {
        let store = SessionStore::new(800);
        store.note_latency("call-5", "stt", 0, 120).await.unwrap();
        let (session, _) = store.load("call-5").await.unwrap();
        assert_eq!(session.latency_samples.get("stt").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn aggregate_latency_summary_merges_across_calls() {
        let store = SessionStore::new(800);
        store.note_latency("call-6", "llm", 0, 100).await.unwrap();
        store.note_latency("call-7", "llm", 0, 300).await.unwrap();

        let summary = store.aggregate_latency_summary();
        let llm = summary.get("llm").unwrap();
        assert_eq!(llm.count, 2);
        assert_eq!(llm.min_ms, 100);
        assert_eq!(llm.max_ms, 300);
    }

    #[tokio::test]
    async fn get_context_key_extra_roundtrips() {
        let store = SessionStore::new(800);
        store
            .set_context_key(
                "call-4",
                ContextKey::extra("appointment_slot"),
                Value::String("2026-08-01T09:00:00Z".into()),
            )
            .await
            .unwrap();
        let value = store
            .get_context_key("call-4", &ContextKey::extra("appointment_slot"))
            .await
            .unwrap();
        assert_eq!(value, Some(Value::String("2026-08-01T09:00:00Z".into())));
    }
}
