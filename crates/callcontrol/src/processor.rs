//! Call Event Processor (§4.5) — correlates call-control cloud events by
//! call-id and dispatches to the minimum handler set plus any extra
//! handlers registered for a given event type.
//!
//! Mirrors the session store's "never let one caller's state affect
//! another" discipline: handler execution is isolated per handler, and the
//! per-call DTMF state lives behind its own lock keyed by call-id so one
//! call's validation buffer can never leak into another's.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use va_domain::config::DtmfConfig;
use va_domain::error::Result;
use va_protocol::{CallControlEvent, CallControlEventType, ObserverFrame, Sender};
use va_sessions::store::ContextKey;
use va_sessions::{DtmfEvent, DtmfLifecycle, DtmfOutcome, DtmfState, SessionStore};

use crate::broadcast::BroadcastHandle;
use crate::client::CallControlClient;

/// Everything a handler needs to react to one event. Built fresh per event
/// and handed to every handler registered for its type.
pub struct EventContext<'a> {
    pub event: &'a CallControlEvent,
    pub call_id: &'a str,
    pub store: &'a SessionStore,
    pub broadcast: &'a dyn BroadcastHandle,
    pub call_control: &'a dyn CallControlClient,
}

/// An extra handler registered alongside the built-in minimum set for a
/// given event type (§4.5: "invokes every handler registered for that
/// type"). The built-in handlers aren't modeled through this trait — they
/// own processor-private state (DTMF lifecycles, the active-call set) the
/// trait object can't reach — but anything purely reactive (metrics,
/// audit logging) can hook in here without touching `CallEventProcessor`.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, ctx: &EventContext<'_>) -> Result<()>;
}

pub struct CallEventProcessor {
    store: Arc<SessionStore>,
    call_control: Arc<dyn CallControlClient>,
    broadcast: Arc<dyn BroadcastHandle>,
    dtmf_config: DtmfConfig,
    /// Wrapped in its own `Arc` (rather than just the outer `Mutex`) so the
    /// per-call collect-timer task (`spawn_collect_timer`) can hold a handle
    /// to it without needing `Arc<Self>`.
    dtmf: Arc<Mutex<HashMap<String, DtmfLifecycle>>>,
    active_calls: Mutex<HashSet<String>>,
    extra_handlers: HashMap<CallControlEventType, Vec<Arc<dyn EventHandler>>>,
}

impl CallEventProcessor {
    pub fn new(
        store: Arc<SessionStore>,
        call_control: Arc<dyn CallControlClient>,
        broadcast: Arc<dyn BroadcastHandle>,
        dtmf_config: DtmfConfig,
    ) -> Self {
        Self {
            store,
            call_control,
            broadcast,
            dtmf_config,
            dtmf: Arc::new(Mutex::new(HashMap::new())),
            active_calls: Mutex::new(HashSet::new()),
            extra_handlers: HashMap::new(),
        }
    }

    /// Register an additional handler for `event_type`, run after the
    /// built-in one. A failing extra handler is logged and does not affect
    /// the built-in handler's outcome or any other registered handler.
    pub fn register(&mut self, event_type: CallControlEventType, handler: Arc<dyn EventHandler>) {
        self.extra_handlers.entry(event_type).or_default().push(handler);
    }

    pub fn active_call_ids(&self) -> Vec<String> {
        self.active_calls.lock().iter().cloned().collect()
    }

    pub fn dtmf_outcome_for(&self, call_id: &str) -> Option<DtmfOutcome> {
        self.dtmf.lock().get(call_id).map(|lc| match lc.state() {
            DtmfState::Validated => DtmfOutcome::Validated,
            DtmfState::Failed => DtmfOutcome::FailedTerminal,
            _ => DtmfOutcome::None,
        })
    }

    /// Spawn a one-shot timer that delivers `CollectTimerExpired` to
    /// `call_id`'s lifecycle after `dtmf_config.collect_timeout_sec`, unless
    /// the caller has already left `collecting_digits` by then (§4.6). Holds
    /// only `Arc`-cloned handles, so it needs no `Arc<Self>`.
    fn spawn_collect_timer(&self, call_id: &str) {
        let dtmf = self.dtmf.clone();
        let store = self.store.clone();
        let call_control = self.call_control.clone();
        let broadcast = self.broadcast.clone();
        let call_id = call_id.to_owned();
        let timeout_sec = self.dtmf_config.collect_timeout_sec;

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(timeout_sec)).await;

            let outcome = {
                let mut guard = dtmf.lock();
                match guard.get_mut(&call_id) {
                    Some(lifecycle) if lifecycle.state() == DtmfState::CollectingDigits => {
                        lifecycle.apply(DtmfEvent::CollectTimerExpired, chrono::Utc::now())
                    }
                    _ => DtmfOutcome::None,
                }
            };

            if let Err(e) =
                Self::apply_dtmf_outcome(outcome, &call_id, &store, call_control.as_ref(), broadcast.as_ref()).await
            {
                tracing::warn!(call_id = %call_id, error = %e, "dtmf collect-timer outcome handling failed");
            }
        });
    }

    /// React to a lifecycle outcome (§4.6): the shared tail of both
    /// `on_dtmf_received` and the collect-timer task, since both may raise
    /// the same `Validated`/`FailedRetry`/`FailedTerminal` transitions.
    async fn apply_dtmf_outcome(
        outcome: DtmfOutcome,
        call_id: &str,
        store: &SessionStore,
        call_control: &dyn CallControlClient,
        broadcast: &dyn BroadcastHandle,
    ) -> Result<()> {
        match outcome {
            DtmfOutcome::Validated => {
                // The Turn Controller's greet gate (§9: "validate first,
                // greet after validation succeeds") checks
                // `dtmf_outcome_for` directly; clearing `Greeted` here only
                // wakes its watcher loop promptly instead of waiting for
                // the next poll tick.
                store.set_context_key(call_id, ContextKey::Greeted, Value::Bool(false)).await?;
                broadcast.publish(
                    call_id,
                    ObserverFrame { call_id: call_id.to_owned(), message: "caller validated".into(), sender: Sender::System },
                );
            }
            DtmfOutcome::FailedRetry { attempt } => {
                call_control
                    .play_prompt(call_id, "That code wasn't recognized. Please try again.")
                    .await?;
                tracing::info!(call_id, attempt, "dtmf validation retry");
            }
            DtmfOutcome::FailedTerminal => {
                call_control
                    .play_prompt(call_id, "We're unable to verify your identity. Goodbye.")
                    .await?;
                call_control.disconnect(call_id).await?;
            }
            DtmfOutcome::None => {}
        }
        Ok(())
    }

    /// Parse and process one cloud-event envelope. Unknown types log and
    /// are dropped per §4.5; a parse failure is logged and dropped too —
    /// one malformed envelope must never take down the webhook endpoint.
    pub async fn process_raw(&self, raw: &Value) {
        let event = match CallControlEvent::parse(raw) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "call-control event failed to parse");
                return;
            }
        };

        if !event.is_known() {
            tracing::warn!(call_id = %event.call_connection_id, "unknown call-control event type dropped");
            return;
        }

        self.process(event).await;
    }

    pub async fn process(&self, event: CallControlEvent) {
        let call_id = event.call_connection_id.clone();
        let ctx = EventContext {
            event: &event,
            call_id: &call_id,
            store: &self.store,
            broadcast: self.broadcast.as_ref(),
            call_control: self.call_control.as_ref(),
        };

        if let Err(e) = self.dispatch_builtin(&ctx).await {
            tracing::warn!(call_id = %call_id, error = %e, "built-in call-control handler failed");
        }

        if let Some(handlers) = self.extra_handlers.get(&event.event_type) {
            for handler in handlers {
                if let Err(e) = handler.handle(&ctx).await {
                    tracing::warn!(
                        call_id = %call_id,
                        handler = handler.name(),
                        error = %e,
                        "registered call-control handler failed"
                    );
                }
            }
        }
    }

    async fn dispatch_builtin(&self, ctx: &EventContext<'_>) -> Result<()> {
        match ctx.event.event_type {
            CallControlEventType::CallConnected => self.on_connected(ctx).await,
            CallControlEventType::CallDisconnected => self.on_disconnected(ctx).await,
            CallControlEventType::ParticipantsUpdated => self.on_participants_updated(ctx).await,
            CallControlEventType::RecognizeDtmfToneReceived => self.on_dtmf_received(ctx).await,
            CallControlEventType::PlayCompleted => self.on_play_completed(ctx).await,
            CallControlEventType::PlayFailed => self.on_play_failed(ctx).await,
            CallControlEventType::PlayCanceled => self.on_play_completed(ctx).await,
            CallControlEventType::RecognizeFailed
            | CallControlEventType::CreateCallFailed
            | CallControlEventType::AnswerCallFailed => self.on_recoverable_failure(ctx).await,
            CallControlEventType::RecognizeCompleted | CallControlEventType::Unknown => Ok(()),
        }
    }

    async fn on_connected(&self, ctx: &EventContext<'_>) -> Result<()> {
        self.active_calls.lock().insert(ctx.call_id.to_owned());
        {
            let mut guard = self.dtmf.lock();
            let lifecycle = guard
                .entry(ctx.call_id.to_owned())
                .or_insert_with(|| DtmfLifecycle::new(self.dtmf_config.clone()));
            lifecycle.apply(DtmfEvent::Connected, chrono::Utc::now());
        }

        self.store.set_context_key(ctx.call_id, ContextKey::CallActive, Value::Bool(true)).await?;

        // The provider's play-prompt call is synchronous from the
        // processor's point of view, so dispatching it doubles as the
        // "prompt play started" signal that opens the collection window.
        ctx.call_control
            .play_prompt(ctx.call_id, "Please enter your 4-digit verification code.")
            .await?;
        if let Some(lifecycle) = self.dtmf.lock().get_mut(ctx.call_id) {
            lifecycle.apply(DtmfEvent::PromptPlayStarted, chrono::Utc::now());
        }
        self.spawn_collect_timer(ctx.call_id);

        ctx.broadcast.publish(
            ctx.call_id,
            ObserverFrame { call_id: ctx.call_id.to_owned(), message: "call connected".into(), sender: Sender::System },
        );
        Ok(())
    }

    async fn on_disconnected(&self, ctx: &EventContext<'_>) -> Result<()> {
        self.active_calls.lock().remove(ctx.call_id);
        self.dtmf.lock().remove(ctx.call_id);

        self.store.set_context_key(ctx.call_id, ContextKey::CallActive, Value::Bool(false)).await?;
        ctx.broadcast.publish(
            ctx.call_id,
            ObserverFrame { call_id: ctx.call_id.to_owned(), message: "call disconnected".into(), sender: Sender::System },
        );
        Ok(())
    }

    async fn on_participants_updated(&self, ctx: &EventContext<'_>) -> Result<()> {
        let joined = ctx.event.participant_raw_id.is_some();
        self.store
            .set_context_key(ctx.call_id, ContextKey::extra("participant_joined"), Value::Bool(joined))
            .await
    }

    async fn on_dtmf_received(&self, ctx: &EventContext<'_>) -> Result<()> {
        let Some(tone) = ctx.event.dtmf_tone.as_deref().and_then(|t| t.chars().next()) else {
            return Ok(());
        };

        let outcome = {
            let mut guard = self.dtmf.lock();
            let lifecycle = guard
                .entry(ctx.call_id.to_owned())
                .or_insert_with(|| DtmfLifecycle::new(self.dtmf_config.clone()));
            lifecycle.apply(DtmfEvent::DigitReceived(tone), chrono::Utc::now())
        };

        Self::apply_dtmf_outcome(outcome.clone(), ctx.call_id, ctx.store, ctx.call_control, ctx.broadcast).await?;

        if matches!(outcome, DtmfOutcome::FailedRetry { .. }) {
            // The retry prompt that `apply_dtmf_outcome` just played re-opens
            // the collection window: re-enter `collecting_digits` and arm a
            // fresh collect timer for this attempt.
            if let Some(lifecycle) = self.dtmf.lock().get_mut(ctx.call_id) {
                lifecycle.apply(DtmfEvent::PromptPlayStarted, chrono::Utc::now());
            }
            self.spawn_collect_timer(ctx.call_id);
        }

        Ok(())
    }

    async fn on_play_completed(&self, ctx: &EventContext<'_>) -> Result<()> {
        self.store.set_context_key(ctx.call_id, ContextKey::BotSpeaking, Value::Bool(false)).await
    }

    async fn on_play_failed(&self, ctx: &EventContext<'_>) -> Result<()> {
        tracing::warn!(call_id = %ctx.call_id, "play failed");
        self.store.set_context_key(ctx.call_id, ContextKey::BotSpeaking, Value::Bool(false)).await
    }

    async fn on_recoverable_failure(&self, ctx: &EventContext<'_>) -> Result<()> {
        let info = ctx.event.result_information.as_ref();
        let recoverable = info.map(|i| i.is_recoverable_transcription_stall()).unwrap_or(false);
        tracing::warn!(
            call_id = %ctx.call_id,
            event_type = ?ctx.event.event_type,
            code = info.map(|i| i.code),
            subcode = info.and_then(|i| i.subcode),
            recoverable,
            "call-control failure event",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::NoopBroadcast;
    use crate::client::NoopCallControlClient;

    fn processor() -> CallEventProcessor {
        CallEventProcessor::new(
            Arc::new(SessionStore::new(800)),
            Arc::new(NoopCallControlClient),
            Arc::new(NoopBroadcast),
            DtmfConfig::default(),
        )
    }

    #[tokio::test]
    async fn connected_tracks_active_call_and_starts_dtmf() {
        let p = processor();
        p.process_raw(&serde_json::json!({"type": "CallConnected", "callConnectionId": "c1"})).await;
        assert_eq!(p.active_call_ids(), vec!["c1".to_string()]);
        assert!(p.dtmf.lock().contains_key("c1"));
    }

    #[tokio::test]
    async fn disconnected_removes_active_call_and_dtmf_state() {
        let p = processor();
        p.process_raw(&serde_json::json!({"type": "CallConnected", "callConnectionId": "c1"})).await;
        p.process_raw(&serde_json::json!({"type": "CallDisconnected", "callConnectionId": "c1"})).await;
        assert!(p.active_call_ids().is_empty());
        assert!(!p.dtmf.lock().contains_key("c1"));
    }

    #[tokio::test]
    async fn unknown_event_type_is_dropped() {
        let p = processor();
        p.process_raw(&serde_json::json!({"type": "SomethingNew", "callConnectionId": "c1"})).await;
        assert!(p.active_call_ids().is_empty());
    }

    #[tokio::test]
    async fn dtmf_sequence_validates_and_clears_greeted_flag() {
        let p = processor();
        p.process_raw(&serde_json::json!({"type": "CallConnected", "callConnectionId": "c1"})).await;
        for tone in "1234".chars() {
            p.process_raw(&serde_json::json!({
                "type": "RecognizeDtmfToneReceived",
                "callConnectionId": "c1",
                "dtmfTone": tone.to_string(),
            }))
            .await;
        }
        let (session, _) = p.store.load("c1").await.unwrap();
        assert!(!session.context.greeted);
    }

    #[tokio::test]
    async fn stalled_caller_fails_via_collect_timer() {
        let p = CallEventProcessor::new(
            Arc::new(SessionStore::new(800)),
            Arc::new(NoopCallControlClient),
            Arc::new(NoopBroadcast),
            DtmfConfig { collect_timeout_sec: 0, ..DtmfConfig::default() },
        );
        p.process_raw(&serde_json::json!({"type": "CallConnected", "callConnectionId": "c1"})).await;
        assert_eq!(p.dtmf.lock().get("c1").unwrap().state(), DtmfState::CollectingDigits);

        // Give the spawned collect-timer task a chance to run; it fires
        // immediately since collect_timeout_sec is 0.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(p.dtmf.lock().get("c1").unwrap().attempts(), 1);
    }

    #[tokio::test]
    async fn play_completed_clears_bot_speaking() {
        let p = processor();
        p.store.set_context_key("c1", ContextKey::BotSpeaking, Value::Bool(true)).await.unwrap();
        p.process_raw(&serde_json::json!({"type": "PlayCompleted", "callConnectionId": "c1"})).await;
        let (session, _) = p.store.load("c1").await.unwrap();
        assert!(!session.context.bot_speaking);
    }

    #[tokio::test]
    async fn independent_calls_keep_separate_dtmf_buffers() {
        let p = processor();
        p.process_raw(&serde_json::json!({"type": "CallConnected", "callConnectionId": "a"})).await;
        p.process_raw(&serde_json::json!({"type": "CallConnected", "callConnectionId": "b"})).await;
        p.process_raw(&serde_json::json!({
            "type": "RecognizeDtmfToneReceived", "callConnectionId": "a", "dtmfTone": "1"
        }))
        .await;
        let buf_a = p.dtmf.lock().get("a").unwrap().digit_buffer().to_string();
        let buf_b = p.dtmf.lock().get("b").unwrap().digit_buffer().to_string();
        assert_eq!(buf_a, "1");
        assert_eq!(buf_b, "");
    }
}
