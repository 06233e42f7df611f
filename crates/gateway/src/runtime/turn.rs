//! Turn Controller (§4.7) — the `/ws/audio/:call_id` caller socket.
//!
//! One call owns exactly one controller instance: a reader-loop task that
//! demuxes inbound frames and owns the socket, plus short-lived helper
//! tasks it spawns for outbound speech and for orchestrated responses so
//! neither blocks barge-in detection on the reader (§5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use va_callcontrol::BroadcastHandle;
use va_protocol::frames::{cut_into_frames, parse_inbound_frame};
use va_protocol::{InboundFrame, ObserverFrame, OutboundFrame, ParticipantGuard, Sender};
use va_providers::{AudioFormat, SttAdapter, SttParams, SttSink};
use va_sessions::{ContextKey, DtmfOutcome};

use super::cancel::CancelToken;
use super::llm_consumer::ConsumerEvent;
use crate::state::AppState;

const GREETING: &str = "Thanks for calling XYMZ Insurance. How can I help you today?";

/// Coarse phases the controller cycles through per §4.7. Kept for
/// observability; actual behavior is driven by the inbound frame stream
/// and the per-call cancel token rather than a strict transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Listening,
    Speaking,
    Committing,
    Cancelled,
}

pub async fn audio_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_audio_socket(socket, state, call_id))
}

async fn handle_audio_socket(socket: WebSocket, state: AppState, call_id: String) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundFrame>(256);

    let writer = tokio::spawn(writer_task(ws_sink, outbound_rx));

    let mut guard = ParticipantGuard::new();
    let hangup = Arc::new(Notify::new());
    let bot_speaking = Arc::new(AtomicBool::new(false));

    // One STT adapter instance per call (§4.2), wired straight to this
    // call's commit path via `TurnSttSink` rather than the process-wide
    // singleton the gateway used to share across every concurrent call.
    let stt_params = SttParams {
        recognized_languages: state.config.speech.recognized_languages.clone(),
        segmentation_silence_ms: state.config.speech.segmentation_silence_ms as u64,
        audio_format: AudioFormat::Pcm16kHz16BitMono,
    };
    let stt: Arc<dyn SttAdapter> = match state.stt.create(stt_params).await {
        Ok(adapter) => adapter,
        Err(e) => {
            tracing::warn!(call_id = %call_id, error = %e, "failed to create stt adapter, closing socket");
            writer.abort();
            return;
        }
    };
    let sink = Arc::new(TurnSttSink {
        state: state.clone(),
        call_id: call_id.clone(),
        outbound_tx: outbound_tx.clone(),
        bot_speaking: bot_speaking.clone(),
        hangup: hangup.clone(),
    });
    if let Err(e) = stt.start(sink).await {
        tracing::warn!(call_id = %call_id, error = %e, "failed to start stt adapter, closing socket");
        writer.abort();
        return;
    }

    maybe_greet(&state, &call_id, &outbound_tx).await;

    let watcher = tokio::spawn(greet_watcher(state.clone(), call_id.clone(), outbound_tx.clone()));

    loop {
        tokio::select! {
            _ = hangup.notified() => {
                let _ = outbound_tx.send(OutboundFrame::Exit).await;
                break;
            }
            next = ws_stream.next() => {
                let Some(Ok(msg)) = next else { break };
                match msg {
                    Message::Text(text) => {
                        handle_inbound_text(&state, &call_id, &text, stt.as_ref(), &mut guard, &bot_speaking, &outbound_tx, &hangup).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    let _ = stt.stop().await;
    watcher.abort();
    state.cancel_map.cancel(&call_id);
    state.cancel_map.remove(&call_id);
    writer.abort();
    tracing::info!(call_id = %call_id, "audio socket closed");
}

/// Implements `SttSink` over this call's controller state so the STT
/// adapter can drive a turn commit straight from `final_result`, the same
/// way a final `BrowserText` frame does (§4.2, §4.7).
struct TurnSttSink {
    state: AppState,
    call_id: String,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    bot_speaking: Arc<AtomicBool>,
    hangup: Arc<Notify>,
}

impl SttSink for TurnSttSink {
    fn partial(&self, _text: &str, _lang: &str) {}

    fn final_result(&self, text: &str, _lang: &str) {
        let state = self.state.clone();
        let call_id = self.call_id.clone();
        let text = text.to_owned();
        let outbound_tx = self.outbound_tx.clone();
        let bot_speaking = self.bot_speaking.clone();
        let hangup = self.hangup.clone();
        tokio::spawn(async move {
            if bot_speaking.load(Ordering::Relaxed) {
                barge_in(&state, &call_id, &outbound_tx).await;
            }
            run_commit(state, call_id, text, outbound_tx, bot_speaking, hangup).await;
        });
    }

    fn cancel(&self, reason: &str) {
        tracing::debug!(call_id = %self.call_id, reason, "stt recognition cancelled");
    }
}

async fn writer_task(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<OutboundFrame>) {
    while let Some(frame) = rx.recv().await {
        let json = frame.to_json().to_string();
        if sink.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}

async fn handle_inbound_text(
    state: &AppState,
    call_id: &str,
    text: &str,
    stt: &dyn SttAdapter,
    guard: &mut ParticipantGuard,
    bot_speaking: &Arc<AtomicBool>,
    outbound_tx: &mpsc::Sender<OutboundFrame>,
    hangup: &Arc<Notify>,
) {
    let frame = match parse_inbound_frame(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(call_id, error = %e, "unparseable inbound frame, dropped");
            return;
        }
    };

    match frame {
        InboundFrame::CallConnected { participant_raw_id } => {
            guard.record_connected(participant_raw_id.as_deref());
        }
        InboundFrame::AudioData { pcm, participant_raw_id } => {
            if guard.accepts(participant_raw_id.as_deref()) {
                let _ = stt.write_bytes(&pcm).await;
            }
        }
        InboundFrame::Interrupt => {
            if bot_speaking.load(Ordering::Relaxed) {
                barge_in(state, call_id, outbound_tx).await;
            }
        }
        InboundFrame::BrowserText { text, is_final } => {
            if !is_final {
                if bot_speaking.load(Ordering::Relaxed) {
                    barge_in(state, call_id, outbound_tx).await;
                }
                return;
            }
            if bot_speaking.load(Ordering::Relaxed) {
                barge_in(state, call_id, outbound_tx).await;
            }
            tokio::spawn(run_commit(
                state.clone(),
                call_id.to_owned(),
                text,
                outbound_tx.clone(),
                bot_speaking.clone(),
                hangup.clone(),
            ));
        }
        InboundFrame::StopAudio => {
            let _ = state
                .sessions
                .set_context_key(call_id, ContextKey::BotSpeaking, Value::Bool(false))
                .await;
            bot_speaking.store(false, Ordering::Relaxed);
        }
        InboundFrame::AudioMetadata(_) | InboundFrame::StartAudio | InboundFrame::Unknown(_) => {}
    }
}

/// Cancel the in-flight turn, stop playback on the wire, and record the
/// interrupt (§4.7: fast flag via the context-key path, plus the
/// full-record `interrupt_count` bump the fast path can't carry).
async fn barge_in(state: &AppState, call_id: &str, outbound_tx: &mpsc::Sender<OutboundFrame>) {
    state.cancel_map.cancel(call_id);
    let _ = outbound_tx.send(OutboundFrame::StopAudio).await;
    let _ = state
        .sessions
        .set_context_key(call_id, ContextKey::TtsInterrupted, Value::Bool(true))
        .await;

    if let Ok((mut session, _)) = state.sessions.load(call_id).await {
        session.context.interrupt_count += 1;
        let _ = state.sessions.persist(&session, None).await;
    }
}

/// Run one orchestrated turn to completion: collect the consumer's
/// lifecycle events synchronously (the consumer's callback is not async),
/// then replay them onto the outbound socket and TTS in order.
async fn run_commit(
    state: AppState,
    call_id: String,
    text: String,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    bot_speaking: Arc<AtomicBool>,
    hangup: Arc<Notify>,
) {
    let token = state.cancel_map.register(&call_id);
    let is_stop_word = contains_stop_word(&state.config.dialog.stop_words, &text);

    state
        .broadcast
        .publish(&call_id, ObserverFrame { call_id: call_id.clone(), message: text.clone(), sender: Sender::User });

    let mut events: Vec<ConsumerEvent> = Vec::new();
    let mut on_event = |ev: ConsumerEvent| events.push(ev);

    let outcome = state.orchestrator.handle_user_turn(&call_id, &text, &mut on_event).await;

    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!(call_id = %call_id, error = %e, "orchestrated turn failed");
            let _ = outbound_tx.send(OutboundFrame::Error(e.to_string())).await;
            state.cancel_map.remove(&call_id);
            return;
        }
    };

    bot_speaking.store(true, Ordering::Relaxed);
    let _ = state
        .sessions
        .set_context_key(&call_id, ContextKey::BotSpeaking, Value::Bool(true))
        .await;

    for event in events {
        if token.is_cancelled() {
            break;
        }
        match event {
            ConsumerEvent::TextChunk(chunk) => {
                let _ = outbound_tx.send(OutboundFrame::AssistantStreaming(chunk.clone())).await;
                state
                    .broadcast
                    .publish(&call_id, ObserverFrame { call_id: call_id.clone(), message: chunk.clone(), sender: Sender::Assistant });
                speak_text(&state, &call_id, &chunk, &outbound_tx, &token).await;
            }
            ConsumerEvent::ToolStarted { call_id: cid, tool_name, arguments } => {
                let _ = outbound_tx
                    .send(OutboundFrame::ToolStart { call_id: cid, tool: tool_name, args: arguments })
                    .await;
            }
            ConsumerEvent::ToolFinished {
                call_id: cid,
                tool_name,
                elapsed_ms,
                result,
                is_error,
            } => {
                let status = if is_error { "error" } else { "ok" };
                let _ = outbound_tx
                    .send(OutboundFrame::ToolEnd {
                        call_id: cid,
                        tool: tool_name,
                        status: status.to_owned(),
                        elapsed_ms,
                        result: Value::String(result),
                    })
                    .await;
            }
        }
    }

    bot_speaking.store(false, Ordering::Relaxed);
    let _ = state
        .sessions
        .set_context_key(&call_id, ContextKey::BotSpeaking, Value::Bool(false))
        .await;
    state.cancel_map.remove(&call_id);

    if is_stop_word || outcome.intake_completed {
        hangup.notify_one();
    }
}

fn contains_stop_word(stop_words: &std::collections::HashSet<String>, text: &str) -> bool {
    let lower = text.to_lowercase();
    stop_words.iter().any(|w| lower.contains(w.as_str()))
}

/// Synthesize and pace one chunk of assistant speech, checking the cancel
/// token at the configured interrupt-poll granularity (§4.7).
async fn speak_text(
    state: &AppState,
    call_id: &str,
    text: &str,
    outbound_tx: &mpsc::Sender<OutboundFrame>,
    token: &CancelToken,
) {
    let tts_start_ms = chrono::Utc::now().timestamp_millis();
    let synth_result = state.tts.synthesize_to_pcm(text, &state.config.speech.default_rate).await;
    let tts_end_ms = chrono::Utc::now().timestamp_millis();
    let _ = state.sessions.note_latency(call_id, "tts", tts_start_ms, tts_end_ms).await;

    let pcm = match synth_result {
        Ok(pcm) => pcm,
        Err(e) => {
            tracing::warn!(error = %e, "tts synthesis failed");
            return;
        }
    };

    let frames = cut_into_frames(&pcm, state.config.speech.output_sample_rate_hz);
    let frame_ms = state.config.dialog.outbound_frame_ms.max(1) as u64;
    let poll_every = (state.config.dialog.interrupt_poll_ms / frame_ms).max(1);

    for (i, frame) in frames.into_iter().enumerate() {
        if i as u64 % poll_every == 0 && token.is_cancelled() {
            return;
        }
        if outbound_tx.send(OutboundFrame::Audio(frame)).await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(frame_ms)).await;
    }
}

/// A call with no DTMF lifecycle registered (a browser session that never
/// went through a call-control `CallConnected` webhook) has nothing to
/// validate, so it is always greet-eligible. A call with a lifecycle is
/// only greet-eligible once it has reached `Validated` — greeting before
/// that contradicts §9's canonical resolution ("validate first, greet
/// after validation succeeds") and would let an unverified caller straight
/// into the dialog (S5).
fn greet_eligible(state: &AppState, call_id: &str) -> bool {
    match state.call_events.dtmf_outcome_for(call_id) {
        None => true,
        Some(DtmfOutcome::Validated) => true,
        Some(_) => false,
    }
}

/// Greet once per `Greeted` transition to false, gated on DTMF validation.
/// On a fresh session this fires immediately on connect; on a telephony
/// call it fires again whenever the call-control DTMF handler clears the
/// flag after validation (§4.6).
async fn maybe_greet(state: &AppState, call_id: &str, outbound_tx: &mpsc::Sender<OutboundFrame>) {
    let greeted = state
        .sessions
        .get_context_key(call_id, &ContextKey::Greeted)
        .await
        .ok()
        .flatten()
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !greeted && greet_eligible(state, call_id) {
        do_greet(state, call_id, outbound_tx).await;
    }
}

async fn greet_watcher(state: AppState, call_id: String, outbound_tx: mpsc::Sender<OutboundFrame>) {
    let mut tick = tokio::time::interval(Duration::from_millis(state.config.dialog.greet_wait_ms.max(500)));
    loop {
        tick.tick().await;
        let greeted = state
            .sessions
            .get_context_key(&call_id, &ContextKey::Greeted)
            .await
            .ok()
            .flatten()
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        if !greeted && greet_eligible(&state, &call_id) {
            do_greet(&state, &call_id, &outbound_tx).await;
        }
    }
}

async fn do_greet(state: &AppState, call_id: &str, outbound_tx: &mpsc::Sender<OutboundFrame>) {
    let token = state.cancel_map.register(call_id);
    let _ = outbound_tx.send(OutboundFrame::Assistant(GREETING.to_owned())).await;
    state
        .broadcast
        .publish(call_id, ObserverFrame { call_id: call_id.to_owned(), message: GREETING.to_owned(), sender: Sender::Assistant });
    speak_text(state, call_id, GREETING, outbound_tx, &token).await;
    state.cancel_map.remove(call_id);
    let _ = state
        .sessions
        .set_context_key(call_id, ContextKey::Greeted, Value::Bool(true))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_word_matches_substring_case_insensitively() {
        let words: std::collections::HashSet<String> = ["goodbye".into(), "bye".into()].into_iter().collect();
        assert!(contains_stop_word(&words, "Okay, Goodbye now!"));
        assert!(!contains_stop_word(&words, "not done yet"));
    }
}
