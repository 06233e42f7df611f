//! Session storage and lifecycle for the voice-agent gateway.
//!
//! Two concerns live here: the async, field-level-atomic KV store holding
//! each call's histories/context/queue (§4.1), and the per-call DTMF
//! validation state machine gating the orchestrator (§4.6).

pub mod lifecycle;
pub mod store;

pub use lifecycle::{DtmfEvent, DtmfLifecycle, DtmfOutcome, DtmfState};
pub use store::{ContextKey, RefreshResult, SessionStore, VersionStamp};
