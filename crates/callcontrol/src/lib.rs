//! Call Event Processor (§4.5) and its supporting client/broadcast seams.
//!
//! Correlates call-control cloud events by call-id, drives the per-call
//! DTMF validation lifecycle (§4.6), and keeps the set of currently active
//! calls. The telephony provider and the observer-socket fan-out are both
//! behind traits here so this crate has no transport dependency of its own.

pub mod broadcast;
pub mod client;
pub mod processor;

pub use broadcast::{BroadcastHandle, NoopBroadcast};
pub use client::{CallControlClient, NoopCallControlClient};
pub use processor::{CallEventProcessor, EventContext, EventHandler};
