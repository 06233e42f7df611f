//! Broadcast handle — the Call Event Processor's write side of the
//! Broadcast Hub (§4.10). Kept as a trait here so this crate doesn't need
//! to depend on the gateway's websocket plumbing; the gateway supplies the
//! real hub, tests supply a recording stub.

use va_protocol::ObserverFrame;

pub trait BroadcastHandle: Send + Sync {
    /// Publish a status/assistant/system line to every connected observer
    /// socket (§4.10: the hub is process-wide, not scoped per call).
    /// `call_connection_id` identifies which call the line is about for
    /// logging; the frame itself also carries it so a client can filter.
    /// Best-effort: no observers connected is not an error.
    fn publish(&self, call_connection_id: &str, frame: ObserverFrame);
}

#[derive(Default)]
pub struct NoopBroadcast;

impl BroadcastHandle for NoopBroadcast {
    fn publish(&self, _call_connection_id: &str, _frame: ObserverFrame) {}
}
