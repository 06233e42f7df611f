//! Broadcast Hub (§4.10) — fans call-related events out to every observer
//! WebSocket connection (e.g. a supervisor dashboard watching all live
//! calls at once).
//!
//! One hub per process, one flat set of subscribers: every `publish` goes
//! to every connected observer regardless of which call it came from, and
//! each `ObserverFrame` carries its own `call_id` so a subscriber can
//! filter client-side to the calls it cares about. `publish` copies the
//! sink list out from under the lock before sending so a slow or dead
//! receiver never blocks the registration path (§5).

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use va_callcontrol::BroadcastHandle;
use va_protocol::ObserverFrame;

/// An outbound sender for one observer socket.
pub type ObserverSink = mpsc::Sender<ObserverFrame>;

/// Process-wide, unkeyed registry of observer sockets.
pub struct BroadcastHub {
    observers: Mutex<Vec<ObserverSink>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new observer sink. Returns nothing; the caller retains
    /// the receiving half and drives its own socket writer.
    pub fn add(&self, sink: ObserverSink) {
        self.observers.lock().push(sink);
    }

    /// Drop a specific sink (by pointer identity), e.g. when its socket
    /// disconnects.
    pub fn remove(&self, sink: &ObserverSink) {
        self.observers.lock().retain(|s| !s.same_channel(sink));
    }

    /// Number of live observer sinks. Used in tests and health
    /// introspection.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Send `frame` to every observer, regardless of which call it names.
    /// Sinks whose receiver has been dropped are evicted so the list never
    /// grows unbounded with dead entries.
    pub fn broadcast(&self, frame: ObserverFrame) {
        let sinks = self.observers.lock().clone();
        if sinks.is_empty() {
            return;
        }

        let mut dead = Vec::new();
        for sink in &sinks {
            if sink.try_send(frame.clone()).is_err() {
                dead.push(sink.clone());
            }
        }

        if !dead.is_empty() {
            let mut observers = self.observers.lock();
            observers.retain(|s| !dead.iter().any(|d| d.same_channel(s)));
        }
    }
}

impl BroadcastHandle for BroadcastHub {
    fn publish(&self, _call_connection_id: &str, frame: ObserverFrame) {
        self.broadcast(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use va_protocol::Sender;

    fn frame(call_id: &str, msg: &str) -> ObserverFrame {
        ObserverFrame {
            call_id: call_id.to_string(),
            message: msg.to_string(),
            sender: Sender::System,
        }
    }

    #[tokio::test]
    async fn broadcast_delivers_to_all_observers() {
        let hub = BroadcastHub::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        hub.add(tx1);
        hub.add(tx2);

        hub.broadcast(frame("call1", "hello"));

        assert_eq!(rx1.recv().await.unwrap().message, "hello");
        assert_eq!(rx2.recv().await.unwrap().message, "hello");
    }

    #[tokio::test]
    async fn broadcast_reaches_observer_regardless_of_call_id() {
        let hub = BroadcastHub::new();
        let (tx, mut rx) = mpsc::channel(4);
        hub.add(tx);

        hub.broadcast(frame("call1", "from call1"));
        hub.broadcast(frame("call2", "from call2"));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.call_id.as_str(), first.message.as_str()), ("call1", "from call1"));
        assert_eq!((second.call_id.as_str(), second.message.as_str()), ("call2", "from call2"));
    }

    #[tokio::test]
    async fn broadcast_with_no_observers_is_noop() {
        let hub = BroadcastHub::new();
        hub.broadcast(frame("ghost", "nobody listens"));
    }

    #[tokio::test]
    async fn dead_receiver_is_evicted() {
        let hub = BroadcastHub::new();
        let (tx, rx) = mpsc::channel(4);
        hub.add(tx);
        drop(rx);

        hub.broadcast(frame("call1", "hi"));
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test]
    async fn remove_drops_specific_sink() {
        let hub = BroadcastHub::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        hub.add(tx1.clone());
        hub.add(tx2);

        assert_eq!(hub.observer_count(), 2);
        hub.remove(&tx1);
        assert_eq!(hub.observer_count(), 1);
    }

    #[tokio::test]
    async fn publish_trait_method_delegates_to_broadcast() {
        let hub = BroadcastHub::new();
        let (tx, mut rx) = mpsc::channel(4);
        hub.add(tx);

        let handle: &dyn BroadcastHandle = &hub;
        handle.publish("call1", frame("call1", "via trait"));

        assert_eq!(rx.recv().await.unwrap().message, "via trait");
    }
}
