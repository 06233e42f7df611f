//! Call-control client interface — the outbound half of the telephony
//! provider boundary (§4.5, §6, §7). The processor only ever needs to play
//! a prompt, cancel one, or hang up; `initiate_call` backs the `POST
//! /calls` outbound-call contract (§6, SPEC_FULL §B) rather than anything
//! event-processor-driven.

use va_domain::error::Result;

#[async_trait::async_trait]
pub trait CallControlClient: Send + Sync {
    async fn play_prompt(&self, call_connection_id: &str, text: &str) -> Result<()>;
    async fn stop_play(&self, call_connection_id: &str) -> Result<()>;
    async fn disconnect(&self, call_connection_id: &str) -> Result<()>;

    /// Place an outbound call to `target_number`, returning the new call
    /// connection id. Answering and DTMF/recognition setup happen
    /// out-of-band once the provider's `CallConnected` event arrives.
    async fn initiate_call(&self, target_number: &str) -> Result<String>;
}

/// A client that records calls instead of placing them — used in tests and
/// anywhere the real telephony provider isn't wired up yet.
#[derive(Default)]
pub struct NoopCallControlClient;

#[async_trait::async_trait]
impl CallControlClient for NoopCallControlClient {
    async fn play_prompt(&self, call_connection_id: &str, text: &str) -> Result<()> {
        tracing::debug!(call_id = %call_connection_id, text, "noop play_prompt");
        Ok(())
    }

    async fn stop_play(&self, call_connection_id: &str) -> Result<()> {
        tracing::debug!(call_id = %call_connection_id, "noop stop_play");
        Ok(())
    }

    async fn disconnect(&self, call_connection_id: &str) -> Result<()> {
        tracing::debug!(call_id = %call_connection_id, "noop disconnect");
        Ok(())
    }

    async fn initiate_call(&self, target_number: &str) -> Result<String> {
        let call_connection_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(target_number, call_id = %call_connection_id, "noop initiate_call");
        Ok(call_connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_initiate_call_returns_distinct_ids() {
        let client = NoopCallControlClient::default();
        let a = client.initiate_call("+15551234567").await.unwrap();
        let b = client.initiate_call("+15551234567").await.unwrap();
        assert_ne!(a, b);
    }
}
