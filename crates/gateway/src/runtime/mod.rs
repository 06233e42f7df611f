//! Call-owning runtime: the LLM streaming consumer, the two-stage
//! orchestrator, the turn controller state machine, the broadcast hub, and
//! per-call cancellation.

pub mod broadcast;
pub mod cancel;
pub mod llm_consumer;
pub mod orchestrator;
pub mod turn;
