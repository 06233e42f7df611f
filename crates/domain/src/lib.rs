pub mod config;
pub mod error;
pub mod session;
pub mod stream;
pub mod tool;
pub mod trace;

pub use error::{Error, Result};
pub use session::{
    summarize_latency_samples, LatencySample, LatencyStageSummary, QueuedUtterance, Session, SessionContext,
    TurnEntry, ValidationState,
};
