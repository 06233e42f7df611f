//! Tool catalog and dispatch for the voice-agent gateway's Orchestrator
//! (§4.8) — healthcare intake/scheduling/prescription/escalation tools.

pub mod definitions;
pub mod directory;
pub mod dispatch;
pub mod handlers;

pub use definitions::build_tool_definitions;
pub use directory::Directory;
pub use dispatch::dispatch_tool;
