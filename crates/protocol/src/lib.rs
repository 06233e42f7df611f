//! Wire schemas and pure codec logic shared by the audio socket, the
//! observer relay socket, and the call-control webhook (§4.4, §4.5, §6).

pub mod events;
pub mod frames;

pub use events::{CallControlEvent, CallControlEventType, ResultInformation};
pub use frames::{AudioFrame, InboundFrame, ObserverFrame, OutboundFrame, ParticipantGuard, Sender};
