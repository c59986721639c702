//! Live duplex voice session
//!
//! `wire` models the JSON protocol, `transport` pumps it over a WebSocket,
//! and `session` owns the control loop that ties microphone, playback, and
//! transcript together. Every state change flows through one ordered event
//! queue (`events`), so session state never needs cross-task locking.

mod events;
mod session;
mod transport;
mod wire;

pub use events::{InboundEvent, SessionEvent};
pub use session::{LiveSession, SessionController, SessionState, SessionStats};
pub use transport::{Connector, EventSender, Transport, WsConnector};
pub use wire::{ClientMessage, RealtimeInput, ServerMessage, Setup};
