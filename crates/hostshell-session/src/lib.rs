//! hostshell-session: interactive shell sessions over a message transport.
//!
//! A [`Session`] attaches an already-configured command to a fresh PTY and
//! proxies bytes between the PTY and a remote peer until the process exits.
//! Inbound messages that look like control frames resize the PTY instead of
//! being typed into it. The [`Transport`] keeps the peer's message
//! boundaries, so classification never sees half a frame.
//!
//! # Architecture
//!
//! - [`control`]: control frame classification and the resize decoder.
//! - `streams`: the device -> transport and transport -> device loops.
//! - `shutdown`: the fixed teardown order once the process has exited.
//! - [`Session`]: ties the above together and owns the lifecycle.

pub mod config;
pub mod control;
mod session;
mod shutdown;
mod signal;
mod streams;
mod transport;

#[cfg(test)]
mod testing;

pub use config::{SessionConfig, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use control::{decode_resize, ControlPrefix, Frame, DEFAULT_SENTINEL};
pub use session::{EndReason, Session, SessionError, SessionId, SessionOutcome, SessionPhase};
pub use signal::TerminationSignal;
pub use transport::Transport;
