//! hostshell-pty: pseudo-terminal and child process handles for hostshell.
//!
//! This crate owns everything that touches the operating system's PTY layer.
//! The session proxy in `hostshell-session` only sees the traits defined here,
//! which keeps it testable without a real terminal.
//!
//! # Architecture
//!
//! - [`Geometry`] / [`ResizeRequest`]: terminal size and partial size updates.
//! - [`TerminalDevice`]: the master side of a PTY (resize, read, write, close).
//! - [`PtyProvider`]: attaches an already-built command to a fresh PTY.
//! - [`ProcessHandle`] / [`ProcessSignaller`]: waiting on and signalling the child.
//! - [`NativePty`]: the `portable-pty` backed provider used in production.

pub mod geometry;
pub mod process;
pub mod pty;

pub use geometry::{Geometry, ResizeRequest};
pub use portable_pty::{CommandBuilder, ExitStatus};
pub use process::{ChildProcess, ProcessHandle, ProcessSignaller};
pub use pty::{is_hangup, NativePty, PtyError, PtyHandle, PtyProvider, TerminalDevice};
