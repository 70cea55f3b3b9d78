use std::time::Duration;

use hostshell_pty::Geometry;

use crate::control::ControlPrefix;

/// Default size of a single PTY read, and so of an output message.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest PTY read buffer a session will allocate.
pub const MAX_CHUNK_SIZE: usize = 1 << 20;

/// Per-session tuning. `Default` reproduces the classic wire behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on bytes read from the PTY per output message. Clamped to
    /// `1..=MAX_CHUNK_SIZE`.
    pub chunk_size: usize,
    /// Size the PTY starts at before the client reports its own.
    pub initial_geometry: Geometry,
    /// How inbound control frames are told apart from keystrokes.
    pub control_prefix: ControlPrefix,
    /// Force-kill the child if it is still running this long after the
    /// session began tearing down. `None` only ever sends the interrupt.
    pub kill_after: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            initial_geometry: Geometry::DEFAULT,
            control_prefix: ControlPrefix::Brace,
            kill_after: None,
        }
    }
}

impl SessionConfig {
    /// Chunk size clamped to something a read can make progress with and a
    /// buffer the process can afford.
    pub(crate) fn read_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_CHUNK_SIZE)
    }
}
