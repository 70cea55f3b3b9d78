use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard};

use portable_pty::{native_pty_system, CommandBuilder, MasterPty};

use crate::geometry::Geometry;
use crate::process::{ChildProcess, ProcessHandle};

/// Errors from PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("failed to open PTY: {0}")]
    Open(String),
    #[error("failed to spawn command: {0}")]
    Spawn(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PTY resize failed: {0}")]
    Resize(String),
    #[error("PTY is closed")]
    Closed,
}

/// The controllable (master) side of a pseudo-terminal.
///
/// `resize` may be called from one thread while another thread is blocked in
/// a read on a handle obtained from `reader`.
pub trait TerminalDevice: Send + Sync + 'static {
    fn resize(&self, geometry: Geometry) -> Result<(), PtyError>;

    /// A blocking reader for output produced by the attached process.
    fn reader(&self) -> Result<Box<dyn Read + Send>, PtyError>;

    /// A blocking writer for input to the attached process. Implementations
    /// may only hand this out once.
    fn writer(&self) -> Result<Box<dyn Write + Send>, PtyError>;

    /// Release the device. Calling this more than once is a no-op.
    fn close(&self);
}

/// Binds an already-configured command to a new pseudo-terminal.
pub trait PtyProvider: Send + Sync {
    type Device: TerminalDevice;
    type Process: ProcessHandle;

    fn attach(
        &self,
        command: CommandBuilder,
        geometry: Geometry,
    ) -> Result<(Self::Device, Self::Process), PtyError>;
}

/// `portable-pty` backed provider using the platform's native PTY system.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePty;

impl PtyProvider for NativePty {
    type Device = PtyHandle;
    type Process = ChildProcess;

    fn attach(
        &self,
        command: CommandBuilder,
        geometry: Geometry,
    ) -> Result<(PtyHandle, ChildProcess), PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(geometry.into())
            .map_err(|e| PtyError::Open(format!("{e}")))?;

        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| PtyError::Spawn(format!("{e}")))?;

        // Keeping the slave open here would stop reads from ever seeing EOF.
        drop(pair.slave);

        Ok((PtyHandle::new(pair.master), ChildProcess::new(child)))
    }
}

/// Owns the master side of a `portable-pty` pair.
pub struct PtyHandle {
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
}

impl PtyHandle {
    pub fn new(master: Box<dyn MasterPty + Send>) -> Self {
        Self {
            master: Mutex::new(Some(master)),
        }
    }

    /// True once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn MasterPty + Send>>> {
        self.master.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TerminalDevice for PtyHandle {
    fn resize(&self, geometry: Geometry) -> Result<(), PtyError> {
        let master = self.lock();
        let master = master.as_ref().ok_or(PtyError::Closed)?;
        master
            .resize(geometry.into())
            .map_err(|e| PtyError::Resize(format!("{e}")))
    }

    fn reader(&self) -> Result<Box<dyn Read + Send>, PtyError> {
        let master = self.lock();
        let master = master.as_ref().ok_or(PtyError::Closed)?;
        master
            .try_clone_reader()
            .map_err(|e| PtyError::Io(std::io::Error::other(format!("failed to clone reader: {e}"))))
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>, PtyError> {
        let master = self.lock();
        let master = master.as_ref().ok_or(PtyError::Closed)?;
        master
            .take_writer()
            .map_err(|e| PtyError::Io(std::io::Error::other(format!("failed to take writer: {e}"))))
    }

    fn close(&self) {
        if self.lock().take().is_some() {
            log::debug!("PTY master released");
        }
    }
}

/// True when `err` is how a PTY master reports that the slave side has gone
/// away. Linux returns `EIO` rather than a zero-length read.
pub fn is_hangup(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(libc::EIO) {
            return true;
        }
    }
    matches!(
        err.kind(),
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::BrokenPipe
    )
}
