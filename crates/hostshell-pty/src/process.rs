use std::io;
use std::sync::{Arc, Mutex};

use portable_pty::{Child, ChildKiller, ExitStatus};

/// A spawned child process whose exit the session observes.
pub trait ProcessHandle: Send + 'static {
    /// Block until the process exits.
    fn wait(&mut self) -> io::Result<ExitStatus>;

    /// A handle for signalling the process while another thread is in `wait`.
    fn signaller(&self) -> Arc<dyn ProcessSignaller>;

    fn pid(&self) -> Option<u32>;
}

/// Sends signals to a process without owning it.
pub trait ProcessSignaller: Send + Sync {
    /// Ask the process to stop (SIGINT on unix). Never blocks.
    fn interrupt(&self) -> io::Result<()>;

    /// Terminate the process outright.
    fn kill(&self) -> io::Result<()>;
}

/// A `portable-pty` child spawned on the slave side of a [`crate::PtyHandle`].
pub struct ChildProcess {
    child: Box<dyn Child + Send + Sync>,
    signaller: Arc<ChildSignaller>,
}

impl ChildProcess {
    pub fn new(child: Box<dyn Child + Send + Sync>) -> Self {
        let signaller = Arc::new(ChildSignaller {
            pid: child.process_id(),
            killer: Mutex::new(child.clone_killer()),
        });
        Self { child, signaller }
    }

    /// Returns the exit status if the process has already exited.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }
}

impl ProcessHandle for ChildProcess {
    fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }

    fn signaller(&self) -> Arc<dyn ProcessSignaller> {
        self.signaller.clone()
    }

    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }
}

struct ChildSignaller {
    pid: Option<u32>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
}

impl ProcessSignaller for ChildSignaller {
    #[cfg(unix)]
    fn interrupt(&self) -> io::Result<()> {
        let Some(pid) = self.pid else {
            return self.kill();
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, libc::SIGINT) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn interrupt(&self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&self) -> io::Result<()> {
        let mut killer = self
            .killer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        killer.kill()
    }
}
