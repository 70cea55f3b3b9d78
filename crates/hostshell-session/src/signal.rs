use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hostshell_pty::ProcessSignaller;
use tokio_util::sync::CancellationToken;

/// One-way flag telling every loop of a session to wind down.
///
/// Clones observe the same flag. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal. Returns `true` only for the call that actually set it.
    pub fn trigger(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::AcqRel);
        self.token.cancel();
        first
    }

    pub fn is_set(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolves once the signal has been set.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}

/// Delivers at most one interrupt to the child for the whole session.
pub(crate) struct InterruptGuard {
    signaller: Arc<dyn ProcessSignaller>,
    spent: AtomicBool,
}

impl InterruptGuard {
    pub(crate) fn new(signaller: Arc<dyn ProcessSignaller>) -> Self {
        Self {
            signaller,
            spent: AtomicBool::new(false),
        }
    }

    /// Best-effort interrupt. Returns `true` if this call delivered it.
    pub(crate) fn request(&self) -> bool {
        if self.spent.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Err(err) = self.signaller.interrupt() {
            log::warn!("failed to interrupt session process: {err}");
        }
        true
    }

    /// Stop any further interrupts, e.g. once the child has been reaped and
    /// its pid may be reused.
    pub(crate) fn disarm(&self) {
        self.spent.store(true, Ordering::Release);
    }
}
