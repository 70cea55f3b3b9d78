//! The two copy loops of a session.
//!
//! PTY reads and writes block, so each direction gets a dedicated OS thread
//! that owns the blocking handle and talks to an async loop over a bounded
//! channel. The async loops are the ones the shutdown path waits on; they
//! select on the termination signal so neither can outlive a teardown.

use std::io::{self, Read, Write};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use hostshell_pty::{is_hangup, Geometry, TerminalDevice};
use tokio::sync::{mpsc, watch};

use crate::control::{decode_resize, ControlPrefix, Frame};
use crate::session::SessionId;
use crate::signal::{InterruptGuard, TerminationSignal};
use crate::transport::{Transport, TransportWriter};

/// Chunks buffered between a PTY thread and its async loop.
const DEVICE_QUEUE_DEPTH: usize = 32;

/// Start the blocking PTY reader thread.
///
/// The thread checks `signal` before every read and stops on end of stream,
/// on a read error, or when the receiving loop has gone away.
pub(crate) fn spawn_device_reader(
    session_id: SessionId,
    mut reader: Box<dyn Read + Send>,
    chunk_size: usize,
    signal: TerminationSignal,
) -> io::Result<mpsc::Receiver<Vec<u8>>> {
    let (tx, rx) = mpsc::channel(DEVICE_QUEUE_DEPTH);
    std::thread::Builder::new()
        .name(format!("pty-reader-{session_id}"))
        .spawn(move || {
            let mut buf = vec![0u8; chunk_size];
            loop {
                if signal.is_set() {
                    return;
                }
                let n = match reader.read(&mut buf) {
                    Ok(0) => return,
                    Ok(n) => n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) if is_hangup(&err) => return,
                    Err(err) => {
                        log::warn!("session {session_id}: pty read error: {err}");
                        return;
                    }
                };
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    return;
                }
            }
        })?;
    Ok(rx)
}

/// Start the blocking PTY writer thread. Input is written in the order it is
/// queued. The thread exits on the first write error or once every sender
/// has been dropped.
pub(crate) fn spawn_device_writer(
    session_id: SessionId,
    mut writer: Box<dyn Write + Send>,
) -> io::Result<mpsc::Sender<Vec<u8>>> {
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(DEVICE_QUEUE_DEPTH);
    std::thread::Builder::new()
        .name(format!("pty-writer-{session_id}"))
        .spawn(move || {
            while let Some(bytes) = rx.blocking_recv() {
                if let Err(err) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
                    log::warn!("session {session_id}: pty write error: {err}");
                    return;
                }
            }
        })?;
    Ok(tx)
}

/// Device -> transport: forward PTY output verbatim.
pub(crate) async fn device_to_transport<T: Transport>(
    session_id: SessionId,
    mut output: mpsc::Receiver<Vec<u8>>,
    transport: Arc<TransportWriter<T>>,
    signal: TerminationSignal,
) {
    loop {
        let chunk = tokio::select! {
            biased;
            _ = signal.wait() => break,
            chunk = output.recv() => chunk,
        };
        let Some(chunk) = chunk else {
            log::debug!("session {session_id}: pty output ended");
            break;
        };
        tokio::select! {
            biased;
            _ = signal.wait() => break,
            sent = transport.send(chunk) => {
                if let Err(err) = sent {
                    log::warn!("session {session_id}: transport write error: {err}");
                    break;
                }
            }
        }
    }
}

/// State the inbound loop needs besides the transport itself.
pub(crate) struct Inbound<D> {
    pub(crate) session_id: SessionId,
    pub(crate) device: Arc<D>,
    pub(crate) input: mpsc::Sender<Vec<u8>>,
    pub(crate) geometry: Arc<watch::Sender<Geometry>>,
    pub(crate) control_prefix: ControlPrefix,
    pub(crate) signal: TerminationSignal,
    pub(crate) interrupt: Arc<InterruptGuard>,
}

impl<D: TerminalDevice> Inbound<D> {
    /// Transport -> device: forward keystrokes, apply control frames.
    ///
    /// Each transport message is classified on its own. Losing the transport
    /// (end of stream or error) tears the session down and asks the child to
    /// stop. Losing the PTY writer only ends this loop.
    pub(crate) async fn run<R>(self, mut messages: R)
    where
        R: Stream<Item = io::Result<Vec<u8>>> + Unpin,
    {
        let session_id = self.session_id;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.signal.wait() => break,
                next = messages.next() => next,
            };
            let message = match next {
                None => {
                    log::info!("session {session_id}: peer closed the transport");
                    self.disconnect();
                    break;
                }
                Some(Err(err)) => {
                    log::warn!("session {session_id}: transport read error: {err}");
                    self.disconnect();
                    break;
                }
                Some(Ok(message)) if message.is_empty() => continue,
                Some(Ok(message)) => message,
            };

            match self.control_prefix.classify(&message) {
                Frame::Control(payload) => self.apply_control(payload),
                Frame::Data(bytes) => {
                    // A stuck PTY writer must not keep this loop from
                    // observing termination.
                    let queued = tokio::select! {
                        biased;
                        _ = self.signal.wait() => break,
                        queued = self.input.send(bytes.to_vec()) => queued,
                    };
                    if queued.is_err() {
                        log::warn!("session {session_id}: pty writer stopped, dropping input");
                        break;
                    }
                }
            }
        }
    }

    fn disconnect(&self) {
        self.signal.trigger();
        self.interrupt.request();
    }

    fn apply_control(&self, payload: &[u8]) {
        let request = decode_resize(payload);
        if request.is_empty() {
            log::debug!(
                "session {}: ignoring control frame without a usable size",
                self.session_id
            );
            return;
        }

        let current = *self.geometry.borrow();
        let next = current.apply(request);
        if next == current {
            return;
        }
        match self.device.resize(next) {
            Ok(()) => {
                log::debug!("session {}: resized {current} -> {next}", self.session_id);
                self.geometry.send_replace(next);
            }
            Err(err) => log::warn!("session {}: resize to {next} failed: {err}", self.session_id),
        }
    }
}
