use std::io;
use std::sync::Arc;

use futures::stream::SplitStream;
use futures::StreamExt;
use hostshell_pty::{
    CommandBuilder, ExitStatus, Geometry, ProcessHandle, ProcessSignaller, PtyError, PtyProvider,
    TerminalDevice,
};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use crate::config::SessionConfig;
use crate::shutdown;
use crate::signal::{InterruptGuard, TerminationSignal};
use crate::streams::{device_to_transport, spawn_device_reader, spawn_device_writer, Inbound};
use crate::transport::{Transport, TransportWriter};

/// Identifier used to tag a session's log lines and thread names.
pub type SessionId = u64;

/// Lifecycle of a session. Only ever moves forward; `Closed` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Starting,
    Streaming,
    Draining,
    Closed,
}

/// Which side ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    ProcessExited,
    PeerDisconnected,
}

#[derive(Debug)]
pub struct SessionOutcome {
    /// `None` if the exit status could not be collected.
    pub exit_status: Option<ExitStatus>,
    pub ended_by: EndReason,
}

/// Errors that stop a session before any byte is proxied.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to start terminal: {0}")]
    Attach(#[source] PtyError),
    #[error("failed to start session streams: {0}")]
    Streams(#[source] PtyError),
}

impl SessionError {
    /// The line written to the peer before the transport is closed.
    pub fn diagnostic(&self) -> String {
        let cause = match self {
            SessionError::Attach(err) | SessionError::Streams(err) => err,
        };
        format!("Failed to start terminal: {cause}\r\n")
    }
}

/// One interactive connection: a PTY-backed process bridged to a transport.
///
/// Sessions are self-contained; nothing is shared between them.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    phase: watch::Sender<SessionPhase>,
    geometry: Arc<watch::Sender<Geometry>>,
    signal: TerminationSignal,
}

impl Session {
    pub fn new(id: SessionId, config: SessionConfig) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Starting);
        let (geometry, _) = watch::channel(config.initial_geometry);
        Self {
            id,
            config,
            phase,
            geometry: Arc::new(geometry),
            signal: TerminationSignal::new(),
        }
    }

    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn watch_geometry(&self) -> watch::Receiver<Geometry> {
        self.geometry.subscribe()
    }

    pub fn termination_signal(&self) -> TerminationSignal {
        self.signal.clone()
    }

    /// Drive one session to completion.
    ///
    /// Attaches `command` to a new PTY, proxies bytes both ways until the
    /// process exits, then tears everything down. Returns only after every
    /// handle has been released. A failed attach is reported to the peer and
    /// returned as an error; a process exiting with a failure status is not an
    /// error.
    pub async fn run<T, P>(
        self,
        transport: T,
        provider: &P,
        command: CommandBuilder,
    ) -> Result<SessionOutcome, SessionError>
    where
        T: Transport,
        P: PtyProvider,
    {
        let id = self.id;
        let (sink, messages) = transport.split();
        let writer = Arc::new(TransportWriter::new(sink));

        let (device, process) = match provider.attach(command, self.config.initial_geometry) {
            Ok(attached) => attached,
            Err(err) => {
                log::error!("session {id}: failed to start terminal: {err}");
                return Err(self.abort(&writer, SessionError::Attach(err)).await);
            }
        };
        let device = Arc::new(device);
        if let Err(err) = device.resize(self.config.initial_geometry) {
            log::warn!("session {id}: failed to set initial size: {err}");
        }

        let signaller = process.signaller();
        let interrupt = Arc::new(InterruptGuard::new(signaller.clone()));

        let streams = match self.start_streams(&device, messages, &writer, &interrupt) {
            Ok(streams) => streams,
            Err(err) => {
                log::error!("session {id}: failed to start streams: {err}");
                self.signal.trigger();
                reap(id, process, signaller.as_ref()).await;
                device.close();
                return Err(self.abort(&writer, SessionError::Streams(err)).await);
            }
        };
        self.enter(SessionPhase::Streaming);
        log::info!(
            "session {id}: streaming (pid {:?}, {})",
            process.pid(),
            self.config.initial_geometry
        );

        let mut process = process;
        let mut waiter = tokio::task::spawn_blocking(move || process.wait());
        let (exit_status, ended_by) = self.wait_for_exit(&mut waiter, signaller.as_ref()).await;
        interrupt.disarm();

        self.enter(SessionPhase::Draining);
        shutdown::drain(id, &self.signal, writer.as_ref(), streams, device.as_ref()).await;
        self.enter(SessionPhase::Closed);
        log::info!("session {id}: closed ({ended_by:?})");

        Ok(SessionOutcome {
            exit_status,
            ended_by,
        })
    }

    fn start_streams<T, D>(
        &self,
        device: &Arc<D>,
        messages: SplitStream<T>,
        writer: &Arc<TransportWriter<T>>,
        interrupt: &Arc<InterruptGuard>,
    ) -> Result<[JoinHandle<()>; 2], PtyError>
    where
        T: Transport,
        D: TerminalDevice,
    {
        let chunk_size = self.config.read_chunk_size();
        let output = spawn_device_reader(self.id, device.reader()?, chunk_size, self.signal.clone())?;
        let input = spawn_device_writer(self.id, device.writer()?)?;

        let outbound = tokio::spawn(device_to_transport(
            self.id,
            output,
            writer.clone(),
            self.signal.clone(),
        ));
        let inbound = Inbound {
            session_id: self.id,
            device: device.clone(),
            input,
            geometry: self.geometry.clone(),
            control_prefix: self.config.control_prefix,
            signal: self.signal.clone(),
            interrupt: interrupt.clone(),
        };
        let inbound = tokio::spawn(inbound.run(messages));

        Ok([outbound, inbound])
    }

    /// Block until the process exits. If the peer disconnects first, the
    /// inbound loop has already asked the process to stop; with `kill_after`
    /// configured it is killed once the grace period runs out.
    async fn wait_for_exit(
        &self,
        waiter: &mut JoinHandle<io::Result<ExitStatus>>,
        signaller: &dyn ProcessSignaller,
    ) -> (Option<ExitStatus>, EndReason) {
        let id = self.id;
        tokio::select! {
            biased;
            joined = &mut *waiter => {
                // The inbound loop raises the signal before it interrupts, so
                // a set signal here means the peer left first.
                let ended_by = if self.signal.is_set() {
                    EndReason::PeerDisconnected
                } else {
                    EndReason::ProcessExited
                };
                return (log_exit(id, joined), ended_by);
            }
            _ = self.signal.wait() => {}
        }

        self.enter(SessionPhase::Draining);
        let joined = match self.config.kill_after {
            None => waiter.await,
            Some(grace) => match tokio::time::timeout(grace, &mut *waiter).await {
                Ok(joined) => joined,
                Err(_) => {
                    log::warn!("session {id}: process still running {grace:?} after disconnect, killing it");
                    if let Err(err) = signaller.kill() {
                        log::warn!("session {id}: kill failed: {err}");
                    }
                    waiter.await
                }
            },
        };
        (log_exit(id, joined), EndReason::PeerDisconnected)
    }

    /// Report a startup failure to the peer and close the transport.
    async fn abort<T: Transport>(
        &self,
        writer: &TransportWriter<T>,
        error: SessionError,
    ) -> SessionError {
        if let Err(err) = writer.send(error.diagnostic().into_bytes()).await {
            log::debug!("session {}: could not report startup failure: {err}", self.id);
        }
        writer.close().await;
        self.signal.trigger();
        self.enter(SessionPhase::Closed);
        error
    }

    fn enter(&self, next: SessionPhase) {
        let id = self.id;
        self.phase.send_if_modified(|phase| {
            if *phase == next || *phase == SessionPhase::Closed {
                return false;
            }
            log::debug!("session {id}: {phase:?} -> {next:?}");
            *phase = next;
            true
        });
    }
}

/// Kill and wait for a process the session will not stream for.
async fn reap<P: ProcessHandle>(id: SessionId, mut process: P, signaller: &dyn ProcessSignaller) {
    if let Err(err) = signaller.kill() {
        log::warn!("session {id}: kill failed: {err}");
    }
    let joined = tokio::task::spawn_blocking(move || process.wait()).await;
    log_exit(id, joined);
}

fn log_exit(id: SessionId, joined: Result<io::Result<ExitStatus>, JoinError>) -> Option<ExitStatus> {
    match joined {
        Ok(Ok(status)) if status.success() => {
            log::info!("session {id}: process exited");
            Some(status)
        }
        Ok(Ok(status)) => {
            log::info!("session {id}: process exited with code {}", status.exit_code());
            Some(status)
        }
        Ok(Err(err)) => {
            log::warn!("session {id}: waiting on process failed: {err}");
            None
        }
        Err(err) => {
            log::error!("session {id}: process wait task failed: {err}");
            None
        }
    }
}
