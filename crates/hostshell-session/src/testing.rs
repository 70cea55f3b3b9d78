//! Scripted stand-ins for the PTY and child process.

use std::io::{self, Read, Write};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Sink, Stream};
use tokio::sync::mpsc;

use hostshell_pty::{
    CommandBuilder, ExitStatus, Geometry, ProcessHandle, ProcessSignaller, PtyError, PtyProvider,
    TerminalDevice,
};

#[derive(Default)]
struct DeviceState {
    input: Mutex<Vec<u8>>,
    resizes: Mutex<Vec<Geometry>>,
    output_tx: Mutex<Option<std_mpsc::Sender<Vec<u8>>>>,
    output_rx: Mutex<Option<std_mpsc::Receiver<Vec<u8>>>>,
    writer_taken: AtomicBool,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    closes: AtomicUsize,
}

/// In-memory terminal device. Clones share state.
#[derive(Clone)]
pub(crate) struct FakeDevice {
    state: Arc<DeviceState>,
}

impl FakeDevice {
    pub(crate) fn new() -> Self {
        let (tx, rx) = std_mpsc::channel();
        let state = DeviceState {
            output_tx: Mutex::new(Some(tx)),
            output_rx: Mutex::new(Some(rx)),
            ..DeviceState::default()
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// Make bytes available to the device reader, as if the process printed them.
    pub(crate) fn emit(&self, bytes: &[u8]) {
        if let Some(tx) = self.state.output_tx.lock().unwrap().as_ref() {
            let _ = tx.send(bytes.to_vec());
        }
    }

    /// End of stream on the device reader.
    pub(crate) fn hang_up(&self) {
        self.state.output_tx.lock().unwrap().take();
    }

    pub(crate) fn fail_writes(&self) {
        self.state.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Block every device write until [`FakeDevice::release_writes`], like a
    /// PTY whose input buffer nobody drains.
    pub(crate) fn stall_writes(&self) {
        self.state.stall_writes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release_writes(&self) {
        self.state.stall_writes.store(false, Ordering::SeqCst);
    }

    pub(crate) fn input(&self) -> Vec<u8> {
        self.state.input.lock().unwrap().clone()
    }

    pub(crate) fn resizes(&self) -> Vec<Geometry> {
        self.state.resizes.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_input(&self, expected: &[u8], timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.input() != expected {
            assert!(
                tokio::time::Instant::now() < deadline,
                "device input {:?} never became {:?}",
                String::from_utf8_lossy(&self.input()),
                String::from_utf8_lossy(expected)
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl TerminalDevice for FakeDevice {
    fn resize(&self, geometry: Geometry) -> Result<(), PtyError> {
        self.state.resizes.lock().unwrap().push(geometry);
        Ok(())
    }

    fn reader(&self) -> Result<Box<dyn Read + Send>, PtyError> {
        let rx = self
            .state
            .output_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| PtyError::Io(io::Error::other("reader already taken")))?;
        Ok(Box::new(ChannelReader {
            rx,
            pending: Vec::new(),
        }))
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>, PtyError> {
        if self.state.writer_taken.swap(true, Ordering::SeqCst) {
            return Err(PtyError::Io(io::Error::other("writer already taken")));
        }
        Ok(Box::new(RecordingWriter {
            state: self.state.clone(),
        }))
    }

    fn close(&self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct ChannelReader {
    rx: std_mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct RecordingWriter {
    state: Arc<DeviceState>,
}

impl Write for RecordingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        while self.state.stall_writes.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.state.input.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Counts signals; optionally makes the fake process exit in response.
#[derive(Default)]
pub(crate) struct FakeSignaller {
    interrupts: AtomicUsize,
    kills: AtomicUsize,
    exit_on_interrupt: bool,
    exit_tx: Mutex<Option<std_mpsc::Sender<u32>>>,
}

impl FakeSignaller {
    pub(crate) fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    fn exit_with(&self, code: u32) {
        if let Some(tx) = self.exit_tx.lock().unwrap().as_ref() {
            let _ = tx.send(code);
        }
    }
}

impl ProcessSignaller for FakeSignaller {
    fn interrupt(&self) -> io::Result<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        if self.exit_on_interrupt {
            self.exit_with(130);
        }
        Ok(())
    }

    fn kill(&self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.exit_with(137);
        Ok(())
    }
}

/// A child whose exit is driven by the test or by its signaller.
pub(crate) struct FakeProcess {
    exits: std_mpsc::Receiver<u32>,
    signaller: Arc<FakeSignaller>,
}

/// Lets a test end a [`FakeProcess`] with a chosen code.
#[derive(Clone)]
pub(crate) struct ExitTrigger {
    tx: std_mpsc::Sender<u32>,
}

impl ExitTrigger {
    pub(crate) fn exit(&self, code: u32) {
        let _ = self.tx.send(code);
    }
}

impl FakeProcess {
    /// `exit_on_interrupt` models a shell that honours SIGINT; without it the
    /// process only ends through the trigger or a kill.
    pub(crate) fn new(exit_on_interrupt: bool) -> (Self, ExitTrigger, Arc<FakeSignaller>) {
        let (tx, rx) = std_mpsc::channel();
        let signaller = Arc::new(FakeSignaller {
            exit_on_interrupt,
            exit_tx: Mutex::new(Some(tx.clone())),
            ..FakeSignaller::default()
        });
        let process = Self {
            exits: rx,
            signaller: signaller.clone(),
        };
        (process, ExitTrigger { tx }, signaller)
    }
}

impl ProcessHandle for FakeProcess {
    fn wait(&mut self) -> io::Result<ExitStatus> {
        self.exits
            .recv()
            .map(ExitStatus::with_exit_code)
            .map_err(|_| io::Error::other("fake process lost its exit channel"))
    }

    fn signaller(&self) -> Arc<dyn ProcessSignaller> {
        self.signaller.clone()
    }

    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Provider handing out one prepared device/process pair.
pub(crate) struct FakePty {
    device: FakeDevice,
    process: Mutex<Option<FakeProcess>>,
    attached_at: Mutex<Option<Geometry>>,
    fail: bool,
}

impl FakePty {
    pub(crate) fn new(device: FakeDevice, process: FakeProcess) -> Self {
        Self {
            device,
            process: Mutex::new(Some(process)),
            attached_at: Mutex::new(None),
            fail: false,
        }
    }

    /// A provider whose attach always fails, like a missing shell binary.
    pub(crate) fn failing() -> Self {
        Self {
            device: FakeDevice::new(),
            process: Mutex::new(None),
            attached_at: Mutex::new(None),
            fail: true,
        }
    }

    pub(crate) fn attached_at(&self) -> Option<Geometry> {
        *self.attached_at.lock().unwrap()
    }
}

impl PtyProvider for FakePty {
    type Device = FakeDevice;
    type Process = FakeProcess;

    fn attach(
        &self,
        _command: CommandBuilder,
        geometry: Geometry,
    ) -> Result<(FakeDevice, FakeProcess), PtyError> {
        if self.fail {
            return Err(PtyError::Spawn("no such file or directory".to_string()));
        }
        let process = self
            .process
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| PtyError::Spawn("already attached".to_string()))?;
        *self.attached_at.lock().unwrap() = Some(geometry);
        Ok((self.device.clone(), process))
    }
}

/// In-memory message transport. Each message the [`Peer`] sends arrives as
/// exactly one stream item, and each message the session sends is kept
/// whole.
pub(crate) fn message_pipe() -> (PipeTransport, Peer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let transport = PipeTransport {
        incoming: inbound_rx,
        outgoing: Some(outbound_tx),
    };
    let peer = Peer {
        tx: Some(inbound_tx),
        rx: outbound_rx,
    };
    (transport, peer)
}

pub(crate) struct PipeTransport {
    incoming: mpsc::UnboundedReceiver<io::Result<Vec<u8>>>,
    outgoing: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl PipeTransport {
    fn outgoing(&self) -> io::Result<&mpsc::UnboundedSender<Vec<u8>>> {
        match &self.outgoing {
            Some(tx) if !tx.is_closed() => Ok(tx),
            _ => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        }
    }
}

impl Stream for PipeTransport {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.incoming.poll_recv(cx)
    }
}

impl Sink<Vec<u8>> for PipeTransport {
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.outgoing().map(|_| ()))
    }

    fn start_send(self: Pin<&mut Self>, message: Vec<u8>) -> io::Result<()> {
        self.outgoing()?
            .send(message)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.outgoing = None;
        Poll::Ready(Ok(()))
    }
}

/// The remote end of a [`message_pipe`].
pub(crate) struct Peer {
    tx: Option<mpsc::UnboundedSender<io::Result<Vec<u8>>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Peer {
    pub(crate) fn send(&self, message: &[u8]) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Ok(message.to_vec()));
        }
    }

    /// Deliver a read error to the session.
    pub(crate) fn fail(&self, kind: io::ErrorKind) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(io::Error::from(kind)));
        }
    }

    /// Close the peer's sending side; the session sees end of stream.
    pub(crate) fn hang_up(&mut self) {
        self.tx.take();
    }

    /// Next message from the session, `None` once the session closed its side.
    pub(crate) async fn recv(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .expect("no message from the session")
    }

    pub(crate) async fn messages_until_closed(&mut self, timeout: Duration) -> Vec<Vec<u8>> {
        let mut messages = Vec::new();
        while let Some(message) = self.recv(timeout).await {
            messages.push(message);
        }
        messages
    }
}
