use hostshell_pty::TerminalDevice;
use tokio::task::JoinHandle;

use crate::session::SessionId;
use crate::signal::TerminationSignal;
use crate::transport::{Transport, TransportWriter};

/// Tear a session down once its process has exited.
///
/// The order is fixed: raise the signal, close the transport so a pending
/// write cannot hang on a dead peer, wait for both loops, and only then
/// release the PTY so no loop can touch a released device.
pub(crate) async fn drain<T, D>(
    session_id: SessionId,
    signal: &TerminationSignal,
    transport: &TransportWriter<T>,
    streams: [JoinHandle<()>; 2],
    device: &D,
) where
    T: Transport,
    D: TerminalDevice,
{
    signal.trigger();
    transport.close().await;

    for stream in streams {
        if let Err(err) = stream.await {
            log::error!("session {session_id}: stream task failed: {err}");
        }
    }

    device.close();
}
