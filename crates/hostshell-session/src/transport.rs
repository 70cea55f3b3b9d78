use std::io;

use futures::stream::SplitSink;
use futures::{Sink, SinkExt, Stream};
use tokio::sync::Mutex;

/// A duplex, message-oriented channel to the remote peer, already
/// authenticated.
///
/// Every item the stream yields is one message exactly as the peer sent it,
/// so a control frame is never merged with or split across keystrokes. The
/// stream ending means the peer closed the channel. Items sent through the
/// sink arrive at the peer as one message each.
pub trait Transport:
    Stream<Item = io::Result<Vec<u8>>> + Sink<Vec<u8>, Error = io::Error> + Send + Unpin + 'static
{
}

impl<T> Transport for T where
    T: Stream<Item = io::Result<Vec<u8>>>
        + Sink<Vec<u8>, Error = io::Error>
        + Send
        + Unpin
        + 'static
{
}

/// The write side of a session's transport, shared by the output loop and
/// the shutdown path.
pub(crate) struct TransportWriter<T> {
    inner: Mutex<Option<SplitSink<T, Vec<u8>>>>,
}

impl<T: Transport> TransportWriter<T> {
    pub(crate) fn new(sink: SplitSink<T, Vec<u8>>) -> Self {
        Self {
            inner: Mutex::new(Some(sink)),
        }
    }

    /// Send one message and flush it.
    pub(crate) async fn send(&self, message: Vec<u8>) -> io::Result<()> {
        let mut guard = self.inner.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport closed"))?;
        sink.send(message).await
    }

    /// Close the write side. Safe to call repeatedly or after the peer has
    /// already gone away.
    pub(crate) async fn close(&self) {
        let Some(mut sink) = self.inner.lock().await.take() else {
            return;
        };
        if let Err(err) = sink.close().await {
            log::debug!("transport close after peer loss: {err}");
        }
    }
}
