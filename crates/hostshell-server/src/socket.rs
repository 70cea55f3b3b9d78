//! WebSocket adapter for the session transport.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, Stream};

/// One WebSocket data message is one transport message.
///
/// Text and binary frames both carry terminal input. Output always goes out
/// as binary frames because PTY output need not be valid UTF-8. Pings are
/// answered by the socket itself and never reach the session.
pub struct WsTransport {
    socket: WebSocket,
    closed: bool,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            closed: false,
        }
    }
}

impl Stream for WsTransport {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.closed {
                return Poll::Ready(None);
            }
            match ready!(Pin::new(&mut self.socket).poll_next(cx)) {
                Some(Ok(Message::Binary(bytes))) => return Poll::Ready(Some(Ok(Vec::from(bytes)))),
                Some(Ok(Message::Text(text))) => {
                    return Poll::Ready(Some(Ok(text.as_str().as_bytes().to_vec())));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => self.closed = true,
                Some(Err(err)) => return Poll::Ready(Some(Err(io::Error::other(err)))),
            }
        }
    }
}

impl Sink<Vec<u8>> for WsTransport {
    type Error = io::Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket)
            .poll_ready(cx)
            .map_err(io::Error::other)
    }

    fn start_send(mut self: Pin<&mut Self>, message: Vec<u8>) -> io::Result<()> {
        Pin::new(&mut self.socket)
            .start_send(Message::Binary(message.into()))
            .map_err(io::Error::other)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket)
            .poll_flush(cx)
            .map_err(io::Error::other)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket)
            .poll_close(cx)
            .map_err(io::Error::other)
    }
}
