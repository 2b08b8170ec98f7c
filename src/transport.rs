//! Socket transport used by the connection manager.
//!
//! A transport opens one socket per call and reports what happens to it through
//! an [`EventSink`] tagged with the epoch of the `connect` that created it.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::connection::Event;

/// What a socket reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Message(String),
    Error(String),
    /// Always follows `Error`, and is sent on remote close or a failed open.
    Closed,
}

/// Where a socket delivers its events.
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub(crate) fn new(epoch: u64, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns `false` once the manager is gone.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.tx
            .send(Event::Socket {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

pub trait Transport: Send + Sync {
    /// Start opening a socket to `url`. Must not block; the outcome arrives on `sink`.
    fn open(&self, url: &str, sink: EventSink) -> Box<dyn Socket>;
}

pub trait Socket: Send {
    /// Queue a text frame. Frames go out in call order.
    fn send(&mut self, text: String);

    /// Close without reporting `Closed` back to the manager.
    fn close(self: Box<Self>);
}

enum Outgoing {
    Text(String),
    Close,
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn open(&self, url: &str, sink: EventSink) -> Box<dyn Socket> {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(url.to_string(), sink, rx));
        Box::new(WsSocket { outgoing: tx, task })
    }
}

struct WsSocket {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

impl Socket for WsSocket {
    fn send(&mut self, text: String) {
        if self.outgoing.send(Outgoing::Text(text)).is_err() {
            log::debug!("Socket task already finished, dropping frame");
        }
    }

    fn close(self: Box<Self>) {
        if self.outgoing.send(Outgoing::Close).is_err() {
            // Task is gone or stuck before the close is seen.
            self.task.abort();
        }
    }
}

/// Resolves once the owner asked to close or dropped the socket.
async fn closed_by_owner(outgoing: &mut mpsc::UnboundedReceiver<Outgoing>) {
    loop {
        match outgoing.recv().await {
            Some(Outgoing::Text(_)) => log::debug!("Dropping frame queued before open"),
            Some(Outgoing::Close) | None => return,
        }
    }
}

async fn run_socket(
    url: String,
    sink: EventSink,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    log::debug!("Opening socket to {} (epoch {})", url, sink.epoch());

    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                sink.emit(SocketEvent::Error(e.to_string()));
                sink.emit(SocketEvent::Closed);
                return;
            }
        },
        _ = closed_by_owner(&mut outgoing) => {
            log::debug!("Socket to {} abandoned while opening", url);
            return;
        }
    };

    let (mut write, mut read) = stream.split();
    if !sink.emit(SocketEvent::Opened) {
        return;
    }

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !sink.emit(SocketEvent::Message(text)) {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    sink.emit(SocketEvent::Closed);
                    return;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    sink.emit(SocketEvent::Error(e.to_string()));
                    sink.emit(SocketEvent::Closed);
                    return;
                }
            },
            request = outgoing.recv() => match request {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        sink.emit(SocketEvent::Error(e.to_string()));
                        sink.emit(SocketEvent::Closed);
                        return;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    log::debug!("Socket to {} closed by owner", url);
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(200);

    async fn local_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        (listener, format!("ws://{}/ws", addr))
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> SocketEvent {
        match tokio::time::timeout(WAIT, rx.recv()).await {
            Ok(Some(Event::Socket { epoch, event })) => {
                assert_eq!(epoch, 3);
                event
            }
            other => panic!("expected a socket event, got {other:?}"),
        }
    }

    async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<Event>) {
        let waited = tokio::time::timeout(QUIET, rx.recv()).await;
        assert!(matches!(waited, Ok(None) | Err(_)), "unexpected {waited:?}");
    }

    #[tokio::test]
    async fn refused_open_reports_error_then_closed() {
        let (listener, url) = local_listener().await;
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _socket = WsTransport.open(&url, EventSink::new(3, tx));

        assert!(matches!(next_event(&mut rx).await, SocketEvent::Error(_)));
        assert_eq!(next_event(&mut rx).await, SocketEvent::Closed);
    }

    #[tokio::test]
    async fn text_frames_and_remote_close_are_reported() {
        let (listener, url) = local_listener().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(tcp).await.expect("handshake");
            ws.send(Message::Text("{\"message\":\"hello\"}".to_string()))
                .await
                .expect("send");
            ws.close(None).await.expect("close");
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _socket = WsTransport.open(&url, EventSink::new(3, tx));

        assert_eq!(next_event(&mut rx).await, SocketEvent::Opened);
        assert_eq!(
            next_event(&mut rx).await,
            SocketEvent::Message("{\"message\":\"hello\"}".to_string())
        );
        assert_eq!(next_event(&mut rx).await, SocketEvent::Closed);
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn sent_frames_reach_the_server() {
        let (listener, url) = local_listener().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(tcp).await.expect("handshake");
            match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                other => panic!("expected a text frame, got {other:?}"),
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut socket = WsTransport.open(&url, EventSink::new(3, tx));
        assert_eq!(next_event(&mut rx).await, SocketEvent::Opened);
        socket.send("{\"command\":\"next\"}".to_string());

        let received = tokio::time::timeout(WAIT, server).await.expect("server timed out");
        assert_eq!(received.expect("server task"), "{\"command\":\"next\"}");
    }

    #[tokio::test]
    async fn owner_close_of_open_socket_is_silent() {
        let (listener, url) = local_listener().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(tcp).await.expect("handshake");
            // Drain until the client's close frame arrives.
            while let Some(Ok(frame)) = ws.next().await {
                if frame.is_close() {
                    break;
                }
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket = WsTransport.open(&url, EventSink::new(3, tx));
        assert_eq!(next_event(&mut rx).await, SocketEvent::Opened);

        socket.close();
        assert_silent(&mut rx).await;
        tokio::time::timeout(WAIT, server)
            .await
            .expect("server never saw the close")
            .expect("server task");
    }

    #[tokio::test]
    async fn owner_close_while_opening_is_silent() {
        let (listener, url) = local_listener().await;
        // Accept the TCP connection but never answer the handshake.
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(WAIT).await;
            drop(tcp);
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let socket = WsTransport.open(&url, EventSink::new(3, tx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        socket.close();
        assert_silent(&mut rx).await;
        server.abort();
    }
}
