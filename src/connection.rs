//! Connection manager: one socket to the host at a time.
//!
//! All socket callbacks, timer expiries and caller requests arrive as [`Event`]s
//! on one channel and are processed in order by [`ConnectionManager::process`],
//! so a frame is fully classified and written to the store before the next
//! event is looked at.
//!
//! Lifecycle: `Idle → Connecting → Open → (Closed → Connecting)* → Idle`.
//! Stale sockets and timers are recognised by their epoch/token and ignored.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::command::{Command, Outbound, SystemCommand};
use crate::protocol::{self, InboundMessage};
use crate::scheduler::{PendingTimer, ReconnectSink, Scheduler};
use crate::state::StateStore;
use crate::transport::{EventSink, Socket, SocketEvent, Transport};
use crate::types::{ConnectionState, ConnectionStatus};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Fixed pause between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts before giving up.
    pub max_retries: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug)]
pub enum Event {
    Connect(String),
    Close,
    Send(Outbound),
    /// Close and stop the run loop.
    Shutdown,
    Socket { epoch: u64, event: SocketEvent },
    ReconnectDue { token: u64 },
}

/// Cloneable front door to a running [`ConnectionManager`]. Every call is
/// fire-and-forget.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl ConnectionHandle {
    fn request(&self, event: Event) {
        if self.tx.send(event).is_err() {
            log::debug!("Connection manager has stopped, request dropped");
        }
    }

    pub fn connect(&self, url: impl Into<String>) {
        self.request(Event::Connect(url.into()));
    }

    pub fn close(&self) {
        self.request(Event::Close);
    }

    pub fn send_command(&self, name: impl Into<String>, payload: Option<Map<String, Value>>) {
        self.request(Event::Send(Command::with_payload(name, payload).into()));
    }

    pub fn send_structured_command(&self, command: SystemCommand) {
        self.request(Event::Send(command.into()));
    }

    pub fn send(&self, outbound: impl Into<Outbound>) {
        self.request(Event::Send(outbound.into()));
    }

    pub fn shutdown(&self) {
        self.request(Event::Shutdown);
    }
}

struct Pending {
    token: u64,
    timer: Box<dyn PendingTimer>,
}

pub struct ConnectionManager {
    config: ManagerConfig,
    store: StateStore,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    tx: mpsc::UnboundedSender<Event>,
    state: ConnectionState,
    epoch: u64,
    socket: Option<Box<dyn Socket>>,
    pending: Option<Pending>,
    next_token: u64,
}

impl ConnectionManager {
    pub fn new(
        config: ManagerConfig,
        store: StateStore,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            config,
            store,
            transport,
            scheduler,
            tx,
            state: ConnectionState::default(),
            epoch: 0,
            socket: None,
            pending: None,
            next_token: 0,
        };
        (manager, rx)
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Run the event loop on the tokio runtime until `Shutdown`.
    pub fn spawn(self, events: mpsc::UnboundedReceiver<Event>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        log::info!("Connection manager started");
        while let Some(event) = events.recv().await {
            if self.process(event).is_break() {
                break;
            }
        }
        log::info!("Connection manager stopped");
    }

    pub fn process(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::Connect(url) => self.connect(url),
            Event::Close => self.close(),
            Event::Send(outbound) => self.send(&outbound),
            Event::Shutdown => {
                self.close();
                return ControlFlow::Break(());
            }
            Event::Socket { epoch, event } => self.on_socket_event(epoch, event),
            Event::ReconnectDue { token } => self.on_reconnect_due(token),
        }
        ControlFlow::Continue(())
    }

    /// Point the manager at `url`, replacing any current socket or pending retry.
    /// A caller-initiated connect starts a fresh retry budget.
    pub fn connect(&mut self, url: String) {
        log::info!("Connecting to {}", url);
        self.state.retry_count = 0;
        self.open(url);
    }

    /// End the session. No reconnect happens until the next `connect`.
    pub fn close(&mut self) {
        self.cancel_pending();
        self.dispose_socket();
        let was_active = self.state.target_url.is_some();
        self.state = ConnectionState {
            last_error: self.state.last_error.take(),
            ..ConnectionState::default()
        };
        self.publish();
        if was_active {
            log::info!("Connection closed");
        }
    }

    /// Send a frame if the socket is open; otherwise drop it silently.
    pub fn send(&mut self, outbound: &Outbound) {
        match self.socket.as_mut() {
            Some(socket) if self.state.status == ConnectionStatus::Connected => {
                let text = outbound.encode();
                log::debug!("Sending {}", text);
                socket.send(text);
            }
            _ => log::debug!("Not connected, dropping {:?}", outbound),
        }
    }

    fn open(&mut self, url: String) {
        self.cancel_pending();
        self.dispose_socket();

        self.epoch += 1;
        self.state.target_url = Some(url.clone());
        self.state.status = ConnectionStatus::Connecting;
        self.publish();

        let sink = EventSink::new(self.epoch, self.tx.clone());
        self.socket = Some(self.transport.open(&url, sink));
    }

    fn on_socket_event(&mut self, epoch: u64, event: SocketEvent) {
        if epoch != self.epoch || self.socket.is_none() {
            log::debug!("Ignoring {:?} from stale socket (epoch {})", event, epoch);
            return;
        }

        match event {
            SocketEvent::Opened => {
                log::info!(
                    "Connected to {}",
                    self.state.target_url.as_deref().unwrap_or_default()
                );
                self.state.status = ConnectionStatus::Connected;
                self.state.retry_count = 0;
                self.state.last_error = None;
                self.publish();
            }
            SocketEvent::Message(text) => {
                if self.state.status == ConnectionStatus::Connected {
                    self.dispatch(&text);
                } else {
                    log::debug!("Frame received before open, dropping");
                }
            }
            SocketEvent::Error(message) => {
                log::warn!("Socket error: {}", message);
                self.state.status = ConnectionStatus::Disconnected;
                self.state.last_error = Some(message);
                self.publish();
            }
            SocketEvent::Closed => {
                log::warn!("Socket closed");
                self.socket = None;
                self.state.status = ConnectionStatus::Disconnected;
                self.publish();
                self.schedule_reconnect();
            }
        }
    }

    /// Classify one frame and apply it to the store in a single mutation.
    fn dispatch(&self, text: &str) {
        match protocol::classify(text) {
            Ok(inbound) => match inbound.message {
                InboundMessage::Unknown(kind) => {
                    log::debug!("Ignoring unknown message kind '{}'", kind);
                }
                message => {
                    log::debug!("Applying {:?} (status {})", message, inbound.status);
                    self.store.update_live(|live| message.apply(live));
                }
            },
            Err(e) => {
                log::warn!("Dropping frame: {}", e);
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.state.target_url.is_none() {
            return;
        }
        if self.state.retry_count >= self.config.max_retries {
            log::warn!(
                "Giving up after {} reconnect attempts",
                self.state.retry_count
            );
            return;
        }

        self.cancel_pending();
        self.state.retry_count += 1;
        self.next_token += 1;
        let token = self.next_token;
        log::info!(
            "Reconnecting in {:?} (attempt {}/{})",
            self.config.reconnect_delay,
            self.state.retry_count,
            self.config.max_retries
        );
        let timer = self.scheduler.schedule(
            self.config.reconnect_delay,
            ReconnectSink::new(token, self.tx.clone()),
        );
        self.pending = Some(Pending { token, timer });
        self.publish();
    }

    fn on_reconnect_due(&mut self, token: u64) {
        if self.pending.as_ref().map(|p| p.token) != Some(token) {
            log::debug!("Ignoring stale reconnect timer {}", token);
            return;
        }
        self.pending = None;
        if let Some(url) = self.state.target_url.clone() {
            self.open(url);
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.cancel();
        }
    }

    /// Drop the current socket without letting it report back.
    fn dispose_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            // Later events from it carry the old epoch.
            self.epoch += 1;
            socket.close();
        }
    }

    fn publish(&self) {
        self.store.set_connection(self.state.clone());
    }
}
