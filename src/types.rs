use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub state: PlaybackState,
    pub position: Duration,
    pub length: Duration,
    pub artwork: Option<ArtWork>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
    /// Anything the host reports that is not one of the above.
    Other(String),
}

impl PlaybackState {
    pub fn from_wire(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "playing" => PlaybackState::Playing,
            "paused" => PlaybackState::Paused,
            "stopped" => PlaybackState::Stopped,
            _ => PlaybackState::Other(raw.to_string()),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// Artwork reference as sent by the host: either a URL or base64 image data,
/// optionally wrapped in a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtWork(pub String);

impl ArtWork {
    pub fn is_url(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }

    /// Decode embedded image bytes. Returns `None` for URL references.
    pub fn decode_base64(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        if self.is_url() {
            return None;
        }
        let encoded = match self.0.split_once(";base64,") {
            Some((_, rest)) => rest,
            None => self.0.as_str(),
        };
        Some(STANDARD.decode(encoded.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BluetoothDevice {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WifiInfo {
    pub ssid: Option<String>,
    pub ip: Option<String>,
    pub signal: Option<f64>,
    pub speed: Option<f64>,
}

/// State pushed by the host over the socket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveDeviceState {
    pub media_info: Option<MediaInfo>,
    pub art_work: Option<ArtWork>,
    pub bluetooth_devices: Vec<BluetoothDevice>,
    pub wifi_info: Option<WifiInfo>,
    pub volume_level: u8,
    pub is_muted: bool,
    pub brightness_level: u8,
    pub command_output: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub target_url: Option<String>,
    pub retry_count: u32,
}

impl ConnectionState {
    /// No socket wanted: never connected, explicitly closed, or retries exhausted.
    pub fn is_idle(&self, max_retries: u32) -> bool {
        self.status == ConnectionStatus::Disconnected
            && (self.target_url.is_none() || self.retry_count >= max_retries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub kind: ToastKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub id: u64,
    pub text: String,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub connection: ConnectionState,
    pub live: LiveDeviceState,
    pub toasts: Vec<Toast>,
    pub todos: Vec<Todo>,
    pub session: Option<Session>,
}
