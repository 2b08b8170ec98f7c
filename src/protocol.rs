//! Inbound frames from the host.
//!
//! Every frame is a JSON object `{ "status": ..., "message": ..., "data": ... }`.
//! `message` selects how `data` is read. Volume and brightness have been sent
//! under several names over time and all of them are accepted.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::types::{ArtWork, BluetoothDevice, LiveDeviceState, MediaInfo, PlaybackState, WifiInfo};

/// Raw media times at or above this are microseconds.
pub const MICROS_THRESHOLD: f64 = 1_000_000.0;
/// Raw media times at or above this (and below [`MICROS_THRESHOLD`]) are milliseconds.
pub const MILLIS_THRESHOLD: f64 = 10_000.0;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{0}' frame has no data")]
    MissingData(&'static str),

    #[error("malformed '{kind}' payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// A classified frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub status: String,
    pub message: InboundMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    MediaInfo(MediaInfo),
    Bluetooth(Vec<BluetoothDevice>),
    Wifi(WifiInfo),
    CommandOutput(String),
    VolumeStatus {
        value: Option<u8>,
        muted: Option<bool>,
    },
    BrightnessStatus {
        value: Option<u8>,
    },
    SystemResult {
        current_volume: Option<u8>,
        current_brightness: Option<u8>,
    },
    /// A discriminator this client does not know.
    Unknown(String),
}

pub fn classify(text: &str) -> Result<Inbound, ParseError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let data = envelope.data;

    let message = match envelope.message.as_str() {
        "media_info" => InboundMessage::MediaInfo(parse_media(require(data, "media_info")?)?),
        "bluetooth_info" => {
            InboundMessage::Bluetooth(parse_bluetooth(require(data, "bluetooth_info")?)?)
        }
        "wifi_info" => InboundMessage::Wifi(parse_wifi(require(data, "wifi_info")?)?),
        "command_output" => InboundMessage::CommandOutput(stringify(data)),
        "volume_status" | "system_volume" => {
            let data = data.unwrap_or(Value::Null);
            InboundMessage::VolumeStatus {
                value: level(data.get("value")),
                muted: data.get("muted").and_then(Value::as_bool),
            }
        }
        "brightness_status" | "system_brightness" => {
            let data = data.unwrap_or(Value::Null);
            InboundMessage::BrightnessStatus {
                value: level(data.get("value")),
            }
        }
        "system" => {
            let data = data.unwrap_or(Value::Null);
            InboundMessage::SystemResult {
                current_volume: level(data.get("current_volume")),
                current_brightness: level(data.get("current_brightness")),
            }
        }
        _ => InboundMessage::Unknown(envelope.message),
    };

    Ok(Inbound {
        status: envelope.status,
        message,
    })
}

impl InboundMessage {
    /// Write this message into `live`. Returns whether any field was touched.
    pub fn apply(self, live: &mut LiveDeviceState) -> bool {
        match self {
            InboundMessage::MediaInfo(media) => {
                if let Some(art) = &media.artwork {
                    live.art_work = Some(art.clone());
                }
                live.media_info = Some(media);
                true
            }
            InboundMessage::Bluetooth(devices) => {
                live.bluetooth_devices = devices.into_iter().filter(|d| d.connected).collect();
                true
            }
            InboundMessage::Wifi(wifi) => {
                live.wifi_info = Some(wifi);
                true
            }
            InboundMessage::CommandOutput(output) => {
                live.command_output = Some(output);
                true
            }
            InboundMessage::VolumeStatus { value, muted } => {
                let mut changed = false;
                if let Some(value) = value {
                    live.volume_level = value;
                    changed = true;
                }
                if let Some(muted) = muted {
                    live.is_muted = muted;
                    changed = true;
                }
                changed
            }
            InboundMessage::BrightnessStatus { value } => match value {
                Some(value) => {
                    live.brightness_level = value;
                    true
                }
                None => false,
            },
            InboundMessage::SystemResult {
                current_volume,
                current_brightness,
            } => {
                let mut changed = false;
                if let Some(volume) = current_volume {
                    live.volume_level = volume;
                    changed = true;
                }
                if let Some(brightness) = current_brightness {
                    live.brightness_level = brightness;
                    changed = true;
                }
                changed
            }
            InboundMessage::Unknown(_) => false,
        }
    }
}

/// Hosts report media times in seconds, milliseconds or microseconds without
/// saying which; guess from the magnitude.
pub fn normalize_media_time(raw: f64) -> Duration {
    if !raw.is_finite() || raw <= 0.0 {
        return Duration::ZERO;
    }
    let seconds = if raw >= MICROS_THRESHOLD {
        raw / 1_000_000.0
    } else if raw >= MILLIS_THRESHOLD {
        raw / 1_000.0
    } else {
        raw
    };
    // Saturate instead of panicking on values past `Duration::MAX`.
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

fn require(data: Option<Value>, kind: &'static str) -> Result<Value, ParseError> {
    match data {
        Some(Value::Null) | None => Err(ParseError::MissingData(kind)),
        Some(value) => Ok(value),
    }
}

fn stringify(data: Option<Value>) -> String {
    match data {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// A 0–100 level; non-numeric values count as absent.
fn level(value: Option<&Value>) -> Option<u8> {
    clamp_level(value?.as_f64()?)
}

/// Round and clamp a raw level into 0–100. `None` for NaN or infinity.
pub fn clamp_level(raw: f64) -> Option<u8> {
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

/// Accepts `42`, `42.5` or `"42%"`.
fn lenient_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

#[derive(Deserialize)]
struct MediaPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default, alias = "state")]
    status: Option<String>,
    #[serde(default)]
    position: Option<f64>,
    #[serde(default, alias = "duration")]
    length: Option<f64>,
    #[serde(default, alias = "artWork")]
    artwork: Option<String>,
}

fn parse_media(data: Value) -> Result<MediaInfo, ParseError> {
    let payload: MediaPayload = serde_json::from_value(data).map_err(|source| ParseError::Payload {
        kind: "media_info",
        source,
    })?;

    Ok(MediaInfo {
        title: payload.title.unwrap_or_default(),
        artist: payload.artist.unwrap_or_default(),
        album: payload.album.unwrap_or_default(),
        state: payload
            .status
            .as_deref()
            .map(PlaybackState::from_wire)
            .unwrap_or(PlaybackState::Stopped),
        position: payload.position.map(normalize_media_time).unwrap_or_default(),
        length: payload.length.map(normalize_media_time).unwrap_or_default(),
        artwork: payload
            .artwork
            .filter(|a| !a.trim().is_empty())
            .map(ArtWork),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BluetoothPayload {
    List(Vec<BluetoothDevice>),
    Wrapped { devices: Vec<BluetoothDevice> },
}

fn parse_bluetooth(data: Value) -> Result<Vec<BluetoothDevice>, ParseError> {
    let payload: BluetoothPayload =
        serde_json::from_value(data).map_err(|source| ParseError::Payload {
            kind: "bluetooth_info",
            source,
        })?;
    Ok(match payload {
        BluetoothPayload::List(devices) => devices,
        BluetoothPayload::Wrapped { devices } => devices,
    })
}

fn parse_wifi(data: Value) -> Result<WifiInfo, ParseError> {
    if !data.is_object() {
        let source = <serde_json::Error as serde::de::Error>::custom("expected an object");
        return Err(ParseError::Payload {
            kind: "wifi_info",
            source,
        });
    }
    let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);

    Ok(WifiInfo {
        ssid: text("ssid"),
        ip: text("ip").or_else(|| text("ip_address")),
        signal: lenient_number(data.get("signal")),
        speed: lenient_number(data.get("speed")),
    })
}
