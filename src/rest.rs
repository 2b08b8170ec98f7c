//! Plain HTTP calls to the host: login and the startup volume/brightness read.
//!
//! Nothing here coordinates with the socket. Whatever lands in the store last wins.

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::json;
use thiserror::Error;

use crate::protocol::clamp_level;
use crate::state::StateStore;
use crate::types::{Session, ToastKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RestError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: &'static str,
        status: u16,
    },

    #[error("unexpected {endpoint} response: {source}")]
    Body {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(alias = "access_token")]
    token: String,
}

/// Levels arrive as any JSON number and are rounded into 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct VolumeReading {
    #[serde(deserialize_with = "level")]
    pub value: u8,
    #[serde(default)]
    pub muted: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BrightnessReading {
    #[serde(deserialize_with = "level")]
    pub value: u8,
}

fn level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    clamp_level(raw).ok_or_else(|| serde::de::Error::custom("level is not a finite number"))
}

pub fn parse_login(body: &str) -> Result<String, RestError> {
    serde_json::from_str::<LoginResponse>(body)
        .map(|r| r.token)
        .map_err(|source| RestError::Body {
            endpoint: "login",
            source,
        })
}

pub fn parse_volume(body: &str) -> Result<VolumeReading, RestError> {
    serde_json::from_str(body).map_err(|source| RestError::Body {
        endpoint: "volume",
        source,
    })
}

pub fn parse_brightness(body: &str) -> Result<BrightnessReading, RestError> {
    serde_json::from_str(body).map_err(|source| RestError::Body {
        endpoint: "brightness",
        source,
    })
}

pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RestError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get(&self, endpoint: &'static str) -> Result<String, RestError> {
        let mut request = self.http.get(self.url(endpoint));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RestError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// Exchange credentials for a token. The client keeps the token for later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Session, RestError> {
        let response = self
            .http
            .post(self.url("login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RestError::Status {
                endpoint: "login",
                status: status.as_u16(),
            });
        }
        let token = parse_login(&response.text().await?)?;
        self.token = Some(token.clone());
        Ok(Session {
            token,
            username: username.to_string(),
        })
    }

    pub async fn fetch_volume(&self) -> Result<VolumeReading, RestError> {
        parse_volume(&self.get("volume").await?)
    }

    pub async fn fetch_brightness(&self) -> Result<BrightnessReading, RestError> {
        parse_brightness(&self.get("brightness").await?)
    }

    /// Log in when credentials are given, then read both levels. Meant to run
    /// as its own task next to the socket; failures end up as toasts or logs.
    pub async fn bootstrap(mut self, credentials: Option<(String, String)>, store: StateStore) {
        if let Some((username, password)) = credentials {
            match self.login(&username, &password).await {
                Ok(session) => {
                    log::info!("Logged in as {}", session.username);
                    store.set_session(Some(session));
                }
                Err(e) => {
                    log::error!("Login failed: {}", e);
                    store.push_toast(ToastKind::Error, format!("Login failed: {}", e));
                }
            }
        }
        self.sync_levels(&store).await;
    }

    /// Read both levels into the store. Each failure is logged and skipped.
    pub async fn sync_levels(&self, store: &StateStore) {
        match self.fetch_volume().await {
            Ok(reading) => {
                store.set_volume_level(reading.value);
                if let Some(muted) = reading.muted {
                    store.set_muted(muted);
                }
            }
            Err(e) => log::warn!("Initial volume fetch failed: {}", e),
        }
        match self.fetch_brightness().await {
            Ok(reading) => store.set_brightness_level(reading.value),
            Err(e) => log::warn!("Initial brightness fetch failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_token_accepts_either_key() {
        assert_eq!(parse_login(r#"{"token":"abc"}"#).ok(), Some("abc".to_string()));
        assert_eq!(
            parse_login(r#"{"access_token":"xyz","expires":3600}"#).ok(),
            Some("xyz".to_string())
        );
        assert!(matches!(
            parse_login(r#"{"error":"bad credentials"}"#),
            Err(RestError::Body { endpoint: "login", .. })
        ));
    }

    #[test]
    fn volume_reading_with_and_without_mute() {
        assert_eq!(
            parse_volume(r#"{"value":35,"muted":true}"#).ok(),
            Some(VolumeReading {
                value: 35,
                muted: Some(true)
            })
        );
        assert_eq!(
            parse_volume(r#"{"value":35}"#).ok().and_then(|r| r.muted),
            None
        );
    }

    #[test]
    fn brightness_reading_requires_value() {
        assert_eq!(
            parse_brightness(r#"{"value":60}"#).ok(),
            Some(BrightnessReading { value: 60 })
        );
        assert!(parse_brightness("{}").is_err());
    }

    #[test]
    fn readings_round_and_clamp_like_the_socket() {
        let volume = |body| parse_volume(body).ok().map(|r| r.value);
        assert_eq!(volume(r#"{"value":140}"#), Some(100));
        assert_eq!(volume(r#"{"value":42.5}"#), Some(43));
        assert_eq!(volume(r#"{"value":-7}"#), Some(0));
        assert_eq!(
            parse_brightness(r#"{"value":99.6}"#).ok(),
            Some(BrightnessReading { value: 100 })
        );
        assert!(parse_brightness(r#"{"value":"bright"}"#).is_err());
    }

    #[tokio::test]
    async fn unreachable_host_leaves_a_toast_and_default_levels() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));
        drop(listener);

        let store = StateStore::new();
        let client = RestClient::new(base).expect("client");
        let credentials = Some(("ana".to_string(), "secret".to_string()));
        client.bootstrap(credentials, store.clone()).await;

        let state = store.snapshot();
        assert!(state.session.is_none());
        assert_eq!(state.toasts.len(), 1);
        assert_eq!(state.toasts[0].kind, ToastKind::Error);
        assert!(state.toasts[0].text.starts_with("Login failed"));
        assert_eq!(state.live.volume_level, 0);
        assert_eq!(state.live.brightness_level, 0);
    }

    #[test]
    fn urls_join_cleanly() {
        let client = RestClient::new("http://10.0.0.5:8000/").expect("client");
        assert_eq!(client.url("/volume"), "http://10.0.0.5:8000/volume");
        assert_eq!(client.url("login"), "http://10.0.0.5:8000/login");
    }
}
