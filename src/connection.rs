//! Connection lifecycle for the hit stream
//!
//! `Connecting -> Open -> Closed -> Connecting -> ...` with no terminal
//! state. The manager is transport-agnostic: the native and browser
//! WebSocket drivers report opens, frames and closes, and act on the
//! reconnect delay it hands back.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::{IngestReport, MapConfig, MapState};
use crate::ws_state::ConnectionState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("unsupported origin scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("origin {0:?} has no host")]
    MissingHost(String),
}

/// Upgrade a page origin to the matching WebSocket URL.
///
/// `https://host` becomes `wss://host{path}`, `http://host` becomes
/// `ws://host{path}`. Anything after the host in `origin` is ignored.
pub fn endpoint_from_origin(origin: &str, path: &str) -> Result<String, EndpointError> {
    let (scheme, rest) = origin
        .split_once("://")
        .ok_or_else(|| EndpointError::UnsupportedScheme(origin.to_string()))?;

    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };

    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(EndpointError::MissingHost(origin.to_string()));
    }

    Ok(format!("{ws_scheme}://{host}{path}"))
}

/// Drives [`ConnectionState`] and single-flight reconnects
#[derive(Debug)]
pub struct ConnectionManager {
    endpoint: String,
    state: ConnectionState,
    reconnect_delay: Duration,
    /// A reconnect has been handed out and not yet started
    reconnect_pending: bool,
    frames: u64,
    reconnects: u64,
}

impl ConnectionManager {
    pub fn new(endpoint: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: ConnectionState::Connecting,
            reconnect_delay,
            reconnect_pending: false,
            frames: 0,
            reconnects: 0,
        }
    }

    /// Manager for `origin` with the configured path and backoff
    pub fn from_config(config: &MapConfig, origin: &str) -> Result<Self, EndpointError> {
        let endpoint = endpoint_from_origin(origin, &config.ws_path)?;
        Ok(Self::new(endpoint, config.reconnect_delay))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Handshake completed
    pub fn on_open(&mut self) {
        info!(endpoint = %self.endpoint, "Stream connected");
        self.state = ConnectionState::Open;
    }

    /// Feed one binary frame into the decoder, buffer and aggregator
    pub fn on_frame(&mut self, frame: &[u8], now: f64, map: &mut MapState) -> IngestReport {
        if !self.state.is_open() {
            debug!(state = %self.state, "Frame received outside Open state");
        }
        self.frames += 1;
        map.ingest(frame, now)
    }

    /// Error or remote close.
    ///
    /// Returns the delay after which the caller must call
    /// [`begin_reconnect`](Self::begin_reconnect), or `None` if a reconnect
    /// is already scheduled.
    pub fn on_close(&mut self, reason: &str) -> Option<Duration> {
        if self.reconnect_pending {
            debug!(reason, "Close while reconnect already scheduled");
            return None;
        }
        warn!(
            reason,
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "Stream closed, scheduling reconnect"
        );
        self.state = ConnectionState::Closed;
        self.reconnect_pending = true;
        Some(self.reconnect_delay)
    }

    /// Backoff elapsed: `Closed -> Connecting`.
    ///
    /// Returns false if no reconnect was pending.
    pub fn begin_reconnect(&mut self) -> bool {
        if !self.reconnect_pending {
            return false;
        }
        self.reconnect_pending = false;
        self.reconnects += 1;
        self.state = ConnectionState::Connecting;
        info!(attempt = self.reconnects, endpoint = %self.endpoint, "Reconnecting");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new("ws://localhost/ws", Duration::from_millis(5000))
    }

    #[test]
    fn test_endpoint_from_origin() {
        assert_eq!(
            endpoint_from_origin("https://mirror.example.org", "/ws").unwrap(),
            "wss://mirror.example.org/ws"
        );
        assert_eq!(
            endpoint_from_origin("http://127.0.0.1:8080/", "/map/ws").unwrap(),
            "ws://127.0.0.1:8080/map/ws"
        );
        assert_eq!(
            endpoint_from_origin("HTTPS://mirror.example.org/map?x=1", "/ws").unwrap(),
            "wss://mirror.example.org/ws"
        );
        assert_eq!(
            endpoint_from_origin("ftp://mirror.example.org", "/ws"),
            Err(EndpointError::UnsupportedScheme("ftp".into()))
        );
        assert!(matches!(
            endpoint_from_origin("mirror.example.org", "/ws"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            endpoint_from_origin("https:///ws", "/ws"),
            Err(EndpointError::MissingHost(_))
        ));
    }

    #[test]
    fn test_from_config_uses_path_and_delay() {
        let config = MapConfig::from_json(r#"{"ws_path": "/map/ws", "reconnect_delay": "2s"}"#)
            .unwrap();
        let manager = ConnectionManager::from_config(&config, "https://mirror.example.org").unwrap();
        assert_eq!(manager.endpoint(), "wss://mirror.example.org/map/ws");
        assert_eq!(manager.reconnect_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_lifecycle() {
        let mut manager = manager();
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.on_open();
        assert_eq!(manager.state(), ConnectionState::Open);

        assert_eq!(manager.on_close("remote close"), Some(Duration::from_millis(5000)));
        assert_eq!(manager.state(), ConnectionState::Closed);

        assert!(manager.begin_reconnect());
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.reconnects(), 1);

        manager.on_open();
        assert!(manager.state().is_open());
    }

    #[test]
    fn test_reconnect_single_flight() {
        let mut manager = manager();
        manager.on_open();

        // Browsers report an error followed by a close for one failure
        let scheduled: Vec<_> = [manager.on_close("error"), manager.on_close("close")]
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(scheduled.len(), 1);

        assert!(manager.begin_reconnect());
        assert!(!manager.begin_reconnect());
        assert_eq!(manager.reconnects(), 1);
    }

    #[test]
    fn test_failed_connect_schedules_again() {
        let mut manager = manager();
        assert!(manager.on_close("connection refused").is_some());
        assert!(manager.begin_reconnect());
        assert!(manager.on_close("connection refused").is_some());
        assert!(manager.begin_reconnect());
        assert_eq!(manager.reconnects(), 2);
    }

    #[test]
    fn test_reconnect_keeps_map_state() {
        let config = MapConfig::default();
        let mut map = MapState::new(&config);
        let mut manager = manager();
        manager.on_open();

        let report = manager.on_frame(&[7, 0x08, 0x00, 0x04, 0x00], 1.0, &mut map);
        assert_eq!(report.accepted, 1);

        manager.on_close("remote close");
        manager.begin_reconnect();
        manager.on_open();

        assert_eq!(map.buffer.len(), 1);
        assert_eq!(map.aggregator.total_hits(), 1);
        assert_eq!(manager.frames(), 1);
    }
}
