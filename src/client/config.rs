//! Publish configuration

use std::time::Duration;

use url::Url;

use super::dispatch::DispatchMode;
use super::pacing::DEFAULT_THROTTLE_QUANTUM;
use crate::error::{Error, Result};
use crate::protocol::constants::{DEFAULT_PORT, MAX_CHUNK_SIZE, RECOMMENDED_CHUNK_SIZE};

/// Options for one publish run
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Destination, `rtmp://host[:port]/app[/...]/key`
    pub url: String,

    /// Connect plus handshake must complete within this time
    pub connect_timeout: Duration,

    /// Buffer length announced to the server for the published stream
    pub buffer_ms: u32,

    /// Outgoing chunk size announced after the handshake
    pub chunk_size: u32,

    /// Per-tag or raw-byte dispatch
    pub mode: DispatchMode,

    /// Sleep length while the pacing gate is closed
    pub throttle_quantum: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(5),
            buffer_ms: 3_600_000, // one hour
            chunk_size: RECOMMENDED_CHUNK_SIZE,
            mode: DispatchMode::Packet,
            throttle_quantum: DEFAULT_THROTTLE_QUANTUM,
            tcp_nodelay: true,
        }
    }
}

impl PublishConfig {
    /// Create a config for the given destination
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the announced buffer length
    pub fn buffer_ms(mut self, ms: u32) -> Self {
        self.buffer_ms = ms;
        self
    }

    /// Set chunk size
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    /// Set dispatch mode
    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set throttle quantum
    pub fn throttle_quantum(mut self, quantum: Duration) -> Self {
        self.throttle_quantum = quantum;
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Parse [`url`](Self::url)
    pub fn parse_url(&self) -> Result<RtmpUrl> {
        RtmpUrl::parse(&self.url)
    }
}

/// Destination endpoint split into its RTMP parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpUrl {
    pub host: String,
    pub port: u16,
    /// Application name, may contain `/`
    pub app: String,
    pub stream_key: String,
    /// `tcUrl` for the connect command (the URL without the key)
    pub tc_url: String,
}

impl RtmpUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| Error::Config(format!("{}: {}", input, e)))?;

        if url.scheme() != "rtmp" {
            return Err(Error::Config(format!(
                "unsupported scheme '{}', expected rtmp",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config(format!("{}: missing host", input)))?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let (stream_key, app) = match segments.split_last() {
            Some((key, app)) if !app.is_empty() => (key.to_string(), app.join("/")),
            _ => {
                return Err(Error::Config(format!(
                    "{}: expected rtmp://host/app/key",
                    input
                )))
            }
        };

        let tc_url = if url.port().is_some() {
            format!("rtmp://{}:{}/{}", host, port, app)
        } else {
            format!("rtmp://{}/{}", host, app)
        };

        Ok(Self {
            host,
            port,
            app,
            stream_key,
            tc_url,
        })
    }

    /// `host:port` for the TCP connect
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
