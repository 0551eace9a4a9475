//! Streaming session capability
//!
//! The publish loop never talks to the network directly. Everything it needs
//! from the remote side goes through [`Session`]: a connected check, the two
//! dispatch operations, shutdown and the wall clock used for pacing.
//! [`RtmpConnector`](super::connector::RtmpConnector) is the real
//! implementation; tests substitute a recording double.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::error::Result;
use crate::media::{Tag, TagKind};

/// One tag in transport form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub kind: TagKind,
    /// Milliseconds
    pub timestamp: u32,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl MediaPacket {
    pub fn from_tag(tag: &Tag) -> Self {
        Self {
            kind: tag.kind(),
            timestamp: tag.timestamp(),
            stream_id: tag.stream_id(),
            payload: tag.payload.clone(),
        }
    }
}

/// A publishing session the loop dispatches into
#[async_trait]
pub trait Session: Send {
    /// Whether the session can still accept data
    fn is_connected(&self) -> bool;

    /// Send one structured packet
    async fn send_packet(&mut self, packet: MediaPacket) -> Result<()>;

    /// Send raw container bytes: one or more complete tags with trailers
    async fn write_raw(&mut self, data: Bytes) -> Result<()>;

    /// Release the session. Must be safe to call more than once.
    async fn close(&mut self);

    /// Monotonic clock used as the pacing reference
    fn now(&self) -> Instant {
        Instant::now()
    }
}
