//! RTMP client handshake
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes: time+random) ->|
//!   |                                        |
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes: time+random) --|
//!   |<------ S2 (1536 bytes: echo C1) ------|
//!   |                                        |
//!   |------- C2 (1536 bytes: echo S1) ----->|
//!   |                                        |
//!   |          [Handshake Complete]          |
//! ```
//!
//! Only the "simple" handshake (no HMAC digest) is implemented, which every
//! common ingest server accepts from publishers.
//!
//! Reference: RTMP Specification Section 5.2

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Client handshake state machine
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Need to send C0C1
    Initial,
    /// Waiting for S0S1S2
    WaitingForServer,
    /// C2 produced
    Done,
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Initial,
        }
    }

    /// Check if handshake is complete
    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// Bytes that must be buffered before [`process`](Self::process) can advance
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            HandshakeState::WaitingForServer => 1 + HANDSHAKE_SIZE * 2,
            HandshakeState::Initial | HandshakeState::Done => 0,
        }
    }

    /// Generate C0+C1 (1 + 1536 bytes). Only valid once.
    pub fn generate_initial(&mut self) -> Result<Bytes> {
        if self.state != HandshakeState::Initial {
            return Err(HandshakeError::InvalidState.into());
        }

        let mut buf = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        buf.put_u8(RTMP_VERSION);
        buf.put_slice(&generate_packet());

        self.state = HandshakeState::WaitingForServer;
        Ok(buf.freeze())
    }

    /// Consume S0S1S2 and return C2.
    ///
    /// Returns `Ok(None)` while fewer than [`bytes_needed`](Self::bytes_needed)
    /// bytes are available.
    pub fn process(&mut self, data: &mut Bytes) -> Result<Option<Bytes>> {
        if self.state != HandshakeState::WaitingForServer {
            return Err(HandshakeError::InvalidState.into());
        }
        if data.remaining() < self.bytes_needed() {
            return Ok(None);
        }

        // Be lenient - accept version 3-31 (some servers send different values)
        let version = data.get_u8();
        if version < RTMP_VERSION {
            return Err(HandshakeError::InvalidVersion(version).into());
        }

        let mut s1 = [0u8; HANDSHAKE_SIZE];
        data.copy_to_slice(&mut s1);

        // S2 should echo C1; not every server does it right, so it is only consumed
        data.advance(HANDSHAKE_SIZE);

        self.state = HandshakeState::Done;
        Ok(Some(Bytes::copy_from_slice(&generate_echo(&s1))))
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// Generate C1
///
/// Format (1536 bytes):
/// - Bytes 0-3: Timestamp (32-bit, big-endian)
/// - Bytes 4-7: Zero
/// - Bytes 8-1535: Random data
fn generate_packet() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];

    let timestamp = now_millis();
    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());

    // Not cryptographically secure, the simple handshake doesn't require it
    let mut seed = u64::from(timestamp) | 1;
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = seed.to_le_bytes();
        let len = chunk.len().min(8);
        chunk[..len].copy_from_slice(&bytes[..len]);
    }

    packet
}

/// Generate C2: the server's S1 with our receive time in bytes 4-7
fn generate_echo(peer_packet: &[u8; HANDSHAKE_SIZE]) -> [u8; HANDSHAKE_SIZE] {
    let mut echo = *peer_packet;
    echo[4..8].copy_from_slice(&now_millis().to_be_bytes());
    echo
}
