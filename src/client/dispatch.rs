//! Dispatch strategies
//!
//! Both strategies share the decode and pacing pipeline and differ only in
//! how a tag is handed to the [`Session`]:
//!
//! - [`DispatchMode::Packet`]: `{kind, timestamp, stream_id, payload}` via
//!   [`Session::send_packet`]
//! - [`DispatchMode::Raw`]: header, payload and trailer as one contiguous
//!   buffer via [`Session::write_raw`]

use std::fmt;
use std::str::FromStr;

use super::session::{MediaPacket, Session};
use crate::error::{Error, Result};
use crate::media::Tag;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// Structured packets
    #[default]
    Packet,
    /// Raw container bytes
    Raw,
}

impl DispatchMode {
    /// Hand one tag to the session.
    ///
    /// Fails with [`Error::SessionUnavailable`] when the session reports
    /// itself disconnected and [`Error::DispatchFailure`] when the send fails.
    pub async fn dispatch<S>(&self, session: &mut S, tag: &Tag) -> Result<()>
    where
        S: Session + ?Sized,
    {
        if !session.is_connected() {
            return Err(Error::SessionUnavailable(
                "session disconnected before dispatch".into(),
            ));
        }

        let sent = match self {
            DispatchMode::Packet => session.send_packet(MediaPacket::from_tag(tag)).await,
            DispatchMode::Raw => session.write_raw(tag.to_raw()).await,
        };

        sent.map_err(|e| match e {
            Error::DispatchFailure(_) | Error::SessionUnavailable(_) => e,
            other => Error::DispatchFailure(other.to_string()),
        })
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Packet => write!(f, "packet"),
            DispatchMode::Raw => write!(f, "raw"),
        }
    }
}

impl FromStr for DispatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "packet" => Ok(DispatchMode::Packet),
            "raw" => Ok(DispatchMode::Raw),
            other => Err(Error::Config(format!(
                "unknown dispatch mode '{}', expected packet or raw",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{TagHeader, TagKind};
    use async_trait::async_trait;
    use bytes::Bytes;

    #[derive(Default)]
    struct Sink {
        connected: bool,
        fail: bool,
        packets: Vec<MediaPacket>,
        raw: Vec<Bytes>,
    }

    #[async_trait]
    impl Session for Sink {
        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn send_packet(&mut self, packet: MediaPacket) -> Result<()> {
            if self.fail {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
            }
            self.packets.push(packet);
            Ok(())
        }

        async fn write_raw(&mut self, data: Bytes) -> Result<()> {
            self.raw.push(data);
            Ok(())
        }

        async fn close(&mut self) {
            self.connected = false;
        }
    }

    fn audio_tag() -> Tag {
        Tag {
            header: TagHeader {
                kind: TagKind::Audio,
                payload_len: 2,
                timestamp: 40,
                stream_id: 0,
            },
            payload: Bytes::from_static(&[0xAF, 0x01]),
            previous_tag_size: 13,
        }
    }

    #[tokio::test]
    async fn test_packet_dispatch() {
        let mut sink = Sink {
            connected: true,
            ..Default::default()
        };
        tokio_test::assert_ok!(DispatchMode::Packet.dispatch(&mut sink, &audio_tag()).await);

        assert_eq!(sink.packets.len(), 1);
        assert_eq!(sink.packets[0].timestamp, 40);
        assert!(sink.raw.is_empty());
    }

    #[tokio::test]
    async fn test_raw_dispatch() {
        let mut sink = Sink {
            connected: true,
            ..Default::default()
        };
        tokio_test::assert_ok!(DispatchMode::Raw.dispatch(&mut sink, &audio_tag()).await);

        assert!(sink.packets.is_empty());
        let raw = &sink.raw[0];
        assert_eq!(raw.len(), 11 + 2 + 4);
        assert_eq!(raw[0], 0x08);
        assert_eq!(&raw[11..13], &[0xAF, 0x01]);
        assert_eq!(&raw[13..], &13u32.to_be_bytes());
    }

    #[tokio::test]
    async fn test_disconnected_session() {
        let mut sink = Sink::default();
        let err = tokio_test::assert_err!(DispatchMode::Packet.dispatch(&mut sink, &audio_tag()).await);

        assert!(matches!(err, Error::SessionUnavailable(_)));
        assert!(sink.packets.is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_mapped() {
        let mut sink = Sink {
            connected: true,
            fail: true,
            ..Default::default()
        };
        let err = tokio_test::assert_err!(DispatchMode::Packet.dispatch(&mut sink, &audio_tag()).await);

        assert!(matches!(err, Error::DispatchFailure(_)));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("packet".parse::<DispatchMode>().unwrap(), DispatchMode::Packet);
        assert_eq!("RAW".parse::<DispatchMode>().unwrap(), DispatchMode::Raw);
        assert!(matches!("chunks".parse::<DispatchMode>(), Err(Error::Config(_))));
        assert_eq!(DispatchMode::Raw.to_string(), "raw");
    }
}
