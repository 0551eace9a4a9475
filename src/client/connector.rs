//! RTMP publishing connection
//!
//! [`RtmpConnector`] opens a connection and brings it to the publishing state:
//!
//! ```text
//! Client                                        Server
//!   |--- handshake (C0C1 / S0S1S2 / C2) ---------->|
//!   |--- Set Chunk Size -------------------------->|
//!   |--- connect(app, tcUrl) --------------------->|
//!   |<-- _result ----------------------------------|
//!   |--- releaseStream / FCPublish / createStream->|
//!   |<-- _result(stream id) -----------------------|
//!   |--- publish(key, "live") -------------------->|
//!   |--- Set Buffer Length ----------------------->|
//!   |<-- onStatus(NetStream.Publish.Start) --------|
//! ```
//!
//! Afterwards it implements [`Session`]: tags go out as audio, video or data
//! messages on the media chunk stream. Nothing is read from the server once
//! publishing has started.

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use super::config::{PublishConfig, RtmpUrl};
use super::session::{MediaPacket, Session};
use crate::amf::AmfValue;
use crate::error::{Error, ProtocolError, Result};
use crate::media::flv::{TagHeader, TagKind, PREVIOUS_TAG_SIZE_LEN, TAG_HEADER_SIZE};
use crate::protocol::constants::*;
use crate::protocol::{ChunkDecoder, ChunkEncoder, Command, Handshake, RtmpMessage};

const FLASH_VERSION: &str = "FMLE/3.0 (compatible; flv-push)";

/// A connection publishing one stream
///
/// Control messages from the server (chunk size, window acknowledgement,
/// ping) are handled only while the publish is being set up. Once
/// [`connect`](RtmpConnector::connect) returns, the socket is only written:
/// ping requests go unanswered and no acknowledgements are sent for the rest
/// of the run. Servers that drop silent clients may close a long publish.
pub struct RtmpConnector<T = TcpStream> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    encoder: ChunkEncoder,
    decoder: ChunkDecoder,
    stream_key: String,
    /// Message stream ID returned by createStream
    stream_id: u32,
    next_transaction: f64,
    connected: bool,
    window_ack_size: u32,
    bytes_received: u64,
    last_ack: u64,
}

impl RtmpConnector<TcpStream> {
    /// Connect to `config.url` and start publishing.
    ///
    /// TCP connect, handshake and publish setup all run under
    /// `config.connect_timeout`. Any failure is reported as
    /// [`Error::SessionUnavailable`]; a malformed URL as [`Error::Config`].
    pub async fn connect(config: &PublishConfig) -> Result<Self> {
        let url = config.parse_url()?;
        let addr = url.addr();

        let setup = async {
            let socket = TcpStream::connect(&addr).await?;
            socket.set_nodelay(config.tcp_nodelay)?;
            debug!(addr = %addr, "TCP connected");
            Self::establish(socket, &url, config).await
        };

        match tokio::time::timeout(config.connect_timeout, setup).await {
            Ok(Ok(connector)) => Ok(connector),
            Ok(Err(Error::SessionUnavailable(reason))) => {
                Err(Error::SessionUnavailable(format!("{}: {}", addr, reason)))
            }
            Ok(Err(e)) => Err(Error::SessionUnavailable(format!("{}: {}", addr, e))),
            Err(_) => Err(Error::SessionUnavailable(format!(
                "{}: no publish confirmation within {:?}",
                addr, config.connect_timeout
            ))),
        }
    }
}

impl<T> RtmpConnector<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run the handshake and publish setup over an established transport
    pub async fn establish(io: T, url: &RtmpUrl, config: &PublishConfig) -> Result<Self> {
        let mut connector = Self {
            io,
            read_buf: BytesMut::with_capacity(8 * 1024),
            write_buf: BytesMut::with_capacity(64 * 1024),
            encoder: ChunkEncoder::new(),
            decoder: ChunkDecoder::new(),
            stream_key: url.stream_key.clone(),
            stream_id: 0,
            next_transaction: 1.0,
            connected: false,
            window_ack_size: 0,
            bytes_received: 0,
            last_ack: 0,
        };

        connector.handshake().await?;
        connector.negotiate(url, config).await?;
        connector.connected = true;

        info!(
            app = %url.app,
            stream = %url.stream_key,
            stream_id = connector.stream_id,
            "Publishing started"
        );
        Ok(connector)
    }

    /// Message stream ID the media is published on
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    async fn handshake(&mut self) -> Result<()> {
        let mut handshake = Handshake::new();
        let c0c1 = handshake.generate_initial()?;
        self.io.write_all(&c0c1).await?;
        self.io.flush().await?;

        let needed = handshake.bytes_needed();
        while self.read_buf.len() < needed {
            self.fill().await?;
        }

        let mut reply = self.read_buf.split_to(needed).freeze();
        match handshake.process(&mut reply)? {
            Some(c2) => {
                self.io.write_all(&c2).await?;
                self.io.flush().await?;
            }
            None => return Err(crate::error::HandshakeError::InvalidState.into()),
        }

        trace!("Handshake complete");
        Ok(())
    }

    async fn negotiate(&mut self, url: &RtmpUrl, config: &PublishConfig) -> Result<()> {
        self.send(&RtmpMessage::set_chunk_size(config.chunk_size))
            .await?;
        self.encoder.set_chunk_size(config.chunk_size);

        let connect = self.command(
            CMD_CONNECT,
            AmfValue::object([
                ("app", AmfValue::from(url.app.as_str())),
                ("type", AmfValue::from("nonprivate")),
                ("flashVer", AmfValue::from(FLASH_VERSION)),
                ("tcUrl", AmfValue::from(url.tc_url.as_str())),
            ]),
            vec![],
        );
        self.send_command(0, &connect).await?;
        self.await_result(&connect).await?;

        let key = AmfValue::from(self.stream_key.as_str());
        let release = self.command(CMD_RELEASE_STREAM, AmfValue::Null, vec![key.clone()]);
        self.send_command(0, &release).await?;
        let fc_publish = self.command(CMD_FC_PUBLISH, AmfValue::Null, vec![key.clone()]);
        self.send_command(0, &fc_publish).await?;

        let create = self.command(CMD_CREATE_STREAM, AmfValue::Null, vec![]);
        self.send_command(0, &create).await?;
        let created = self.await_result(&create).await?;
        self.stream_id = created
            .args
            .iter()
            .find_map(AmfValue::as_number)
            .map(|id| id as u32)
            .ok_or_else(|| {
                ProtocolError::UnexpectedMessage("createStream result without stream id".into())
            })?;

        let publish = self.command(CMD_PUBLISH, AmfValue::Null, vec![key, AmfValue::from("live")]);
        self.send_command(self.stream_id, &publish).await?;
        self.send(&RtmpMessage::set_buffer_length(self.stream_id, config.buffer_ms))
            .await?;

        self.await_publish_start().await
    }

    fn command(&mut self, name: &str, object: AmfValue, args: Vec<AmfValue>) -> Command {
        let transaction_id = self.next_transaction;
        self.next_transaction += 1.0;
        Command::new(name, transaction_id, object, args)
    }

    /// Wait for the `_result` answering `request`
    async fn await_result(&mut self, request: &Command) -> Result<Command> {
        loop {
            let reply = self.next_command().await?;
            let answers = reply.transaction_id == request.transaction_id;

            match reply.name.as_str() {
                CMD_RESULT if answers => return Ok(reply),
                CMD_ERROR if answers => return Err(rejected(&request.name, &reply)),
                CMD_ON_STATUS if reply.is_error_status() => {
                    return Err(rejected(&request.name, &reply))
                }
                _ => trace!(command = %reply.name, "Ignoring command while waiting for result"),
            }
        }
    }

    async fn await_publish_start(&mut self) -> Result<()> {
        loop {
            let reply = self.next_command().await?;
            match reply.name.as_str() {
                CMD_ON_STATUS if reply.status_code() == Some(NS_PUBLISH_START) => return Ok(()),
                CMD_ON_STATUS if reply.is_error_status() => {
                    return Err(rejected(CMD_PUBLISH, &reply))
                }
                CMD_ERROR => return Err(rejected(CMD_PUBLISH, &reply)),
                _ => trace!(command = %reply.name, code = ?reply.status_code(), "Ignoring command"),
            }
        }
    }

    async fn next_command(&mut self) -> Result<Command> {
        loop {
            let msg = self.read_message().await?;
            if msg.type_id == MSG_COMMAND_AMF0 {
                return Command::parse(&msg.payload);
            }
            if !self.handle_control(&msg).await? {
                trace!(type_id = msg.type_id, "Ignoring message during setup");
            }
        }
    }

    /// Apply a protocol control message. Returns false for anything else.
    async fn handle_control(&mut self, msg: &RtmpMessage) -> Result<bool> {
        match msg.type_id {
            MSG_SET_CHUNK_SIZE => {
                let size = msg.control_value().unwrap_or(0) & 0x7FFF_FFFF;
                self.decoder.set_chunk_size(size)?;
                debug!(size, "Peer chunk size");
            }
            MSG_WINDOW_ACK_SIZE => {
                self.window_ack_size = msg.control_value().unwrap_or(0);
            }
            MSG_USER_CONTROL => {
                if let Some((UC_PING_REQUEST, mut data)) = msg.user_control_event() {
                    let timestamp = if data.remaining() >= 4 { data.get_u32() } else { 0 };
                    self.send(&RtmpMessage::ping_response(timestamp)).await?;
                }
            }
            MSG_SET_PEER_BANDWIDTH | MSG_ACKNOWLEDGEMENT | MSG_ABORT => {}
            _ => return Ok(false),
        }
        Ok(true)
    }

    async fn read_message(&mut self) -> Result<RtmpMessage> {
        loop {
            if let Some(msg) = self.decoder.decode(&mut self.read_buf)? {
                return Ok(msg);
            }
            self.fill().await?;
        }
    }

    /// Read more bytes from the peer, acknowledging when the window is crossed
    async fn fill(&mut self) -> Result<()> {
        let n = self.io.read_buf(&mut self.read_buf).await?;
        if n == 0 {
            return Err(Error::SessionUnavailable("connection closed by server".into()));
        }
        self.bytes_received += n as u64;

        if self.window_ack_size > 0
            && self.bytes_received - self.last_ack >= u64::from(self.window_ack_size)
        {
            self.last_ack = self.bytes_received;
            self.send(&RtmpMessage::acknowledgement(self.bytes_received as u32))
                .await?;
        }
        Ok(())
    }

    async fn send_command(&mut self, stream_id: u32, command: &Command) -> Result<()> {
        trace!(command = %command.name, transaction_id = command.transaction_id, "Sending command");
        self.send(&RtmpMessage::command(stream_id, command)).await
    }

    async fn send(&mut self, msg: &RtmpMessage) -> Result<()> {
        self.write_buf.clear();
        self.encoder.encode(msg, &mut self.write_buf);
        self.flush_write_buf().await
    }

    async fn flush_write_buf(&mut self) -> Result<()> {
        let written = match self.io.write_all(&self.write_buf).await {
            Ok(()) => self.io.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            self.connected = false;
            return Err(Error::DispatchFailure(e.to_string()));
        }
        Ok(())
    }

    fn media_message(&self, kind: TagKind, timestamp: u32, payload: Bytes) -> Result<RtmpMessage> {
        let type_id = match kind {
            TagKind::Audio => MSG_AUDIO,
            TagKind::Video => MSG_VIDEO,
            TagKind::Other(MSG_DATA_AMF0) => MSG_DATA_AMF0,
            TagKind::Other(code) => {
                return Err(Error::DispatchFailure(format!(
                    "tag type {} has no RTMP message equivalent",
                    code
                )))
            }
        };
        Ok(RtmpMessage::media(type_id, timestamp, self.stream_id, payload))
    }
}

#[async_trait]
impl<T> Session for RtmpConnector<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send_packet(&mut self, packet: MediaPacket) -> Result<()> {
        let msg = self.media_message(packet.kind, packet.timestamp, packet.payload)?;
        self.send(&msg).await
    }

    async fn write_raw(&mut self, mut data: Bytes) -> Result<()> {
        self.write_buf.clear();

        while !data.is_empty() {
            let Some(raw) = data.first_chunk::<TAG_HEADER_SIZE>() else {
                return Err(Error::DispatchFailure(format!(
                    "incomplete tag header ({} bytes)",
                    data.len()
                )));
            };
            let header = TagHeader::decode(raw);
            let body_end = TAG_HEADER_SIZE + header.payload_len as usize;
            let total = body_end + PREVIOUS_TAG_SIZE_LEN;
            if data.len() < total {
                return Err(Error::DispatchFailure(format!(
                    "incomplete tag: {} of {} bytes",
                    data.len(),
                    total
                )));
            }

            let payload = data.slice(TAG_HEADER_SIZE..body_end);
            let msg = self.media_message(header.kind, header.timestamp, payload)?;
            self.encoder.encode(&msg, &mut self.write_buf);
            data.advance(total);
        }

        self.flush_write_buf().await
    }

    async fn close(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;

        let key = AmfValue::from(self.stream_key.as_str());
        let unpublish = self.command(CMD_FC_UNPUBLISH, AmfValue::Null, vec![key]);
        let delete = self.command(
            CMD_DELETE_STREAM,
            AmfValue::Null,
            vec![AmfValue::Number(f64::from(self.stream_id))],
        );

        self.write_buf.clear();
        self.encoder
            .encode(&RtmpMessage::command(0, &unpublish), &mut self.write_buf);
        self.encoder
            .encode(&RtmpMessage::command(0, &delete), &mut self.write_buf);
        if let Err(e) = self.flush_write_buf().await {
            warn!(error = %e, "Failed to unpublish cleanly");
        }
        if let Err(e) = self.io.shutdown().await {
            debug!(error = %e, "Socket shutdown failed");
        }
        debug!(stream_id = self.stream_id, "Session closed");
    }
}

fn rejected(command: &str, reply: &Command) -> Error {
    ProtocolError::Rejected {
        command: command.to_string(),
        description: reply.description(),
    }
    .into()
}
