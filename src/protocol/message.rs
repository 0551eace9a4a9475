//! RTMP messages
//!
//! [`RtmpMessage`] is a complete message as carried by the chunk stream.
//! [`Command`] is the decoded form of an AMF0 command message
//! (`connect`, `_result`, `onStatus`, ...).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use crate::amf::{amf0, AmfValue};
use crate::error::{ProtocolError, Result};

/// A complete RTMP message
#[derive(Debug, Clone, PartialEq)]
pub struct RtmpMessage {
    /// Chunk stream the message travels on
    pub csid: u32,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    pub type_id: u8,
    /// Message stream ID
    pub stream_id: u32,
    pub payload: Bytes,
}

impl RtmpMessage {
    /// Set Chunk Size (protocol control)
    pub fn set_chunk_size(size: u32) -> Self {
        Self::control(MSG_SET_CHUNK_SIZE, &(size & 0x7FFF_FFFF).to_be_bytes())
    }

    /// Acknowledgement of `sequence` bytes received
    pub fn acknowledgement(sequence: u32) -> Self {
        Self::control(MSG_ACKNOWLEDGEMENT, &sequence.to_be_bytes())
    }

    /// User Control: Set Buffer Length for `stream_id`
    pub fn set_buffer_length(stream_id: u32, buffer_ms: u32) -> Self {
        let mut body = BytesMut::with_capacity(10);
        body.put_u16(UC_SET_BUFFER_LENGTH);
        body.put_u32(stream_id);
        body.put_u32(buffer_ms);
        Self::control(MSG_USER_CONTROL, &body)
    }

    /// User Control: Ping Response echoing the server's timestamp
    pub fn ping_response(timestamp: u32) -> Self {
        let mut body = BytesMut::with_capacity(6);
        body.put_u16(UC_PING_RESPONSE);
        body.put_u32(timestamp);
        Self::control(MSG_USER_CONTROL, &body)
    }

    /// AMF0 command on the command chunk stream
    pub fn command(stream_id: u32, command: &Command) -> Self {
        Self {
            csid: CSID_COMMAND,
            timestamp: 0,
            type_id: MSG_COMMAND_AMF0,
            stream_id,
            payload: command.encode(),
        }
    }

    /// Audio, video or data message on the media chunk stream
    pub fn media(type_id: u8, timestamp: u32, stream_id: u32, payload: Bytes) -> Self {
        Self {
            csid: CSID_MEDIA,
            timestamp,
            type_id,
            stream_id,
            payload,
        }
    }

    fn control(type_id: u8, body: &[u8]) -> Self {
        Self {
            csid: CSID_PROTOCOL_CONTROL,
            timestamp: 0,
            type_id,
            stream_id: 0,
            payload: Bytes::copy_from_slice(body),
        }
    }

    /// Read the leading big-endian u32 of a protocol control message
    pub fn control_value(&self) -> Option<u32> {
        if self.payload.len() < 4 {
            return None;
        }
        Some((&self.payload[..4]).get_u32())
    }

    /// Split a User Control message into event type and event data
    pub fn user_control_event(&self) -> Option<(u16, Bytes)> {
        if self.type_id != MSG_USER_CONTROL || self.payload.len() < 2 {
            return None;
        }
        let mut payload = self.payload.clone();
        let event = payload.get_u16();
        Some((event, payload))
    }
}

/// AMF0 command: name, transaction ID, command object, arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub object: AmfValue,
    pub args: Vec<AmfValue>,
}

impl Command {
    pub fn new(name: &str, transaction_id: f64, object: AmfValue, args: Vec<AmfValue>) -> Self {
        Self {
            name: name.to_string(),
            transaction_id,
            object,
            args,
        }
    }

    /// Decode a command message payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut values = amf0::decode_all(payload)?.into_iter();

        let name = match values.next() {
            Some(AmfValue::String(name)) => name,
            other => {
                return Err(ProtocolError::UnexpectedMessage(format!(
                    "command name expected, got {:?}",
                    other
                ))
                .into())
            }
        };
        let transaction_id = values.next().and_then(|v| v.as_number()).unwrap_or(0.0);
        let object = values.next().unwrap_or(AmfValue::Null);

        Ok(Self {
            name,
            transaction_id,
            object,
            args: values.collect(),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut encoder = amf0::Amf0Encoder::new();
        encoder.encode(&AmfValue::String(self.name.clone()));
        encoder.encode(&AmfValue::Number(self.transaction_id));
        encoder.encode(&self.object);
        encoder.encode_all(&self.args);
        encoder.finish()
    }

    /// The status/info object: first argument for `onStatus` and `_error`
    pub fn info(&self) -> Option<&AmfValue> {
        self.args
            .iter()
            .find(|v| v.as_object().is_some())
            .or_else(|| self.object.as_object().map(|_| &self.object))
    }

    /// `code` of the info object
    pub fn status_code(&self) -> Option<&str> {
        self.info()?.get_string("code")
    }

    /// Best human-readable reason carried by the info object
    pub fn description(&self) -> String {
        let info = self.info();
        info.and_then(|i| i.get_string("description"))
            .or_else(|| info.and_then(|i| i.get_string("code")))
            .unwrap_or("no description")
            .to_string()
    }

    /// Whether the info object has `level: "error"`
    pub fn is_error_status(&self) -> bool {
        self.info().and_then(|i| i.get_string("level")) == Some("error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_chunk_size_message() {
        let msg = RtmpMessage::set_chunk_size(4096);
        assert_eq!(msg.csid, CSID_PROTOCOL_CONTROL);
        assert_eq!(msg.type_id, MSG_SET_CHUNK_SIZE);
        assert_eq!(msg.control_value(), Some(4096));
    }

    #[test]
    fn test_set_buffer_length_message() {
        let msg = RtmpMessage::set_buffer_length(1, 3_600_000);
        let (event, mut data) = msg.user_control_event().unwrap();
        assert_eq!(event, UC_SET_BUFFER_LENGTH);
        assert_eq!(data.get_u32(), 1);
        assert_eq!(data.get_u32(), 3_600_000);
    }

    #[test]
    fn test_ping_response() {
        let msg = RtmpMessage::ping_response(1234);
        let (event, mut data) = msg.user_control_event().unwrap();
        assert_eq!(event, UC_PING_RESPONSE);
        assert_eq!(data.get_u32(), 1234);
    }

    #[test]
    fn test_command_roundtrip() {
        let cmd = Command::new(
            CMD_PUBLISH,
            5.0,
            AmfValue::Null,
            vec![AmfValue::from("inrtmp"), AmfValue::from("live")],
        );
        let msg = RtmpMessage::command(1, &cmd);
        assert_eq!(msg.type_id, MSG_COMMAND_AMF0);
        assert_eq!(msg.stream_id, 1);
        assert_eq!(Command::parse(&msg.payload).unwrap(), cmd);
    }

    #[test]
    fn test_status_helpers() {
        let status = Command::new(
            CMD_ON_STATUS,
            0.0,
            AmfValue::Null,
            vec![AmfValue::object([
                ("level", "error"),
                ("code", "NetStream.Publish.BadName"),
                ("description", "Stream already publishing"),
            ])],
        );
        assert_eq!(status.status_code(), Some("NetStream.Publish.BadName"));
        assert!(status.is_error_status());
        assert_eq!(status.description(), "Stream already publishing");
    }

    #[test]
    fn test_parse_rejects_non_command() {
        let payload = amf0::encode_all(&[AmfValue::Number(1.0)]);
        assert!(Command::parse(&payload).is_err());
    }

    #[test]
    fn test_media_message() {
        let msg = RtmpMessage::media(MSG_VIDEO, 40, 1, Bytes::from_static(&[0x17, 0x01]));
        assert_eq!(msg.csid, CSID_MEDIA);
        assert_eq!(msg.timestamp, 40);
        assert_eq!(msg.payload.len(), 2);
    }
}
