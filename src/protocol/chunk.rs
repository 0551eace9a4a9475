//! RTMP chunk stream codec
//!
//! Messages are split into chunks of at most `chunk_size` bytes:
//!
//! ```text
//! +--------------+----------------+--------------------+--------------+
//! | Basic Header | Message Header | Extended Timestamp | Chunk Data   |
//! | (1-3 bytes)  | (0/3/7/11)     | (0 or 4 bytes)     | (<= size)    |
//! +--------------+----------------+--------------------+--------------+
//! ```
//!
//! The basic header carries the header format (2 bits) and chunk stream ID:
//! IDs 2-63 fit in one byte, 64-319 take two, up to 65599 take three.
//!
//! The encoder always opens a message with a type 0 header and continues it
//! with type 3 headers. The decoder accepts all four header types.

use std::collections::HashMap;

use bytes::{Buf, BufMut, BytesMut};

use super::constants::{DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP, MAX_CHUNK_SIZE};
use super::message::RtmpMessage;
use crate::error::ProtocolError;

/// Message header sizes by format
const MESSAGE_HEADER_SIZE: [usize; 4] = [11, 7, 3, 0];

/// Splits messages into chunks
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: u32,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Change the outgoing chunk size; announce it to the peer first.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    /// Append the chunks for `msg` to `out`
    pub fn encode(&self, msg: &RtmpMessage, out: &mut BytesMut) {
        let extended = msg.timestamp >= EXTENDED_TIMESTAMP;
        let timestamp_field = if extended {
            EXTENDED_TIMESTAMP
        } else {
            msg.timestamp
        };

        out.reserve(msg.payload.len() + 18);

        write_basic_header(out, 0, msg.csid);
        out.put_uint(u64::from(timestamp_field), 3);
        out.put_uint(msg.payload.len() as u64, 3);
        out.put_u8(msg.type_id);
        out.put_u32_le(msg.stream_id);
        if extended {
            out.put_u32(msg.timestamp);
        }

        let mut chunks = msg.payload.chunks(self.chunk_size as usize);
        if let Some(first) = chunks.next() {
            out.put_slice(first);
        }
        for chunk in chunks {
            write_basic_header(out, 3, msg.csid);
            if extended {
                out.put_u32(msg.timestamp);
            }
            out.put_slice(chunk);
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_basic_header(out: &mut BytesMut, fmt: u8, csid: u32) {
    debug_assert!((2..=65599).contains(&csid), "chunk stream id out of range");
    match csid {
        2..=63 => out.put_u8((fmt << 6) | csid as u8),
        64..=319 => {
            out.put_u8(fmt << 6);
            out.put_u8((csid - 64) as u8);
        }
        _ => {
            let id = csid - 64;
            out.put_u8((fmt << 6) | 1);
            out.put_u8((id & 0xFF) as u8);
            out.put_u8((id >> 8) as u8);
        }
    }
}

/// Per chunk stream state carried between chunks
#[derive(Debug, Default)]
struct ChunkStream {
    /// Set once a type 0 header has been seen
    initialized: bool,
    timestamp: u32,
    timestamp_delta: u32,
    length: u32,
    type_id: u8,
    stream_id: u32,
    extended: bool,
    /// Partially assembled message
    payload: BytesMut,
}

/// Reassembles messages from incoming chunks
#[derive(Debug)]
pub struct ChunkDecoder {
    chunk_size: u32,
    streams: HashMap<u32, ChunkStream>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Apply a Set Chunk Size received from the peer
    pub fn set_chunk_size(&mut self, size: u32) -> Result<(), ProtocolError> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ProtocolError::InvalidChunkSize(size));
        }
        self.chunk_size = size;
        Ok(())
    }

    /// Decode the next complete message from `buf`.
    ///
    /// Consumes whole chunks only. Returns `Ok(None)` when more data is
    /// needed; bytes of an incomplete chunk are left in `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RtmpMessage>, ProtocolError> {
        loop {
            match self.decode_chunk(buf)? {
                ChunkStep::NeedMore => return Ok(None),
                ChunkStep::Partial => continue,
                ChunkStep::Message(msg) => return Ok(Some(msg)),
            }
        }
    }

    fn decode_chunk(&mut self, buf: &mut BytesMut) -> Result<ChunkStep, ProtocolError> {
        let data = &buf[..];
        if data.is_empty() {
            return Ok(ChunkStep::NeedMore);
        }

        let fmt = (data[0] >> 6) as usize;
        let (csid, mut idx) = match data[0] & 0x3F {
            0 => {
                if data.len() < 2 {
                    return Ok(ChunkStep::NeedMore);
                }
                (64 + u32::from(data[1]), 2)
            }
            1 => {
                if data.len() < 3 {
                    return Ok(ChunkStep::NeedMore);
                }
                (64 + u32::from(data[1]) + (u32::from(data[2]) << 8), 3)
            }
            id => (u32::from(id), 1),
        };

        let header_len = MESSAGE_HEADER_SIZE[fmt];
        if data.len() < idx + header_len {
            return Ok(ChunkStep::NeedMore);
        }

        let stream = self.streams.entry(csid).or_default();
        if fmt != 0 && !stream.initialized {
            return Err(ProtocolError::MissingChunkHeader(csid));
        }

        let header = &data[idx..idx + header_len];
        let be24 = |b: &[u8]| (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);

        let timestamp_field = if fmt <= 2 { be24(&header[0..3]) } else { 0 };
        let (length, type_id) = if fmt <= 1 {
            (be24(&header[3..6]), header[6])
        } else {
            (stream.length, stream.type_id)
        };
        let stream_id = if fmt == 0 {
            u32::from_le_bytes([header[7], header[8], header[9], header[10]])
        } else {
            stream.stream_id
        };
        idx += header_len;

        let extended = if fmt <= 2 {
            timestamp_field == EXTENDED_TIMESTAMP
        } else {
            stream.extended
        };
        let mut extended_value = None;
        if extended {
            if data.len() < idx + 4 {
                return Ok(ChunkStep::NeedMore);
            }
            extended_value = Some((&data[idx..idx + 4]).get_u32());
            idx += 4;
        }

        let continuing = fmt == 3 && !stream.payload.is_empty();
        let assembled = if continuing { stream.payload.len() } else { 0 };
        let take = (length as usize - assembled).min(self.chunk_size as usize);
        if data.len() < idx + take {
            return Ok(ChunkStep::NeedMore);
        }

        // The whole chunk is buffered: commit header state
        let field = extended_value.unwrap_or(timestamp_field);
        match fmt {
            0 => {
                stream.timestamp = field;
                stream.timestamp_delta = 0;
                stream.initialized = true;
            }
            1 | 2 => {
                stream.timestamp_delta = field;
                stream.timestamp = stream.timestamp.wrapping_add(field);
            }
            _ if !continuing => {
                stream.timestamp = stream.timestamp.wrapping_add(stream.timestamp_delta);
            }
            _ => {}
        }
        stream.length = length;
        stream.type_id = type_id;
        stream.stream_id = stream_id;
        stream.extended = extended;
        if !continuing {
            stream.payload.clear();
        }

        stream.payload.extend_from_slice(&data[idx..idx + take]);
        buf.advance(idx + take);

        if stream.payload.len() < length as usize {
            return Ok(ChunkStep::Partial);
        }

        Ok(ChunkStep::Message(RtmpMessage {
            csid,
            timestamp: stream.timestamp,
            type_id: stream.type_id,
            stream_id: stream.stream_id,
            payload: stream.payload.split().freeze(),
        }))
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

enum ChunkStep {
    NeedMore,
    Partial,
    Message(RtmpMessage),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;
    use bytes::Bytes;

    fn media(timestamp: u32, len: usize) -> RtmpMessage {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        RtmpMessage::media(MSG_VIDEO, timestamp, 1, Bytes::from(payload))
    }

    #[test]
    fn test_single_chunk_layout() {
        let encoder = ChunkEncoder::new();
        let mut out = BytesMut::new();
        encoder.encode(&media(1000, 4), &mut out);

        assert_eq!(
            &out[..12],
            &[0x04, 0x00, 0x03, 0xE8, 0x00, 0x00, 0x04, 0x09, 0x01, 0x00, 0x00, 0x00]
        );
        assert_eq!(&out[12..], &[0, 1, 2, 3]);
    }

    #[test]
    fn test_split_into_chunks() {
        let encoder = ChunkEncoder::new();
        let mut out = BytesMut::new();
        encoder.encode(&media(0, 300), &mut out);

        // 12 + 128, then (1 + 128), then (1 + 44)
        assert_eq!(out.len(), 12 + 128 + 1 + 128 + 1 + 44);
        assert_eq!(out[12 + 128], 0xC4);
        assert_eq!(out[12 + 128 + 1 + 128], 0xC4);
    }

    #[test]
    fn test_encode_decode_multi_chunk() {
        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(100);
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(100).unwrap();

        let msg = media(40, 250);
        let mut buf = BytesMut::new();
        encoder.encode(&msg, &mut buf);

        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(msg));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extended_timestamp() {
        let encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        let msg = media(0x0100_0000, 200);
        let mut buf = BytesMut::new();
        encoder.encode(&msg, &mut buf);
        assert_eq!(&buf[1..4], &[0xFF, 0xFF, 0xFF]);

        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.timestamp, 0x0100_0000);
        assert_eq!(decoded.payload, msg.payload);
    }

    #[test]
    fn test_incremental_feed() {
        let encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        let msg = media(7, 200);
        let mut wire = BytesMut::new();
        encoder.encode(&msg, &mut wire);

        let mut buf = BytesMut::new();
        let mut decoded = None;
        for byte in wire.iter() {
            buf.put_u8(*byte);
            if let Some(m) = decoder.decode(&mut buf).unwrap() {
                decoded = Some(m);
            }
        }
        assert_eq!(decoded, Some(msg));
    }

    #[test]
    fn test_compressed_headers() {
        let mut decoder = ChunkDecoder::new();
        let mut buf = BytesMut::new();

        // Type 0: csid 4, ts 100, len 2, video, stream 1
        buf.put_slice(&[0x04, 0x00, 0x00, 0x64, 0x00, 0x00, 0x02, 0x09, 0x01, 0x00, 0x00, 0x00]);
        buf.put_slice(&[0xAA, 0xBB]);
        // Type 1: delta 40, len 1, audio
        buf.put_slice(&[0x44, 0x00, 0x00, 0x28, 0x00, 0x00, 0x01, 0x08]);
        buf.put_slice(&[0xCC]);
        // Type 2: delta 10
        buf.put_slice(&[0x84, 0x00, 0x00, 0x0A]);
        buf.put_slice(&[0xDD]);
        // Type 3: reuse delta 10
        buf.put_slice(&[0xC4]);
        buf.put_slice(&[0xEE]);

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!((first.timestamp, first.type_id, first.stream_id), (100, MSG_VIDEO, 1));

        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!((second.timestamp, second.type_id), (140, MSG_AUDIO));
        assert_eq!(second.stream_id, 1);

        let third = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(third.timestamp, 150);
        assert_eq!(&third.payload[..], &[0xDD]);

        let fourth = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(fourth.timestamp, 160);
        assert_eq!(&fourth.payload[..], &[0xEE]);

        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_two_and_three_byte_basic_headers() {
        let encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        for csid in [64u32, 319, 320, 65599] {
            let mut msg = media(0, 3);
            msg.csid = csid;
            let mut buf = BytesMut::new();
            encoder.encode(&msg, &mut buf);
            assert_eq!(decoder.decode(&mut buf).unwrap(), Some(msg));
        }
    }

    #[test]
    fn test_continuation_without_header() {
        let mut decoder = ChunkDecoder::new();
        let mut buf = BytesMut::from(&[0xC5u8, 0x00][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(ProtocolError::MissingChunkHeader(5))
        ));
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.set_chunk_size(0).is_err());
        assert!(decoder.set_chunk_size(MAX_CHUNK_SIZE + 1).is_err());
        assert!(decoder.set_chunk_size(4096).is_ok());
        assert_eq!(decoder.chunk_size(), 4096);
    }

    #[test]
    fn test_zero_length_message() {
        let encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();
        let msg = media(0, 0);
        let mut buf = BytesMut::new();
        encoder.encode(&msg, &mut buf);
        assert_eq!(buf.len(), 12);
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(msg));
    }
}
