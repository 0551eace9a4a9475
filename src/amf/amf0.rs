//! AMF0 encoder and decoder
//!
//! AMF0 is the original Action Message Format used in Flash/RTMP.
//! Reference: AMF0 File Format Specification (amf0-file-format-specification.pdf)
//!
//! Type Markers handled here:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x08 - ECMA Array (associative array)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::value::AmfValue;
use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder
pub struct Amf0Decoder {
    /// Tolerate a missing object end marker
    lenient: bool,
    depth: usize,
}

impl Amf0Decoder {
    /// Create a new decoder in lenient mode
    pub fn new() -> Self {
        Self {
            lenient: true,
            depth: 0,
        }
    }

    /// Create decoder with explicit lenient mode setting
    pub fn with_lenient(lenient: bool) -> Self {
        Self { lenient, depth: 0 }
    }

    /// Decode a single AMF0 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode all values from buffer until exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let value = match marker {
            MARKER_NUMBER => {
                need(buf, 8)?;
                AmfValue::Number(buf.get_f64())
            }
            MARKER_BOOLEAN => {
                need(buf, 1)?;
                AmfValue::Boolean(buf.get_u8() != 0)
            }
            MARKER_STRING => AmfValue::String(read_string(buf, 2)?),
            MARKER_LONG_STRING => AmfValue::String(read_string(buf, 4)?),
            MARKER_OBJECT => AmfValue::Object(self.decode_properties(buf)?),
            MARKER_ECMA_ARRAY => {
                // The count is a hint that encoders get wrong, the end marker decides
                need(buf, 4)?;
                buf.advance(4);
                AmfValue::EcmaArray(self.decode_properties(buf)?)
            }
            MARKER_STRICT_ARRAY => {
                need(buf, 4)?;
                let count = buf.get_u32() as usize;
                let elements = (0..count)
                    .map(|_| self.decode(buf))
                    .collect::<Result<Vec<_>, _>>()?;
                AmfValue::Array(elements)
            }
            MARKER_NULL => AmfValue::Null,
            MARKER_UNDEFINED | MARKER_UNSUPPORTED => AmfValue::Undefined,
            other => return Err(AmfError::UnknownMarker(other)),
        };
        Ok(value)
    }

    /// Read key/value pairs up to the 0x000009 end sequence
    fn decode_properties(
        &mut self,
        buf: &mut Bytes,
    ) -> Result<HashMap<String, AmfValue>, AmfError> {
        let mut properties = HashMap::new();

        // Lenient mode accepts a buffer that ends where the end marker should be
        while !(self.lenient && buf.is_empty()) {
            let key = read_string(buf, 2)?;
            if !key.is_empty() {
                let value = self.decode(buf)?;
                properties.insert(key, value);
                continue;
            }

            match buf.first().copied() {
                Some(MARKER_OBJECT_END) => buf.advance(1),
                Some(_) if self.lenient => buf.advance(1),
                None if self.lenient => {}
                Some(_) => return Err(AmfError::InvalidObjectEnd),
                None => return Err(AmfError::UnexpectedEof),
            }
            break;
        }

        Ok(properties)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn need(buf: &Bytes, n: usize) -> Result<(), AmfError> {
    if buf.remaining() < n {
        return Err(AmfError::UnexpectedEof);
    }
    Ok(())
}

/// Read a UTF-8 string behind a 2-byte or 4-byte length prefix
fn read_string(buf: &mut Bytes, prefix: usize) -> Result<String, AmfError> {
    need(buf, prefix)?;
    let len = buf.get_uint(prefix) as usize;
    need(buf, len)?;

    String::from_utf8(buf.split_to(len).to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Encode a single AMF0 value
    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Null => self.buf.put_u8(MARKER_NULL),
            AmfValue::Undefined => self.buf.put_u8(MARKER_UNDEFINED),
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::String(s) => {
                if s.len() > 0xFFFF {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.buf.put_u32(s.len() as u32);
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.buf.put_u16(s.len() as u16);
                }
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.encode_properties(props);
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                self.encode_properties(props);
            }
            AmfValue::Array(elements) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for elem in elements {
                    self.encode(elem);
                }
            }
        }
    }

    /// Encode multiple values
    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn encode_properties(&mut self, props: &HashMap<String, AmfValue>) {
        for (key, val) in props {
            self.write_utf8(key);
            self.encode(val);
        }
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }

    /// Write UTF-8 string with 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) {
        let len = s.len().min(0xFFFF);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode multiple values
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Convenience function to decode all values
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}
