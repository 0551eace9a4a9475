//! FLV tag demuxer
//!
//! [`TagDecoder`] walks an FLV source one tag at a time. Each call to
//! [`TagDecoder::next_tag`] goes through
//!
//! ```text
//! ReadHeader ──► ReadPayload ──► ReadTrailer ──► Done
//!     │               │               │
//!     └───────────────┴───────────────┴──► Terminal (EndOfStream / MalformedTag)
//! ```
//!
//! Tags that are neither audio nor video are skipped whole, trailer included.
//! After a tag has been dispatched, [`TagDecoder::peek_next_keyframe`] looks
//! at the next tag without consuming it.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use bytes::BytesMut;
use tracing::{debug, trace};

use super::cursor::{ByteCursor, CursorError};
use super::flv::{
    is_keyframe_byte, Tag, TagHeader, TagKind, FLV_HEADER_SIZE, PREVIOUS_TAG_SIZE_LEN,
    TAG_HEADER_SIZE,
};
use crate::error::{Error, Result};

/// Offset of the first tag header: file header plus PreviousTagSize0
const FIRST_TAG_OFFSET: u64 = (FLV_HEADER_SIZE + PREVIOUS_TAG_SIZE_LEN) as u64;

/// Sequential FLV tag reader
#[derive(Debug)]
pub struct TagDecoder<R> {
    cursor: ByteCursor<R>,
    /// Payload scratch space reused between tags
    payload_buf: BytesMut,
    skipped: u64,
}

impl TagDecoder<BufReader<File>> {
    /// Open an FLV file on disk
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::OpenSource {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Opened FLV source");
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> TagDecoder<R> {
    /// Wrap a reader positioned at the start of an FLV file.
    ///
    /// The file header is not validated. A source too short to hold it ends
    /// at the first [`next_tag`](Self::next_tag).
    pub fn open(reader: R) -> Result<Self> {
        let mut cursor = ByteCursor::new(reader)?;
        let start = FIRST_TAG_OFFSET.min(cursor.len());
        cursor
            .skip(start as i64)
            .map_err(|e| Error::malformed(0, e.to_string()))?;

        Ok(Self {
            cursor,
            payload_buf: BytesMut::with_capacity(64 * 1024),
            skipped: 0,
        })
    }

    /// Current read offset in the source
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Number of non-media tags skipped so far
    pub fn skipped_tags(&self) -> u64 {
        self.skipped
    }

    /// Read the next audio or video tag.
    ///
    /// Returns [`Error::EndOfStream`] once no complete tag header remains and
    /// [`Error::MalformedTag`] when a tag's body or trailer is cut short.
    pub fn next_tag(&mut self) -> Result<Tag> {
        loop {
            let offset = self.cursor.position();
            let header = self.read_header()?;

            if header.kind.is_media() {
                return self.read_body(offset, header);
            }

            trace!(
                offset,
                tag_type = header.kind.code(),
                size = header.payload_len,
                "Skipping non-media tag"
            );
            let span = i64::from(header.payload_len) + PREVIOUS_TAG_SIZE_LEN as i64;
            self.cursor
                .skip(span)
                .map_err(|e| body_error(offset, "skipped tag", e))?;
            self.skipped += 1;
        }
    }

    /// Classify the next tag without consuming it.
    ///
    /// Returns `Some(is_keyframe)` when the next tag is video, `None` when it
    /// is anything else or the source is exhausted. The read position is the
    /// same afterwards whatever the outcome.
    ///
    /// Only the type byte decides whether the rest is read. A cut-off tail
    /// that starts with the video type is [`Error::MalformedTag`] here. Any
    /// other cut-off tail gives `None` and the following
    /// [`next_tag`](Self::next_tag) ends with [`Error::EndOfStream`].
    pub fn peek_next_keyframe(&mut self) -> Result<Option<bool>> {
        let offset = self.cursor.position();
        let mut probe = self.cursor.rewind();

        let tag_type = match probe.read_u8() {
            Ok(tag_type) => tag_type,
            Err(CursorError::EndOfStream { .. }) => return Ok(None),
            Err(e) => return Err(lookahead_error(offset, e)),
        };
        if TagKind::from_code(tag_type) != TagKind::Video {
            return Ok(None);
        }

        probe
            .skip(TAG_HEADER_SIZE as i64 - 1)
            .map_err(|e| lookahead_error(offset, e))?;
        let first = probe.read_u8().map_err(|e| lookahead_error(offset, e))?;

        Ok(Some(is_keyframe_byte(first)))
    }

    fn read_header(&mut self) -> Result<TagHeader> {
        let kind = TagKind::from_code(self.cursor.read_u8().map_err(header_error)?);
        let payload_len = self.cursor.read_u24().map_err(header_error)?;
        let timestamp = self.cursor.read_time().map_err(header_error)?;
        let stream_id = self.cursor.read_u24().map_err(header_error)?;

        Ok(TagHeader {
            kind,
            payload_len,
            timestamp,
            stream_id,
        })
    }

    fn read_body(&mut self, offset: u64, header: TagHeader) -> Result<Tag> {
        let payload = self
            .cursor
            .read_bytes(header.payload_len as usize, &mut self.payload_buf)
            .map_err(|e| body_error(offset, "payload", e))?;
        let previous_tag_size = self
            .cursor
            .read_u32()
            .map_err(|e| body_error(offset, "previous tag size", e))?;

        Ok(Tag {
            header,
            payload,
            previous_tag_size,
        })
    }
}

fn header_error(e: CursorError) -> Error {
    match e {
        CursorError::Io(e) => Error::Io(e),
        _ => Error::EndOfStream,
    }
}

fn body_error(offset: u64, what: &str, e: CursorError) -> Error {
    match e {
        CursorError::Io(e) => Error::Io(e),
        other => Error::malformed(offset, format!("{} truncated: {}", what, other)),
    }
}

fn lookahead_error(offset: u64, e: CursorError) -> Error {
    match e {
        CursorError::Io(e) => Error::Io(e),
        other => Error::malformed(offset, format!("next video tag truncated: {}", other)),
    }
}
