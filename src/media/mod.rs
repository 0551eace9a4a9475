//! FLV demuxing
//!
//! This module provides:
//! - A big-endian byte cursor with scoped lookahead
//! - The FLV tag model and 11-byte header codec
//! - The sequential tag decoder with keyframe lookahead

pub mod cursor;
pub mod demux;
pub mod flv;

pub use cursor::{ByteCursor, CursorError, Rewind};
pub use demux::TagDecoder;
pub use flv::{AudioFormat, Tag, TagHeader, TagKind, VideoCodec, VideoFrameType};
