//! FLV tag model
//!
//! An FLV file is a 9-byte header followed by a run of tags, each preceded by
//! the size of the tag before it:
//!
//! ```text
//! +============+==================+==============+==================+
//! | FLV Header | PrevTagSize0 (0) | Tag 1        | PrevTagSize1 ... |
//! | (9 bytes)  | (4 bytes)        | (11+N bytes) | (4 bytes)        |
//! +============+==================+==============+==================+
//! ```
//!
//! Tag header:
//! ```text
//! +--------+-------------+-----------+-------------+---------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) |
//! +--------+-------------+-----------+-------------+---------+
//! ```
//!
//! The timestamp is split: the low 24 bits come first, big-endian, and the
//! fourth byte carries bits 24..32.
//!
//! Video Data:
//! ```text
//! +----------+----------+
//! | FrameType| CodecID  | CodecData...
//! | (4 bits) | (4 bits) |
//! +----------+----------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// FLV file header is always 9 bytes
pub const FLV_HEADER_SIZE: usize = 9;

/// Size of a PreviousTagSize field
pub const PREVIOUS_TAG_SIZE_LEN: usize = 4;

/// Size of a tag header
pub const TAG_HEADER_SIZE: usize = 11;

pub const TAG_TYPE_AUDIO: u8 = 8;
pub const TAG_TYPE_VIDEO: u8 = 9;
pub const TAG_TYPE_SCRIPT: u8 = 18;

/// Decode the 4-byte time field into milliseconds
pub fn decode_time(raw: [u8; 4]) -> u32 {
    (u32::from(raw[3]) << 24)
        | (u32::from(raw[0]) << 16)
        | (u32::from(raw[1]) << 8)
        | u32::from(raw[2])
}

/// Encode milliseconds into the 4-byte time field
pub fn encode_time(timestamp: u32) -> [u8; 4] {
    [
        ((timestamp >> 16) & 0xFF) as u8,
        ((timestamp >> 8) & 0xFF) as u8,
        (timestamp & 0xFF) as u8,
        ((timestamp >> 24) & 0xFF) as u8,
    ]
}

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Audio,
    Video,
    /// Script data and anything else, with the raw type code
    Other(u8),
}

impl TagKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            TAG_TYPE_AUDIO => TagKind::Audio,
            TAG_TYPE_VIDEO => TagKind::Video,
            other => TagKind::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            TagKind::Audio => TAG_TYPE_AUDIO,
            TagKind::Video => TAG_TYPE_VIDEO,
            TagKind::Other(code) => *code,
        }
    }

    /// Audio and video tags are published, everything else is skipped
    pub fn is_media(&self) -> bool {
        matches!(self, TagKind::Audio | TagKind::Video)
    }
}

/// The 11-byte tag header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub kind: TagKind,
    /// Size of the tag body in bytes (24 bits)
    pub payload_len: u32,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Stream ID (24 bits, always 0 in files written by common muxers)
    pub stream_id: u32,
}

impl TagHeader {
    /// Decode a header from its on-disk layout
    pub fn decode(raw: &[u8; TAG_HEADER_SIZE]) -> Self {
        let be24 = |b: &[u8]| (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        Self {
            kind: TagKind::from_code(raw[0]),
            payload_len: be24(&raw[1..4]),
            timestamp: decode_time([raw[4], raw[5], raw[6], raw[7]]),
            stream_id: be24(&raw[8..11]),
        }
    }

    /// Encode back into the on-disk layout
    pub fn encode(&self) -> [u8; TAG_HEADER_SIZE] {
        let mut out = [0u8; TAG_HEADER_SIZE];
        out[0] = self.kind.code();
        out[1..4].copy_from_slice(&self.payload_len.to_be_bytes()[1..]);
        out[4..8].copy_from_slice(&encode_time(self.timestamp));
        out[8..11].copy_from_slice(&self.stream_id.to_be_bytes()[1..]);
        out
    }
}

/// One demuxed audio or video tag
#[derive(Debug, Clone)]
pub struct Tag {
    pub header: TagHeader,
    /// Tag body, exactly `header.payload_len` bytes
    pub payload: Bytes,
    /// The PreviousTagSize field that followed the tag in the file
    pub previous_tag_size: u32,
}

impl Tag {
    pub fn kind(&self) -> TagKind {
        self.header.kind
    }

    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    pub fn stream_id(&self) -> u32 {
        self.header.stream_id
    }

    pub fn is_video(&self) -> bool {
        self.header.kind == TagKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.header.kind == TagKind::Audio
    }

    /// For video tags, get the frame type
    pub fn video_frame_type(&self) -> Option<VideoFrameType> {
        if self.is_video() && !self.payload.is_empty() {
            VideoFrameType::from_byte(self.payload[0])
        } else {
            None
        }
    }

    /// For video tags, get the codec
    pub fn video_codec(&self) -> Option<VideoCodec> {
        if self.is_video() && !self.payload.is_empty() {
            VideoCodec::from_byte(self.payload[0])
        } else {
            None
        }
    }

    /// For audio tags, get the format
    pub fn audio_format(&self) -> Option<AudioFormat> {
        if self.is_audio() && !self.payload.is_empty() {
            AudioFormat::from_byte(self.payload[0])
        } else {
            None
        }
    }

    pub fn is_keyframe(&self) -> bool {
        self.video_frame_type()
            .map(|ft| ft.is_keyframe())
            .unwrap_or(false)
    }

    /// Size of the tag body
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// The tag as it appeared in the file: header, body and trailing size
    pub fn to_raw(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(TAG_HEADER_SIZE + self.payload.len() + PREVIOUS_TAG_SIZE_LEN);
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
        buf.put_u32(self.previous_tag_size);
        buf.freeze()
    }
}

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// Keyframe (for AVC, a seekable frame)
    Keyframe = 1,
    /// Inter frame (for AVC, a non-seekable frame)
    InterFrame = 2,
    /// Disposable inter frame (H.263 only)
    DisposableInterFrame = 3,
    /// Generated keyframe (reserved for server use)
    GeneratedKeyframe = 4,
    /// Video info/command frame
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    /// Only frame type 1 counts; server-generated keyframes never appear in files.
    pub fn is_keyframe(&self) -> bool {
        matches!(self, VideoFrameType::Keyframe)
    }
}

/// Classify the first byte of a video tag body
pub fn is_keyframe_byte(b: u8) -> bool {
    VideoFrameType::from_byte(b)
        .map(|ft| ft.is_keyframe())
        .unwrap_or(false)
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Sorenson H.263
    SorensonH263 = 2,
    /// Screen video
    ScreenVideo = 3,
    /// VP6
    Vp6 = 4,
    /// VP6 with alpha
    Vp6Alpha = 5,
    /// Screen video v2
    ScreenVideoV2 = 6,
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265) - enhanced RTMP extension
    Hevc = 12,
    /// AV1 - enhanced RTMP extension
    Av1 = 13,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            13 => Some(VideoCodec::Av1),
            _ => None,
        }
    }
}

/// Audio format (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    LinearPcmPlatform = 0,
    Adpcm = 1,
    Mp3 = 2,
    LinearPcmLe = 3,
    Nellymoser16kMono = 4,
    Nellymoser8kMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
    Speex = 11,
    Mp38k = 14,
    DeviceSpecific = 15,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(AudioFormat::LinearPcmPlatform),
            1 => Some(AudioFormat::Adpcm),
            2 => Some(AudioFormat::Mp3),
            3 => Some(AudioFormat::LinearPcmLe),
            4 => Some(AudioFormat::Nellymoser16kMono),
            5 => Some(AudioFormat::Nellymoser8kMono),
            6 => Some(AudioFormat::Nellymoser),
            7 => Some(AudioFormat::G711ALaw),
            8 => Some(AudioFormat::G711MuLaw),
            10 => Some(AudioFormat::Aac),
            11 => Some(AudioFormat::Speex),
            14 => Some(AudioFormat::Mp38k),
            15 => Some(AudioFormat::DeviceSpecific),
            _ => None,
        }
    }
}
