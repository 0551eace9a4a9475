//! RTMP protocol constants

/// RTMP version sent in C0
pub const RTMP_VERSION: u8 = 3;

/// Size of C1/C2/S1/S2
pub const HANDSHAKE_SIZE: usize = 1536;

pub const DEFAULT_PORT: u16 = 1935;

/// Chunk size both sides start with
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size announced by the publisher after the handshake
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;

/// Largest chunk size worth negotiating (a message never exceeds 24 bits)
pub const MAX_CHUNK_SIZE: u32 = 0xFF_FFFF;

/// Marker in the 24-bit timestamp field announcing a 32-bit extended timestamp
pub const EXTENDED_TIMESTAMP: u32 = 0xFF_FFFF;

// Chunk stream IDs
pub const CSID_PROTOCOL_CONTROL: u32 = 2;
pub const CSID_COMMAND: u32 = 3;
pub const CSID_MEDIA: u32 = 4;

// Message type IDs
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event types
pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_SET_BUFFER_LENGTH: u16 = 3;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

// Command names
pub const CMD_CONNECT: &str = "connect";
pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";
pub const CMD_ON_STATUS: &str = "onStatus";
pub const CMD_RELEASE_STREAM: &str = "releaseStream";
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_FC_UNPUBLISH: &str = "FCUnpublish";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_PUBLISH: &str = "publish";

// NetStream status codes
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
