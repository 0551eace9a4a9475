//! RTMP wire protocol
//!
//! The pieces the publishing client needs:
//! - Simple handshake (client side)
//! - Chunk stream encoder and decoder
//! - Message and AMF0 command model

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder};
pub use handshake::Handshake;
pub use message::{Command, RtmpMessage};
