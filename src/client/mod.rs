//! Publishing client
//!
//! Provides:
//! - The [`Session`] capability the publish loop dispatches into
//! - Real-time pacing and the two dispatch strategies
//! - [`RtmpConnector`], the RTMP implementation of [`Session`]
//! - [`Publisher`], the read / pace / dispatch loop

pub mod config;
pub mod connector;
pub mod dispatch;
pub mod pacing;
pub mod publisher;
pub mod session;

pub use config::{PublishConfig, RtmpUrl};
pub use connector::RtmpConnector;
pub use dispatch::DispatchMode;
pub use pacing::PacingClock;
pub use publisher::{publish_file, Publisher};
pub use session::{MediaPacket, Session};
