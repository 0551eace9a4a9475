//! # flv-push
//!
//! Publish a local FLV file to an RTMP server at real-time pace.
//!
//! The crate is split into:
//! - [`media`]: byte cursor, FLV tag model and the sequential tag decoder
//! - [`client`]: pacing, dispatch strategies, the publish loop and the RTMP
//!   connector that implements the [`Session`](client::Session) capability
//! - [`protocol`] and [`amf`]: the RTMP wire pieces the connector needs
//! - [`stats`]: counters collected during a run
//!
//! ## Pacing
//!
//! The loop only waits at keyframe boundaries. Before dispatching a tag it
//! checks whether the *next* tag (found by lookahead after the previous
//! dispatch) is a video keyframe and whether the wall clock is still behind
//! the last dispatched timestamp. If so it sleeps a fixed quantum and checks
//! again. Between keyframes tags are sent as fast as the session accepts
//! them, so a receiver sees bursts of up to one GOP.
//!
//! Known limitation: the gate compares the wall clock with the timestamp of
//! the tag already sent, not the one about to be sent. The stream therefore
//! runs up to one GOP ahead of real time.
//!
//! ## Example
//!
//! ```no_run
//! use flv_push::client::{publish_file, PublishConfig};
//!
//! # async fn example() -> flv_push::error::Result<()> {
//! let config = PublishConfig::new("rtmp://localhost/live/inrtmp");
//! let stats = publish_file("input.flv", &config).await?;
//! println!("{} tags in {:?}", stats.tags_sent, stats.duration);
//! # Ok(())
//! # }
//! ```

pub mod amf;
pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod stats;

pub use client::{publish_file, DispatchMode, PublishConfig, Publisher, RtmpConnector, Session};
pub use error::{Error, ErrorKind, Result};
pub use media::{Tag, TagDecoder, TagKind};
pub use stats::PublishStats;
