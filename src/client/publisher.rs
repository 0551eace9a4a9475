//! The publish loop
//!
//! One task reads tags, waits for the wall clock when pacing requires it and
//! hands each tag to the session, strictly in that order:
//!
//! ```text
//! next_tag ──► pacing gate ──► dispatch ──► keyframe lookahead ──┐
//!    ▲             │ (sleep one quantum while closed)             │
//!    └─────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! The loop ends at the end of the source or on the first error. The session
//! is closed and the source dropped on every exit path.

use std::io::{Read, Seek};
use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::config::PublishConfig;
use super::connector::RtmpConnector;
use super::dispatch::DispatchMode;
use super::pacing::{PacingClock, DEFAULT_THROTTLE_QUANTUM};
use super::session::Session;
use crate::error::{Error, Result};
use crate::media::TagDecoder;
use crate::stats::PublishStats;

/// Drives tags from a [`TagDecoder`] into a [`Session`]
///
/// # Example
/// ```no_run
/// use flv_push::client::{DispatchMode, Publisher, PublishConfig, RtmpConnector};
/// use flv_push::media::TagDecoder;
///
/// # async fn example() -> flv_push::error::Result<()> {
/// let config = PublishConfig::new("rtmp://localhost/live/stream_key");
/// let decoder = TagDecoder::open_path("input.flv")?;
/// let session = RtmpConnector::connect(&config).await?;
///
/// let stats = Publisher::new(session, DispatchMode::Packet).run(decoder).await?;
/// println!("sent {} tags", stats.tags_sent);
/// # Ok(())
/// # }
/// ```
pub struct Publisher<S> {
    session: S,
    mode: DispatchMode,
    quantum: Duration,
}

impl<S: Session> Publisher<S> {
    pub fn new(session: S, mode: DispatchMode) -> Self {
        Self {
            session,
            mode,
            quantum: DEFAULT_THROTTLE_QUANTUM,
        }
    }

    /// Set the sleep length used while the pacing gate is closed
    pub fn with_throttle_quantum(mut self, quantum: Duration) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Publish every audio and video tag of `decoder`.
    ///
    /// Returns the run's statistics when the source is exhausted. Any other
    /// terminal condition is returned as the error. The session is closed
    /// before returning in both cases.
    pub async fn run<R: Read + Seek>(&mut self, mut decoder: TagDecoder<R>) -> Result<PublishStats> {
        let started_at = self.session.now();
        let mut clock = PacingClock::start(started_at);
        let mut stats = PublishStats::new(started_at);

        debug!(mode = %self.mode, "Publish loop started");
        let result = self.pump(&mut decoder, &mut clock, &mut stats).await;

        self.session.close().await;
        stats.skipped_tags = decoder.skipped_tags();
        stats.finish(self.session.now());
        drop(decoder);

        match result {
            Ok(()) => {
                info!(
                    tags = stats.tags_sent,
                    audio = stats.audio_tags,
                    video = stats.video_tags,
                    keyframes = stats.keyframes,
                    skipped = stats.skipped_tags,
                    bytes = stats.bytes_sent,
                    last_timestamp_ms = stats.last_timestamp,
                    bitrate = stats.bitrate(),
                    "Stream ended"
                );
                Ok(stats)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    tags = stats.tags_sent,
                    last_timestamp_ms = stats.last_timestamp,
                    "Publish loop stopped"
                );
                Err(e)
            }
        }
    }

    async fn pump<R: Read + Seek>(
        &mut self,
        decoder: &mut TagDecoder<R>,
        clock: &mut PacingClock,
        stats: &mut PublishStats,
    ) -> Result<()> {
        loop {
            let tag = match decoder.next_tag() {
                Ok(tag) => tag,
                Err(Error::EndOfStream) => return Ok(()),
                Err(e) => return Err(e),
            };

            while clock.should_throttle(self.session.now()) {
                if let Some(timestamp_ms) = clock.take_notice() {
                    info!(timestamp_ms, "Waiting for wall clock");
                    stats.progress_notices += 1;
                }
                stats.throttle_waits += 1;
                sleep(self.quantum).await;
            }

            self.mode.dispatch(&mut self.session, &tag).await?;
            clock.record_dispatch(tag.timestamp());
            stats.record(&tag);

            if let Some(is_keyframe) = decoder.peek_next_keyframe()? {
                clock.set_next_keyframe(is_keyframe);
            }
        }
    }
}

/// Publish the FLV file at `input` to `config.url`.
///
/// The file is opened before connecting so a bad path never touches the
/// network. Failures opening the file or setting up the session are returned
/// as they are. A failure after the session is up comes back wrapped in
/// [`Error::Interrupted`].
pub async fn publish_file(input: impl AsRef<Path>, config: &PublishConfig) -> Result<PublishStats> {
    let decoder = TagDecoder::open_path(input)?;
    let session = RtmpConnector::connect(config).await?;

    Publisher::new(session, config.mode)
        .with_throttle_quantum(config.throttle_quantum)
        .run(decoder)
        .await
        .map_err(Error::interrupted)
}
