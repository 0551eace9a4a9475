//! Statistics for a publish run

use std::time::Duration;

use tokio::time::Instant;

use crate::media::{AudioFormat, Tag, VideoCodec};

/// Counters for one publish run
#[derive(Debug, Clone)]
pub struct PublishStats {
    /// Start time
    pub started_at: Instant,
    /// Tags handed to the session
    pub tags_sent: u64,
    pub audio_tags: u64,
    pub video_tags: u64,
    /// Video keyframes sent
    pub keyframes: u64,
    /// Non-media tags skipped by the decoder
    pub skipped_tags: u64,
    /// Payload bytes sent
    pub bytes_sent: u64,
    /// Pacing sleeps taken
    pub throttle_waits: u64,
    /// Progress notices logged
    pub progress_notices: u64,
    /// Timestamp of the last tag sent
    pub last_timestamp: u32,
    /// First video codec seen
    pub video_codec: Option<VideoCodec>,
    /// First audio format seen
    pub audio_format: Option<AudioFormat>,
    /// Run length, fixed by [`finish`](Self::finish)
    pub duration: Duration,
}

impl PublishStats {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            tags_sent: 0,
            audio_tags: 0,
            video_tags: 0,
            keyframes: 0,
            skipped_tags: 0,
            bytes_sent: 0,
            throttle_waits: 0,
            progress_notices: 0,
            last_timestamp: 0,
            video_codec: None,
            audio_format: None,
            duration: Duration::ZERO,
        }
    }

    /// Account for a dispatched tag
    pub fn record(&mut self, tag: &Tag) {
        self.tags_sent += 1;
        self.bytes_sent += tag.size() as u64;
        self.last_timestamp = tag.timestamp();

        if tag.is_video() {
            self.video_tags += 1;
            if tag.is_keyframe() {
                self.keyframes += 1;
            }
            if self.video_codec.is_none() {
                self.video_codec = tag.video_codec();
            }
        } else if tag.is_audio() {
            self.audio_tags += 1;
            if self.audio_format.is_none() {
                self.audio_format = tag.audio_format();
            }
        }
    }

    /// Fix the run length at `now`
    pub fn finish(&mut self, now: Instant) {
        self.duration = now.saturating_duration_since(self.started_at);
    }

    /// Average payload bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let millis = self.duration.as_millis() as u64;
        if millis > 0 {
            self.bytes_sent * 8 * 1000 / millis
        } else {
            0
        }
    }
}
