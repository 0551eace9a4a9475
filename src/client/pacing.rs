//! Real-time pacing
//!
//! The loop may run ahead of the wall clock between keyframes. Only when the
//! next tag is a video keyframe does it hold back until the clock has caught
//! up with the last dispatched timestamp:
//!
//! ```text
//!   throttle  <=>  next_is_keyframe  &&  elapsed_ms < previous_dispatch_ts
//! ```
//!
//! While throttled the caller sleeps one fixed quantum and asks again.

use std::time::Duration;

use tokio::time::Instant;

/// Sleep length while the gate is closed
pub const DEFAULT_THROTTLE_QUANTUM: Duration = Duration::from_secs(1);

/// Pacing state threaded through the publish loop
#[derive(Debug, Clone)]
pub struct PacingClock {
    started_at: Instant,
    previous_dispatch_ts: u32,
    next_is_keyframe: bool,
    last_logged_ts: u32,
}

impl PacingClock {
    /// Start the clock at `now`
    pub fn start(now: Instant) -> Self {
        Self {
            started_at: now,
            previous_dispatch_ts: 0,
            next_is_keyframe: false,
            last_logged_ts: 0,
        }
    }

    /// Milliseconds of wall clock since the stream started
    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started_at).as_millis() as u64
    }

    pub fn should_throttle(&self, now: Instant) -> bool {
        self.next_is_keyframe && self.elapsed_ms(now) < u64::from(self.previous_dispatch_ts)
    }

    /// Note a dispatched tag. The recorded timestamp never moves backwards.
    pub fn record_dispatch(&mut self, timestamp: u32) {
        self.previous_dispatch_ts = self.previous_dispatch_ts.max(timestamp);
    }

    pub fn set_next_keyframe(&mut self, is_keyframe: bool) {
        self.next_is_keyframe = is_keyframe;
    }

    pub fn next_is_keyframe(&self) -> bool {
        self.next_is_keyframe
    }

    pub fn previous_dispatch_timestamp(&self) -> u32 {
        self.previous_dispatch_ts
    }

    /// Timestamp to report for a throttle wait, once per timestamp
    pub fn take_notice(&mut self) -> Option<u32> {
        if self.previous_dispatch_ts > self.last_logged_ts {
            self.last_logged_ts = self.previous_dispatch_ts;
            Some(self.previous_dispatch_ts)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_throttle_without_keyframe_hint() {
        let now = Instant::now();
        let mut clock = PacingClock::start(now);
        clock.record_dispatch(60_000);

        assert!(!clock.next_is_keyframe());
        assert!(!clock.should_throttle(now));
    }

    #[test]
    fn test_throttle_until_clock_catches_up() {
        let now = Instant::now();
        let mut clock = PacingClock::start(now);
        clock.record_dispatch(1000);
        clock.set_next_keyframe(true);

        assert!(clock.should_throttle(now));
        assert!(clock.should_throttle(now + Duration::from_millis(999)));
        assert!(!clock.should_throttle(now + Duration::from_millis(1000)));
    }

    #[test]
    fn test_previous_timestamp_is_monotonic() {
        let mut clock = PacingClock::start(Instant::now());
        clock.record_dispatch(2000);
        clock.record_dispatch(1500);

        assert_eq!(clock.previous_dispatch_timestamp(), 2000);
    }

    #[test]
    fn test_notice_deduplicated() {
        let mut clock = PacingClock::start(Instant::now());
        assert_eq!(clock.take_notice(), None);

        clock.record_dispatch(1000);
        assert_eq!(clock.take_notice(), Some(1000));
        assert_eq!(clock.take_notice(), None);
        assert_eq!(clock.take_notice(), None);

        clock.record_dispatch(2000);
        assert_eq!(clock.take_notice(), Some(2000));
    }

    #[test]
    fn test_elapsed_before_start() {
        let now = Instant::now();
        let clock = PacingClock::start(now + Duration::from_secs(5));

        assert_eq!(clock.elapsed_ms(now), 0);
    }
}
