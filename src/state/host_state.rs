use crate::robots::MAX_CRAWL_DELAY_SECS;
use std::time::{Duration, Instant};

/// Politeness state of one host during a run
///
/// A host hands out request slots spaced by its effective delay. Slots are
/// reserved at dispatch time, so two workers targeting the same host never
/// get overlapping windows even if their fetches run concurrently.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests dispatched to this host in the current run
    pub request_count: u32,

    /// Requests currently running against this host
    pub in_flight: usize,

    /// Earliest instant the next request may start
    pub next_free: Option<Instant>,

    /// Crawl-delay advertised by the host's robots.txt, in seconds
    pub crawl_delay: Option<f64>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if another request may be dispatched under `per_host_limit`
    pub fn can_dispatch(&self, per_host_limit: usize) -> bool {
        self.in_flight < per_host_limit
    }

    /// Reserves the next slot and returns when it opens
    ///
    /// The slot starts at `max(now, next_free)`; the one after it is pushed
    /// `delay` further out.
    pub fn reserve(&mut self, now: Instant, delay: Duration) -> Instant {
        let start = match self.next_free {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next_free = Some(start.checked_add(delay).unwrap_or(start));
        self.request_count += 1;
        self.in_flight += 1;
        start
    }

    /// Marks a dispatched request as finished
    pub fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Time until the next slot opens, if it is in the future
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        self.next_free
            .filter(|next| *next > now)
            .map(|next| next - now)
    }

    /// Larger of the configured throttle and the robots crawl delay
    ///
    /// The crawl delay is capped at [`MAX_CRAWL_DELAY_SECS`].
    pub fn effective_delay(&self, throttle: Duration) -> Duration {
        let robots = self
            .crawl_delay
            .filter(|d| d.is_finite() && *d > 0.0)
            .and_then(|d| Duration::try_from_secs_f64(d.min(MAX_CRAWL_DELAY_SECS)).ok())
            .unwrap_or(Duration::ZERO);
        throttle.max(robots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_host_state() {
        let state = HostState::new();
        assert_eq!(state.request_count, 0);
        assert_eq!(state.in_flight, 0);
        assert!(state.next_free.is_none());
        assert!(state.can_dispatch(1));
    }

    #[test]
    fn test_reserve_spaces_slots() {
        let mut state = HostState::new();
        let now = Instant::now();
        let delay = Duration::from_secs(2);

        let first = state.reserve(now, delay);
        let second = state.reserve(now, delay);
        let third = state.reserve(now + Duration::from_secs(10), delay);

        assert_eq!(first, now);
        assert_eq!(second, now + delay);
        assert_eq!(third, now + Duration::from_secs(10));
        assert_eq!(state.request_count, 3);
    }

    #[test]
    fn test_per_host_limit() {
        let mut state = HostState::new();
        let now = Instant::now();

        state.reserve(now, Duration::ZERO);
        assert!(!state.can_dispatch(1));
        assert!(state.can_dispatch(2));

        state.release();
        assert!(state.can_dispatch(1));
    }

    #[test]
    fn test_time_until_next_request() {
        let mut state = HostState::new();
        let now = Instant::now();
        assert!(state.time_until_next_request(now).is_none());

        state.reserve(now, Duration::from_millis(1000));
        assert_eq!(
            state.time_until_next_request(now + Duration::from_millis(400)),
            Some(Duration::from_millis(600))
        );
        assert!(state
            .time_until_next_request(now + Duration::from_millis(1100))
            .is_none());
    }

    #[test]
    fn test_effective_delay_takes_larger() {
        let mut state = HostState::new();
        assert_eq!(
            state.effective_delay(Duration::from_millis(500)),
            Duration::from_millis(500)
        );

        state.crawl_delay = Some(5.0);
        assert_eq!(
            state.effective_delay(Duration::from_millis(500)),
            Duration::from_secs(5)
        );

        state.crawl_delay = Some(0.25);
        assert_eq!(
            state.effective_delay(Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_huge_crawl_delay_is_capped() {
        let mut state = HostState::new();
        state.crawl_delay = Some(1e300);
        assert_eq!(
            state.effective_delay(Duration::ZERO),
            Duration::from_secs_f64(MAX_CRAWL_DELAY_SECS)
        );
    }

    #[test]
    fn test_reserve_survives_overflowing_delay() {
        let mut state = HostState::new();
        let now = Instant::now();

        let first = state.reserve(now, Duration::MAX);
        assert_eq!(first, now);
        assert_eq!(state.next_free, Some(now));
        assert_eq!(state.request_count, 1);
    }
}
