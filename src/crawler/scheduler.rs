//! Per-host politeness scheduler
//!
//! This module handles:
//! - Limiting in-flight requests per host
//! - Spacing requests to one host by the larger of the configured throttle
//!   and the host's robots.txt crawl delay
//! - Handing each dispatch a "not before" instant to sleep until

use crate::state::HostState;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A reserved request slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Earliest instant the request may be sent
    pub not_before: Instant,
    /// Spacing applied after this request
    pub delay: Duration,
}

impl Slot {
    /// Time left until the slot opens
    pub fn wait(&self) -> Duration {
        self.not_before.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug)]
pub struct HostScheduler {
    hosts: HashMap<String, HostState>,
    per_host_limit: usize,
    throttle: Duration,
}

impl HostScheduler {
    pub fn new(per_host_limit: usize, throttle: Duration) -> Self {
        Self {
            hosts: HashMap::new(),
            per_host_limit: per_host_limit.max(1),
            throttle,
        }
    }

    /// True if `host` has a free in-flight slot
    pub fn can_dispatch(&self, host: &str) -> bool {
        self.hosts
            .get(host)
            .map_or(true, |state| state.can_dispatch(self.per_host_limit))
    }

    /// Records the robots crawl delay of a host
    pub fn set_crawl_delay(&mut self, host: &str, crawl_delay: Option<f64>) {
        self.state_mut(host).crawl_delay = crawl_delay;
    }

    /// Reserves the next slot for `host`
    pub fn reserve(&mut self, host: &str) -> Slot {
        self.reserve_at(host, Instant::now())
    }

    pub fn reserve_at(&mut self, host: &str, now: Instant) -> Slot {
        let throttle = self.throttle;
        let state = self.state_mut(host);
        let delay = state.effective_delay(throttle);
        let not_before = state.reserve(now, delay);

        tracing::trace!(
            host,
            delay_ms = delay.as_millis() as u64,
            requests = state.request_count,
            "Reserved request slot"
        );
        Slot { not_before, delay }
    }

    /// Frees the in-flight slot of a finished request
    pub fn release(&mut self, host: &str) {
        if let Some(state) = self.hosts.get_mut(host) {
            state.release();
        }
    }

    pub fn host_state(&self, host: &str) -> Option<&HostState> {
        self.hosts.get(host)
    }

    /// Total requests dispatched across all hosts
    pub fn total_requests(&self) -> u64 {
        self.hosts.values().map(|s| u64::from(s.request_count)).sum()
    }

    fn state_mut(&mut self, host: &str) -> &mut HostState {
        self.hosts.entry(host.to_string()).or_default()
    }
}
