// =============================================================================
// Rate-Limit Tracker: keeps request weight under the exchange ceiling
// =============================================================================
//
// The exchange enforces:
//   - Request weight: 1200 per minute (we hard-cap ourselves at 1000).
//   - Order rate:     10 per second and 200 000 per day.
//
// The tracker reads the `X-MBX-USED-WEIGHT-1M` / `X-MBX-ORDER-COUNT-*`
// response headers after every request.  Each counter remembers when it was
// last refreshed and reads as zero once its window has rolled over, so a
// blocked tracker unblocks itself without needing a fresh header.
// =============================================================================

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Hard ceiling at which we refuse to send additional requests.
const WEIGHT_HARD_LIMIT: u32 = 1000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 800;

/// Maximum orders per 10-second window.
const ORDER_10S_LIMIT: u32 = 10;
/// Maximum orders per day.
const ORDER_1D_LIMIT: u32 = 200_000;

const WINDOW_1M: Duration = Duration::from_secs(60);
const WINDOW_10S: Duration = Duration::from_secs(10);
const WINDOW_1D: Duration = Duration::from_secs(24 * 60 * 60);

/// A counter that belongs to a fixed-length window.
#[derive(Debug, Clone, Copy, Default)]
struct WindowCounter {
    value: u32,
    updated_at: Option<Instant>,
}

impl WindowCounter {
    fn current(&self, window: Duration, now: Instant) -> u32 {
        match self.updated_at {
            Some(at) if now.saturating_duration_since(at) < window => self.value,
            _ => 0,
        }
    }

    fn set(&mut self, value: u32, now: Instant) {
        self.value = value;
        self.updated_at = Some(now);
    }

    /// Add one, starting a new window if the previous one has passed.
    fn bump(&mut self, window: Duration, now: Instant) {
        if self.current(window, now) == 0 {
            self.set(1, now);
        } else {
            self.value += 1;
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    weight_1m: WindowCounter,
    orders_10s: WindowCounter,
    orders_1d: WindowCounter,
}

/// Thread-safe rate-limit tracker.
#[derive(Default)]
pub struct RateLimitTracker {
    counters: Mutex<Counters>,
}

fn header_u32(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh counters from the response headers of the last request.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        self.update_at(headers, Instant::now());
    }

    fn update_at(&self, headers: &reqwest::header::HeaderMap, now: Instant) {
        let mut counters = self.counters.lock();

        if let Some(w) = header_u32(headers, "X-MBX-USED-WEIGHT-1M") {
            let prev = counters.weight_1m.current(WINDOW_1M, now);
            counters.weight_1m.set(w, now);
            if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
                warn!(
                    used_weight = w,
                    hard_limit = WEIGHT_HARD_LIMIT,
                    "rate-limit weight crossed warning threshold"
                );
            }
            debug!(used_weight_1m = w, "rate-limit weight updated from header");
        }

        if let Some(c) = header_u32(headers, "X-MBX-ORDER-COUNT-10S") {
            counters.orders_10s.set(c, now);
        }
        if let Some(c) = header_u32(headers, "X-MBX-ORDER-COUNT-1D") {
            counters.orders_1d.set(c, now);
        }
    }

    /// `true` if `weight` more request weight stays under the hard limit.
    pub fn can_send_request(&self, weight: u32) -> bool {
        self.can_send_at(weight, Instant::now())
    }

    fn can_send_at(&self, weight: u32, now: Instant) -> bool {
        let current = self.counters.lock().weight_1m.current(WINDOW_1M, now);
        let allowed = current + weight <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(
                current_weight = current,
                requested_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "request blocked, would exceed rate limit"
            );
        }
        allowed
    }

    /// `true` if another order fits in both the 10 s and the daily window.
    pub fn can_place_order(&self) -> bool {
        self.can_place_order_at(Instant::now())
    }

    fn can_place_order_at(&self, now: Instant) -> bool {
        let counters = self.counters.lock();
        let count_10s = counters.orders_10s.current(WINDOW_10S, now);
        let count_1d = counters.orders_1d.current(WINDOW_1D, now);

        if count_10s >= ORDER_10S_LIMIT {
            warn!(count_10s, limit = ORDER_10S_LIMIT, "order blocked, 10 s order limit reached");
            return false;
        }
        if count_1d >= ORDER_1D_LIMIT {
            warn!(count_1d, limit = ORDER_1D_LIMIT, "order blocked, daily order limit reached");
            return false;
        }
        true
    }

    /// Count an order locally before the exchange echoes updated headers.
    pub fn record_order_sent(&self) {
        self.record_order_at(Instant::now());
    }

    fn record_order_at(&self, now: Instant) {
        let mut counters = self.counters.lock();
        counters.orders_10s.bump(WINDOW_10S, now);
        counters.orders_1d.bump(WINDOW_1D, now);
    }

    /// Weight used in the current one-minute window.
    pub fn used_weight(&self) -> u32 {
        self.counters.lock().weight_1m.current(WINDOW_1M, Instant::now())
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let now = Instant::now();
        let counters = self.counters.lock();
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &counters.weight_1m.current(WINDOW_1M, now))
            .field("order_count_10s", &counters.orders_10s.current(WINDOW_10S, now))
            .field("order_count_1d", &counters.orders_1d.current(WINDOW_1D, now))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn weight_header_updates_counter() {
        let tracker = RateLimitTracker::new();
        let mut headers = HeaderMap::new();
        headers.insert("X-MBX-USED-WEIGHT-1M", HeaderValue::from_static("850"));
        tracker.update_from_headers(&headers);

        assert_eq!(tracker.used_weight(), 850);
        assert!(tracker.can_send_request(150));
        assert!(!tracker.can_send_request(151));
    }

    #[test]
    fn garbage_header_is_ignored() {
        let tracker = RateLimitTracker::new();
        let mut headers = HeaderMap::new();
        headers.insert("X-MBX-USED-WEIGHT-1M", HeaderValue::from_static("lots"));
        tracker.update_from_headers(&headers);
        assert_eq!(tracker.used_weight(), 0);
    }

    #[test]
    fn order_window_limit() {
        let tracker = RateLimitTracker::new();
        for _ in 0..ORDER_10S_LIMIT {
            assert!(tracker.can_place_order());
            tracker.record_order_sent();
        }
        assert!(!tracker.can_place_order());
    }

    #[test]
    fn weight_block_lifts_when_the_minute_rolls_over() {
        let tracker = RateLimitTracker::new();
        let start = Instant::now();
        let mut headers = HeaderMap::new();
        headers.insert("X-MBX-USED-WEIGHT-1M", HeaderValue::from_static("990"));
        tracker.update_at(&headers, start);

        assert!(!tracker.can_send_at(20, start));
        assert!(!tracker.can_send_at(20, start + Duration::from_secs(59)));
        assert!(tracker.can_send_at(20, start + WINDOW_1M));
    }

    #[test]
    fn order_block_lifts_after_ten_seconds() {
        let tracker = RateLimitTracker::new();
        let start = Instant::now();
        for _ in 0..ORDER_10S_LIMIT {
            tracker.record_order_at(start);
        }
        assert!(!tracker.can_place_order_at(start + Duration::from_secs(9)));
        assert!(tracker.can_place_order_at(start + WINDOW_10S));

        // A fresh window starts counting from one.
        tracker.record_order_at(start + WINDOW_10S);
        let counters = tracker.counters.lock();
        assert_eq!(counters.orders_10s.current(WINDOW_10S, start + WINDOW_10S), 1);
        assert_eq!(counters.orders_1d.current(WINDOW_1D, start + WINDOW_10S), ORDER_10S_LIMIT + 1);
    }
}
