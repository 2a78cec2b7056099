//! Time-based event throttling.

use engine_core::Timestamp;

/// Lets one event through per interval.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval_ms: i64,
    last: Option<Timestamp>,
}

impl Throttle {
    pub fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms,
            last: None,
        }
    }

    /// Returns true and records `now` if at least one interval has passed
    /// since the last accepted event.
    pub fn ready(&mut self, now: Timestamp) -> bool {
        match self.last {
            Some(last) if now - last < self.interval_ms => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_once_per_interval() {
        let mut throttle = Throttle::new(250);
        assert!(throttle.ready(0));
        assert!(!throttle.ready(100));
        assert!(!throttle.ready(249));
        assert!(throttle.ready(250));
        assert!(!throttle.ready(400));
        assert!(throttle.ready(600));
    }

    #[test]
    fn test_reset_reopens() {
        let mut throttle = Throttle::new(100);
        assert!(throttle.ready(10));
        throttle.reset();
        assert!(throttle.ready(20));
    }
}
