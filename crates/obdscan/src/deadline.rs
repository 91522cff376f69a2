//! Monotonic-clock deadlines consulted at scan checkpoints

use std::time::Duration;

use tokio::time::Instant;

/// A point in time after which a scan phase must stop starting new work
///
/// Built on `tokio::time::Instant`, so a paused test clock drives it too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + budget,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Time since the deadline was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Bound a wait so it ends no later than this deadline
    pub fn clamp(&self, wait: Duration) -> Duration {
        wait.min(self.remaining())
    }

    /// Whichever of the two deadlines comes first
    pub fn earliest(self, other: Deadline) -> Deadline {
        if other.at < self.at {
            Deadline {
                started: self.started,
                at: other.at,
            }
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let deadline = Deadline::after(Duration::from_millis(100));
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(deadline.remaining(), Duration::from_millis(40));
        assert_eq!(deadline.clamp(Duration::from_millis(500)), Duration::from_millis(40));
        assert_eq!(deadline.clamp(Duration::from_millis(10)), Duration::from_millis(10));

        tokio::time::advance(Duration::from_millis(40)).await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert_eq!(deadline.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earliest_deadline() {
        let long = Deadline::after(Duration::from_secs(45));
        let short = Deadline::after(Duration::from_secs(15));
        assert_eq!(long.earliest(short).remaining(), Duration::from_secs(15));
        assert_eq!(short.earliest(long).remaining(), Duration::from_secs(15));
    }
}
