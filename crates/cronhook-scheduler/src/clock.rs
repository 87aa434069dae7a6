use chrono::{DateTime, Utc};

/// Source of "now" for the registry and the dispatch loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A UTC origin advanced by Tokio's monotonic clock.
///
/// Under a paused runtime (`#[tokio::test(start_paused = true)]`) Tokio time
/// only moves when every task is idle, so schedules can be driven through
/// simulated seconds deterministically. Elapsed time is measured from the
/// moment the clock is built.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: DateTime<Utc>,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin + elapsed
    }
}
