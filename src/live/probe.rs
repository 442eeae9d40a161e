use std::future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, Interval, MissedTickBehavior};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("latency probe already cancelled")]
    AlreadyCancelled,
}

/// Repeating timer driving the round-trip latency probe.
///
/// The interval is created on the first `tick`, so a probe can be built
/// outside the runtime. Once cancelled, `tick` never completes.
#[derive(Debug)]
pub struct LatencyProbe {
    period: Duration,
    interval: Option<Interval>,
    cancelled: bool,
}

impl LatencyProbe {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            interval: None,
            cancelled: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled
    }

    /// Wait for the next tick. The first one fires one period after the first call.
    pub async fn tick(&mut self) {
        if self.cancelled {
            return future::pending().await;
        }
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }

    pub fn cancel(&mut self) -> Result<(), ProbeError> {
        if self.cancelled {
            return Err(ProbeError::AlreadyCancelled);
        }
        self.cancelled = true;
        self.interval = None;
        Ok(())
    }
}
