//! Tick pacing.
//!
//! Pacing is the loop's only suspension point, so it is also where a stop
//! request is noticed between ticks.

use std::time::{Duration, Instant};

use crate::shutdown::CancellationToken;

/// Longest single sleep before re-checking the cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Waits out the remainder of a tick.
pub trait Pacer {
    fn pace(&mut self, period: Duration, token: &CancellationToken);
}

/// Sleeps the calling thread to hold a fixed tick rate.
///
/// Deadlines advance by exactly one period per tick so time spent doing the
/// tick's work does not accumulate as drift. When the loop falls more than a
/// period behind, the schedule restarts from now instead of bursting.
#[derive(Debug, Default)]
pub struct ThreadPacer {
    next_deadline: Option<Instant>,
}

impl ThreadPacer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pacer for ThreadPacer {
    fn pace(&mut self, period: Duration, token: &CancellationToken) {
        let now = Instant::now();
        let deadline = match self.next_deadline {
            Some(deadline) if deadline + period > now => deadline,
            _ => now + period,
        };
        self.next_deadline = Some(deadline + period);

        while !token.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

/// Returns immediately. For tests and batch replays.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPacer;

impl Pacer for NoopPacer {
    fn pace(&mut self, _period: Duration, _token: &CancellationToken) {}
}
