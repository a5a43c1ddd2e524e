//! Trailing debounce for channel writes.
//!
//! The scheduler only tracks *when* a flush is owed. It never captures document content, so a
//! flush always reads whatever the document holds at the moment it fires.

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_SAVE_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    PendingFlush { deadline: Instant },
}

#[derive(Debug)]
pub struct SaveScheduler {
    delay: Duration,
    state: FlushState,
    disposed: bool,
}

impl SaveScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: FlushState::Idle,
            disposed: false,
        }
    }

    pub fn state(&self) -> FlushState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            FlushState::PendingFlush { deadline } => Some(deadline),
            FlushState::Idle => None,
        }
    }

    /// Arms or re-arms the timer so it fires `delay` after this mutation.
    pub fn on_mutation(&mut self, now: Instant) -> Option<Instant> {
        if self.disposed {
            return None;
        }
        let deadline = now + self.delay;
        self.state = FlushState::PendingFlush { deadline };
        Some(deadline)
    }

    /// Returns `true` exactly once when the pending deadline has elapsed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.state {
            FlushState::PendingFlush { deadline } if !self.disposed && now >= deadline => {
                self.state = FlushState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drops any pending deadline. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        let was_pending = matches!(self.state, FlushState::PendingFlush { .. });
        self.state = FlushState::Idle;
        was_pending
    }

    pub fn dispose(&mut self) {
        self.cancel();
        self.disposed = true;
    }
}

impl Default for SaveScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_SAVE_DELAY_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn rapid_mutations_push_the_deadline_back() {
        let start = Instant::now();
        let mut scheduler = SaveScheduler::default();

        scheduler.on_mutation(start);
        scheduler.on_mutation(start + ms(200));
        scheduler.on_mutation(start + ms(400));

        assert!(!scheduler.take_due(start + ms(1_000)));
        assert!(!scheduler.take_due(start + ms(1_399)));
        assert!(scheduler.take_due(start + ms(1_400)));
        assert!(!scheduler.take_due(start + ms(5_000)));
        assert_eq!(scheduler.state(), FlushState::Idle);
    }

    #[test]
    fn cancel_prevents_later_fire() {
        let start = Instant::now();
        let mut scheduler = SaveScheduler::default();
        scheduler.on_mutation(start);

        assert!(scheduler.cancel());
        assert!(!scheduler.take_due(start + ms(1_000)));
        assert!(!scheduler.cancel());
    }

    #[test]
    fn disposed_scheduler_never_arms() {
        let start = Instant::now();
        let mut scheduler = SaveScheduler::default();
        scheduler.on_mutation(start);
        scheduler.dispose();

        assert_eq!(scheduler.on_mutation(start + ms(10)), None);
        assert_eq!(scheduler.deadline(), None);
        assert!(!scheduler.take_due(start + ms(10_000)));
    }
}
