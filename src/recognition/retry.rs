//! Attempt budget for engine starts

use std::time::Duration;

use crate::config::VoiceConfig;

/// Per-intent attempt counter with exponential backoff between attempts
#[derive(Debug, Clone)]
pub struct RetryBudget {
    /// Retries already scheduled for the current intent
    used: u32,
    /// Engine start attempts allowed per intent, the first included
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            used: 0,
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay)
    }

    /// Record a failed attempt. Returns the number (1-based) and delay of
    /// the retry to schedule, or `None` when that failure was the last
    /// attempt allowed.
    pub fn next_retry(&mut self) -> Option<(u32, Duration)> {
        let attempts = self.used + 1;
        if attempts >= self.max_attempts {
            return None;
        }
        self.used += 1;
        Some((self.used, self.base_delay * 2u32.pow(self.used - 1)))
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let mut budget = RetryBudget::new(3, Duration::from_millis(500));
        assert_eq!(budget.next_retry(), Some((1, Duration::from_millis(500))));
        assert_eq!(budget.next_retry(), Some((2, Duration::from_millis(1000))));
        // third failure ends the intent
        assert_eq!(budget.next_retry(), None);
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut budget = RetryBudget::new(2, Duration::from_millis(100));
        assert!(budget.next_retry().is_some());
        assert!(budget.next_retry().is_none());
        budget.reset();
        assert_eq!(budget.next_retry(), Some((1, Duration::from_millis(100))));
    }

    #[test]
    fn test_single_attempt_budget() {
        let mut budget = RetryBudget::new(1, Duration::from_millis(100));
        assert!(budget.next_retry().is_none());
        let mut budget = RetryBudget::new(0, Duration::from_millis(100));
        assert!(budget.next_retry().is_none());
    }
}
