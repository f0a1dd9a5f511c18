// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Spacing and limit of repeated attempts.
///
/// Used both for delivering to the backend and, through
/// [`crate::LoggingGuarantee::TryWithPolicy`], for getting an item into a full
/// queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Up to `n` attempts back to back.
    Immediate(u64),
    /// Up to `n` attempts, waiting `delay_ms` before each retry.
    Constant(u64, u64),
    /// Up to `n` attempts, waiting `delay_ms * (attempt - 1)` before each retry.
    LinearBackoff(u64, u64),
    /// Up to `attempts` attempts, doubling from `base_ms` and capped at `cap_ms`.
    ExponentialBackoff {
        attempts: u64,
        base_ms: u64,
        cap_ms: u64,
    },
    /// Never gives up, waiting `delay_ms` between attempts.
    Forever(u64),
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::ExponentialBackoff {
            attempts: 5,
            base_ms: 25,
            cap_ms: 5_000,
        }
    }
}

impl RetryStrategy {
    /// Maximum number of attempts, `None` when unbounded.
    #[must_use]
    pub fn max_attempts(&self) -> Option<u64> {
        match self {
            RetryStrategy::Immediate(n)
            | RetryStrategy::Constant(n, _)
            | RetryStrategy::LinearBackoff(n, _) => Some(*n),
            RetryStrategy::ExponentialBackoff { attempts, .. } => Some(*attempts),
            RetryStrategy::Forever(_) => None,
        }
    }

    /// Delay to wait before `attempt` (1-based), or `None` once the strategy
    /// is exhausted. The first attempt never waits.
    #[must_use]
    pub fn delay_before(&self, attempt: u64) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        if let Some(max) = self.max_attempts() {
            if attempt > max {
                return None;
            }
        }
        if attempt == 1 {
            return Some(Duration::ZERO);
        }
        let retry = attempt - 1;
        let delay = match self {
            RetryStrategy::Immediate(_) => Duration::ZERO,
            RetryStrategy::Constant(_, delay_ms) => Duration::from_millis(*delay_ms),
            RetryStrategy::LinearBackoff(_, delay_ms) => {
                Duration::from_millis(delay_ms.saturating_mul(retry))
            }
            RetryStrategy::ExponentialBackoff {
                base_ms, cap_ms, ..
            } => {
                let factor = 1u64.checked_shl((retry - 1).min(63) as u32).unwrap_or(u64::MAX);
                Duration::from_millis(base_ms.saturating_mul(factor).min(*cap_ms))
            }
            RetryStrategy::Forever(delay_ms) => Duration::from_millis(*delay_ms),
        };
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_never_waits() {
        for strategy in [
            RetryStrategy::Immediate(3),
            RetryStrategy::LinearBackoff(3, 100),
            RetryStrategy::default(),
            RetryStrategy::Forever(50),
        ] {
            assert_eq!(strategy.delay_before(1), Some(Duration::ZERO));
        }
    }

    #[test]
    fn test_immediate_exhausts() {
        let strategy = RetryStrategy::Immediate(2);
        assert_eq!(strategy.delay_before(2), Some(Duration::ZERO));
        assert_eq!(strategy.delay_before(3), None);
    }

    #[test]
    fn test_constant_delay() {
        let strategy = RetryStrategy::Constant(3, 10);
        assert_eq!(strategy.delay_before(2), Some(Duration::from_millis(10)));
        assert_eq!(strategy.delay_before(3), Some(Duration::from_millis(10)));
        assert_eq!(strategy.delay_before(4), None);
    }

    #[test]
    fn test_linear_backoff_grows_linearly() {
        let strategy = RetryStrategy::LinearBackoff(4, 10);
        assert_eq!(strategy.delay_before(2), Some(Duration::from_millis(10)));
        assert_eq!(strategy.delay_before(3), Some(Duration::from_millis(20)));
        assert_eq!(strategy.delay_before(4), Some(Duration::from_millis(30)));
        assert_eq!(strategy.delay_before(5), None);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let strategy = RetryStrategy::ExponentialBackoff {
            attempts: 10,
            base_ms: 25,
            cap_ms: 150,
        };
        assert_eq!(strategy.delay_before(2), Some(Duration::from_millis(25)));
        assert_eq!(strategy.delay_before(3), Some(Duration::from_millis(50)));
        assert_eq!(strategy.delay_before(4), Some(Duration::from_millis(100)));
        assert_eq!(strategy.delay_before(5), Some(Duration::from_millis(150)));
        assert_eq!(strategy.delay_before(10), Some(Duration::from_millis(150)));
        assert_eq!(strategy.delay_before(11), None);
    }

    #[test]
    fn test_forever_never_exhausts() {
        let strategy = RetryStrategy::Forever(5);
        assert_eq!(strategy.max_attempts(), None);
        assert_eq!(
            strategy.delay_before(1_000_000),
            Some(Duration::from_millis(5))
        );
    }

    #[test]
    fn test_attempt_zero_is_invalid() {
        assert_eq!(RetryStrategy::Immediate(3).delay_before(0), None);
    }
}
