//! Retry policy for outcome delivery: exponential backoff with a per-attempt
//! cap, an attempt limit, and a wall-clock ceiling.
//!
//! `RetrySchedule` is the explicit state object (attempts made, start time).
//! It is advanced by `next`, which never sleeps and never reads a clock on its
//! own, so the whole policy is testable without real time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Retry policy for the reporting stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first attempt.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Cap applied to every individual delay.
    pub max_delay: Duration,

    /// Maximum number of delivery attempts (including the first).
    pub max_attempts: u32,

    /// Backoff ceiling: total wall-clock budget for the stage.
    pub max_elapsed: Duration,

    /// Draw each delay uniformly from `[delay / 2, delay]`.
    ///
    /// Without jitter, jobs that start failing together retry in lockstep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            max_elapsed: Duration::from_secs(300),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before attempt `attempt` (1-indexed).
    ///
    /// delay = min(base_delay * multiplier^(attempt - 1), max_delay)
    ///
    /// Example with base_delay=1s, multiplier=2.0, max_delay=30s:
    /// - attempt 1: 1s
    /// - attempt 2: 2s
    /// - attempt 3: 4s
    /// - attempt 6: 30s (capped)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Apply jitter (if enabled) to a computed delay.
    pub fn jittered<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let half = delay / 2;
        let spread = delay - half;
        half + spread.mul_f64(rng.gen_range(0.0..=1.0))
    }
}

/// Next step for the reporting loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Wait `delay`, then send attempt `number`.
    Attempt { number: u32, delay: Duration },

    /// Stop retrying.
    GiveUp { reason: String },
}

#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    attempts_made: u32,
    started_at: DateTime<Utc>,
}

impl RetrySchedule {
    pub fn new(policy: RetryPolicy, started_at: DateTime<Utc>) -> Self {
        Self {
            policy,
            attempts_made: 0,
            started_at,
        }
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Decide the next attempt given the current time.
    ///
    /// An attempt is not started when waiting for it would cross the ceiling.
    pub fn next<R: Rng>(&mut self, now: DateTime<Utc>, rng: &mut R) -> Decision {
        let number = self.attempts_made + 1;
        if number > self.policy.max_attempts {
            return Decision::GiveUp {
                reason: format!(
                    "max attempts reached: {}/{}",
                    self.attempts_made, self.policy.max_attempts
                ),
            };
        }

        let delay = self
            .policy
            .jittered(self.policy.delay_before(number), rng);
        let elapsed = (now - self.started_at).to_std().unwrap_or(Duration::ZERO);
        if elapsed.saturating_add(delay) > self.policy.max_elapsed {
            return Decision::GiveUp {
                reason: format!(
                    "backoff ceiling of {:?} reached after {:?} ({} attempts)",
                    self.policy.max_elapsed, elapsed, self.attempts_made
                ),
            };
        }

        self.attempts_made = number;
        Decision::Attempt { number, delay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(20),
            max_attempts: 5,
            max_elapsed: Duration::from_secs(600),
            jitter: false,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(4, 16)]
    #[case(5, 20)]
    #[case(40, 20)]
    fn delay_doubles_until_cap(#[case] attempt: u32, #[case] expected_secs: u64) {
        assert_eq!(policy().delay_before(attempt), Duration::from_secs(expected_secs));
    }

    #[test]
    fn delays_are_monotonic_non_decreasing() {
        let p = policy();
        let delays: Vec<_> = (1..=12).map(|n| p.delay_before(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        assert_eq!(policy().delay_before(u32::MAX), Duration::from_secs(20));
    }

    #[test]
    fn schedule_stops_at_max_attempts() {
        let mut schedule = RetrySchedule::new(policy(), t0());
        let mut rng = StdRng::seed_from_u64(7);

        let numbers: Vec<u32> = (0..5)
            .map(|_| match schedule.next(t0(), &mut rng) {
                Decision::Attempt { number, .. } => number,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

        match schedule.next(t0(), &mut rng) {
            Decision::GiveUp { reason } => assert!(reason.contains("5/5")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(schedule.attempts_made(), 5);
    }

    #[test]
    fn schedule_respects_the_ceiling() {
        let p = RetryPolicy {
            max_elapsed: Duration::from_secs(10),
            ..policy()
        };
        let mut schedule = RetrySchedule::new(p, t0());
        let mut rng = StdRng::seed_from_u64(7);

        // 2s + 4s fit in 10s; the third attempt would wait 8s more.
        let now = t0();
        assert!(matches!(schedule.next(now, &mut rng), Decision::Attempt { number: 1, .. }));
        let now = now + chrono::Duration::seconds(2);
        assert!(matches!(schedule.next(now, &mut rng), Decision::Attempt { number: 2, .. }));
        let now = now + chrono::Duration::seconds(4);
        match schedule.next(now, &mut rng) {
            Decision::GiveUp { reason } => assert!(reason.contains("ceiling")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(schedule.attempts_made(), 2);
    }

    #[test]
    fn jitter_stays_within_half_to_full_delay() {
        let p = RetryPolicy {
            jitter: true,
            ..policy()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 1..=5 {
            let full = p.delay_before(attempt);
            let d = p.jittered(full, &mut rng);
            assert!(d >= full / 2 && d <= full, "{d:?} outside [{:?}, {full:?}]", full / 2);
        }
    }

    #[test]
    fn jitter_disabled_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let d = Duration::from_millis(1234);
        assert_eq!(policy().jittered(d, &mut rng), d);
    }
}
