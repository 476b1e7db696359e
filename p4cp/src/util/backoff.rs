//! Exponential reconnect backoff with jitter.

use std::time::Duration;

/// Delay policy for reconnect attempts: exponential growth from `base` to
/// `cap`, plus up to 25% jitter so a fleet of switches does not reconnect in
/// lockstep. `reset` is called after a healthy run.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
    jitter: bool,
    rng_state: u64,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Backoff {
            base,
            cap,
            attempt: 0,
            jitter: true,
            rng_state: 0x9e37_79b9_7f4a_7c15,
        }
    }

    /// Disable jitter; the delay sequence becomes deterministic.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        let delay = self
            .base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.cap)
            .min(self.cap);

        if !self.jitter {
            return delay;
        }

        // xorshift64; the low bits select a jitter fraction in [0, 25%).
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        let fraction = (self.rng_state % 250) as u32; // per-mille

        delay + delay.mul_f64(fraction as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_to_cap() {
        let mut backoff =
            Backoff::new(Duration::from_millis(100), Duration::from_secs(15)).without_jitter();

        let mut last = Duration::ZERO;
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= last, "delay must be non-decreasing");
            assert!(delay <= Duration::from_secs(15));
            last = delay;
        }
        assert_eq!(last, Duration::from_secs(15));
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff =
            Backoff::new(Duration::from_millis(100), Duration::from_secs(15)).without_jitter();
        let first = backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), first);
    }

    #[test]
    fn jitter_bounded() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(15));
        for _ in 0..50 {
            let exp = backoff.attempt().min(16);
            let nominal =
                (Duration::from_millis(100) * (1 << exp)).min(Duration::from_secs(15));
            let delay = backoff.next_delay();
            assert!(delay >= nominal);
            assert!(delay <= nominal + nominal.mul_f64(0.25));
        }
    }
}
