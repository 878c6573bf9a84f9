use std::fmt::Display;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// `initial_delay * 2^attempt`, no jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(1000))
    }
}

pub fn retry<T, E, F>(policy: &RetryPolicy, op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
{
    retry_with_sleeper(policy, thread::sleep, op)
}

/// Runs `op` until it succeeds or `max_retries` extra attempts have failed,
/// then returns the last error unchanged. `op` receives the zero-based
/// attempt number.
pub fn retry_with_sleeper<T, E, F, S>(policy: &RetryPolicy, mut sleep: S, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
    S: FnMut(Duration),
{
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_retries => return Err(err),
            Err(err) => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "attempt {}/{} failed: {err}; retrying in {}ms",
                    attempt + 1,
                    policy.max_retries + 1,
                    delay.as_millis()
                );
                sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{retry, retry_with_sleeper, RetryPolicy};

    #[test]
    fn always_failing_op_runs_three_times_with_doubling_delays() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1000));
        let mut calls = 0;
        let mut delays = Vec::new();
        let result: Result<(), String> = retry_with_sleeper(
            &policy,
            |delay| delays.push(delay),
            |attempt| {
                calls += 1;
                Err(format!("failure {attempt}"))
            },
        );
        assert_eq!(calls, 3);
        assert_eq!(
            delays,
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
        assert_eq!(result, Err("failure 2".to_string()));
    }

    #[test]
    fn success_stops_retrying() {
        let policy = RetryPolicy::default();
        let mut delays = Vec::new();
        let result: Result<u32, String> = retry_with_sleeper(
            &policy,
            |delay| delays.push(delay),
            |attempt| {
                if attempt == 0 {
                    Err("transient".to_string())
                } else {
                    Ok(attempt)
                }
            },
        );
        assert_eq!(result, Ok(1));
        assert_eq!(delays, vec![Duration::from_millis(1000)]);
    }

    #[test]
    fn zero_retries_runs_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(5));
        let mut calls = 0;
        let result: Result<(), &str> = retry(&policy, |_| {
            calls += 1;
            Err("nope")
        });
        assert_eq!(calls, 1);
        assert_eq!(result, Err("nope"));
    }

    #[test]
    fn real_sleep_waits_between_attempts() {
        let policy = RetryPolicy::new(1, Duration::from_millis(20));
        let started = std::time::Instant::now();
        let _: Result<(), &str> = retry(&policy, |_| Err("nope"));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy::new(5, Duration::from_millis(250));
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }
}
