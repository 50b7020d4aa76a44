//! Backoff - broker / store が落ちている間の待ち時間

use std::time::Duration;

/// Exponential backoff with a ceiling.
///
/// delay = base * multiplier^(failures - 1), capped at `max`.
///
/// base=100ms, multiplier=2.0, max=5s の場合:
/// - 1 回目: 100ms
/// - 2 回目: 200ms
/// - 3 回目: 400ms
/// - 7 回目以降: 5s
#[derive(Debug, Clone)]
pub struct Backoff {
    pub base: Duration,
    multiplier: f64,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            multiplier: 2.0,
            max,
        }
    }

    /// Delay after `failures` consecutive failures (1-indexed; 0 is treated as 1).
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exp);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        // base が 0 のときも from_secs_f64 に負値を渡さない
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(5))
    }
}
