use parking_lot::Mutex;
use std::time::Duration;
use std::time::Instant;

struct State {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket gating writes onto a mailbox's write half: one token per
/// `rate`, capped at `burst` (§4.7's `SendStream` contract — "consume one
/// token from the rate limiter, may block").
pub struct RateLimiter {
    refill_per_sec: f64,
    burst: f64,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(rate: Duration, burst: u32) -> Self {
        let refill_per_sec = 1.0 / rate.as_secs_f64().max(f64::MIN_POSITIVE);
        Self {
            refill_per_sec,
            burst: burst.max(1) as f64,
            state: Mutex::new(State {
                tokens: burst.max(1) as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Waits until a token is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.burst);
                state.last_refill = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };
            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_allows_immediate_admissions_up_to_capacity() {
        let limiter = RateLimiter::new(Duration::from_millis(50), 3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn exceeding_burst_blocks_until_refill() {
        let limiter = RateLimiter::new(Duration::from_millis(50), 1);
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
