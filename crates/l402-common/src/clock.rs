use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Injected time source so caveat evaluation and invoice-expiry checks can
/// be driven deterministically in tests (mirrors the `test-time` knob the
/// teacher threads through its DLC expiry checks).
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

#[derive(Default, Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs() as i64
    }
}

/// A clock that can be pinned to an arbitrary instant, used by satisfier and
/// challenger unit tests (S4 in the spec's scenario list).
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now_unix: i64) -> Self {
        Self(AtomicI64::new(now_unix))
    }

    pub fn set(&self, now_unix: i64) {
        self.0.store(now_unix, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
