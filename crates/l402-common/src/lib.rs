//! Shared types and the error taxonomy used across the l402 proxy crates.

pub mod clock;
pub mod error;
pub mod service;

pub use clock::Clock;
pub use clock::SystemClock;
pub use error::L402Error;
pub use service::AuthLevel;
pub use service::Protocol;
pub use service::RateLimitRule;
pub use service::Service;

use async_trait::async_trait;

/// The seam the mint uses to obtain a fresh Lightning invoice. Implemented
/// by `l402-challenger::Challenger`; kept here (rather than in
/// `l402-mint`) so neither crate has to depend on the other's concrete
/// type.
#[async_trait]
pub trait ChallengeSource: Send + Sync {
    /// Requests a new invoice for `price_sats` and returns
    /// `(payment_request, payment_hash)`. Does not mutate any invoice
    /// state; §4.4 calls this a synchronous pass-through to the Lightning
    /// client.
    async fn new_challenge(&self, price_sats: u64) -> Result<(String, [u8; 32]), L402Error>;
}
