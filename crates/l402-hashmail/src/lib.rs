//! Hashmail relay (§4.7): a pub/sub-style byte-pipe service, pairing one
//! writer and one reader per stream with framing, write-rate limiting,
//! occupancy tracking, and a stale-session reaper. The byte-pipe / framing
//! / reaper core is transport-agnostic; `grpc` exposes it over `tonic`.

pub mod activity;
pub mod error;
pub mod framing;
pub mod grpc;
pub mod mailbox;
pub mod ratelimiter;
pub mod registry;

pub use activity::Activity;
pub use activity::ActivityTracker;
pub use error::HashmailError;
pub use grpc::HashmailService;
pub use mailbox::Mailbox;
pub use mailbox::MailboxConfig;
pub use mailbox::StreamId;
pub use ratelimiter::RateLimiter;
pub use registry::MailboxRegistry;
