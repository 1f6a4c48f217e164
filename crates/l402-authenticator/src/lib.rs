//! Authenticator (§4.5): parses credentials off the wire and decides
//! accept/reject, and renders fresh-challenge headers when minting a new
//! token.

mod authenticator;
mod header;

pub use authenticator::accept;
pub use authenticator::fresh_challenge;
pub use authenticator::ChallengeHeaders;
pub use header::extract_credential;
pub use header::Credential;
pub use header::HeaderLookup;
