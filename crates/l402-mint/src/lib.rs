//! Token mint / verifier (§4.3): mints L402 tokens bound to a fresh
//! Lightning invoice and verifies presented tokens against the secret
//! store and the caveat satisfier set.

pub mod macaroon;
pub mod mint;
pub mod token_id;

pub use macaroon::Macaroon;
pub use macaroon::MacaroonError;
pub use mint::Mint;
pub use mint::MintedToken;
pub use token_id::TokenId;
pub use token_id::TokenIdError;
pub use token_id::LATEST_VERSION;
