use crate::header::extract_credential;
use crate::header::HeaderLookup;
use l402_common::L402Error;
use l402_common::Service;
use l402_mint::Macaroon;
use l402_mint::Mint;

/// The two `Authorization` header values a fresh challenge is advertised
/// under, accepting either the legacy LSAT scheme or the current L402 one
/// (§4.5).
pub struct ChallengeHeaders {
    pub authorization: Vec<String>,
    pub payment_request: String,
}

/// Builds the challenge headers for a 402 response: mints a token bound to
/// a fresh invoice and renders it under both accepted scheme names.
pub async fn fresh_challenge(
    mint: &Mint,
    services: &[Service],
) -> Result<ChallengeHeaders, L402Error> {
    let minted = mint.mint(services).await?;
    let macaroon_b64 = base64::encode(minted.macaroon.encode());

    let authorization = vec![
        format!(
            "LSAT macaroon=\"{macaroon_b64}\", invoice=\"{}\"",
            minted.payment_request
        ),
        format!(
            "L402 macaroon=\"{macaroon_b64}\", invoice=\"{}\"",
            minted.payment_request
        ),
    ];

    Ok(ChallengeHeaders {
        authorization,
        payment_request: minted.payment_request,
    })
}

/// Parses a token and preimage out of any accepted header shape and asks
/// the mint to verify it. Any parse or verification failure collapses to
/// `false`; the caller never learns why, matching §4.5's no-leak rule.
pub async fn accept(headers: &dyn HeaderLookup, target_service: &str, mint: &Mint) -> bool {
    let Some(credential) = extract_credential(headers) else {
        return false;
    };
    let Ok(macaroon) = Macaroon::decode(&credential.macaroon_bytes) else {
        return false;
    };
    mint.verify(&macaroon, &credential.preimage, target_service)
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use l402_common::clock::FixedClock;
    use l402_common::service::FixedPrice;
    use l402_common::AuthLevel;
    use l402_common::ChallengeSource;
    use l402_common::Protocol;
    use l402_secret_store::MemSecretStore;
    use regex::Regex;
    use sha2::Digest;
    use sha2::Sha256;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FakeChallenger {
        payment_hash: [u8; 32],
    }

    #[async_trait]
    impl ChallengeSource for FakeChallenger {
        async fn new_challenge(&self, _price_sats: u64) -> Result<(String, [u8; 32]), L402Error> {
            Ok(("lnbc1...".to_string(), self.payment_hash))
        }
    }

    fn service(name: &str) -> Service {
        Service {
            name: name.to_string(),
            host_regex: Regex::new(".*").unwrap(),
            path_regex: None,
            address: "127.0.0.1:9000".to_string(),
            protocol: Protocol::Http,
            auth_level: AuthLevel::On,
            auth_whitelist_regex: None,
            capabilities: vec![],
            constraints: vec![],
            timeout: None,
            headers: vec![],
            rate_limits: vec![],
            price_source: Arc::new(FixedPrice(100)),
        }
    }

    fn header_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn fresh_challenge_then_accept_round_trips() {
        let preimage = [7u8; 32];
        let payment_hash: [u8; 32] = Sha256::digest(preimage).into();
        let clock = Arc::new(FixedClock::new(1000));
        let secret_store = Arc::new(MemSecretStore::default());
        let challenger = Arc::new(FakeChallenger { payment_hash });
        let mint = Mint::new(secret_store, challenger, clock);

        let services = vec![service("svc1")];
        let challenge = fresh_challenge(&mint, &services).await.unwrap();
        let lsat_value = challenge
            .authorization
            .iter()
            .find(|v| v.starts_with("LSAT"))
            .unwrap();

        let macaroon_b64 = lsat_value
            .split("macaroon=\"")
            .nth(1)
            .unwrap()
            .split('"')
            .next()
            .unwrap();
        let macaroon_bytes = base64::decode(macaroon_b64).unwrap();

        let authorization = format!(
            "L402 {}:{}",
            base64::encode(&macaroon_bytes),
            hex::encode(preimage)
        );
        let headers = header_map(&[("Authorization", &authorization)]);

        assert!(accept(&headers, "svc1", &mint).await);
    }

    #[tokio::test]
    async fn accept_rejects_missing_headers() {
        let clock = Arc::new(FixedClock::new(1000));
        let secret_store = Arc::new(MemSecretStore::default());
        let challenger = Arc::new(FakeChallenger {
            payment_hash: [0u8; 32],
        });
        let mint = Mint::new(secret_store, challenger, clock);

        let headers = header_map(&[]);
        assert!(!accept(&headers, "svc1", &mint).await);
    }
}
