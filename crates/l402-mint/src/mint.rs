use crate::macaroon::Macaroon;
use crate::macaroon::MacaroonError;
use crate::token_id::TokenId;
use l402_caveats::verify as verify_caveats;
use l402_caveats::Caveat;
use l402_caveats::SatisfierSet;
use l402_common::service::PriceContext;
use l402_common::ChallengeSource;
use l402_common::Clock;
use l402_common::L402Error;
use l402_common::Service;
use l402_secret_store::SecretStore;
use l402_secret_store::StoreError;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;
use std::sync::Arc;

/// Every service caveat minted by this build is pinned to tier 0: the
/// spec's `name:tier` format is kept (so future deployments may introduce
/// real tiering) but nothing in §3/§4.3 requires more than a single tier
/// today.
const DEFAULT_TIER: u64 = 0;

pub struct MintedToken {
    pub macaroon: Macaroon,
    pub payment_request: String,
}

/// Mints and verifies L402 tokens (§4.3).
pub struct Mint {
    secret_store: Arc<dyn SecretStore>,
    challenger: Arc<dyn ChallengeSource>,
    clock: Arc<dyn Clock>,
}

impl Mint {
    pub fn new(
        secret_store: Arc<dyn SecretStore>,
        challenger: Arc<dyn ChallengeSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secret_store,
            challenger,
            clock,
        }
    }

    pub async fn mint(&self, services: &[Service]) -> Result<MintedToken, L402Error> {
        let price = services
            .iter()
            .map(|s| {
                s.price_source.price_sats(&PriceContext {
                    service: &s.name,
                    path: "",
                })
            })
            .max()
            .unwrap_or(0);

        let (payment_request, payment_hash) = self.challenger.new_challenge(price).await?;

        let mut token_id_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut token_id_bytes);
        let id = TokenId::new(payment_hash, token_id_bytes);
        let encoded_id = id.encode();
        let id_hash: [u8; 32] = Sha256::digest(&encoded_id).into();

        let secret = match self.secret_store.new_secret(id_hash).await {
            Ok(secret) => secret,
            Err(err) => {
                tracing::error!(%err, "failed to allocate secret for new token");
                return Err(L402Error::RetriesExceeded);
            }
        };

        let mut macaroon = Macaroon::create(&secret, encoded_id);

        let services_value = services
            .iter()
            .map(|s| format!("{}:{DEFAULT_TIER}", s.name))
            .collect::<Vec<_>>()
            .join(",");
        macaroon.add_first_party_caveat(&secret, Caveat::new("services", services_value));

        for service in services {
            if !service.capabilities.is_empty() {
                macaroon.add_first_party_caveat(
                    &secret,
                    Caveat::new(
                        format!("{}_capabilities", service.name),
                        service.capabilities.join(","),
                    ),
                );
            }
            if let Some(timeout) = service.timeout {
                let expiry = self.clock.now_unix() + timeout.as_secs() as i64;
                macaroon.add_first_party_caveat(
                    &secret,
                    Caveat::new(format!("{}_timeout", service.name), expiry.to_string()),
                );
            }
            for (key, value) in &service.constraints {
                macaroon.add_first_party_caveat(
                    &secret,
                    Caveat::new(format!("{}_{key}", service.name), value.clone()),
                );
            }
        }

        Ok(MintedToken {
            macaroon,
            payment_request,
        })
    }

    pub async fn verify(
        &self,
        macaroon: &Macaroon,
        preimage: &[u8; 32],
        target_service: &str,
    ) -> Result<(), L402Error> {
        let id = TokenId::decode(&macaroon.id)
            .map_err(|e| L402Error::Invalid(format!("malformed token id: {e}")))?;

        let computed_hash: [u8; 32] = Sha256::digest(preimage).into();
        if computed_hash != id.payment_hash {
            return Err(L402Error::InvalidPreimage);
        }

        let id_hash: [u8; 32] = Sha256::digest(&macaroon.id).into();
        let secret = match self.secret_store.get(id_hash).await {
            Ok(Some(secret)) => secret,
            Ok(None) => return Err(L402Error::SecretNotFound),
            Err(StoreError::RetriesExceeded) => return Err(L402Error::RetriesExceeded),
            Err(err) => {
                tracing::error!(%err, "secret store lookup failed");
                return Err(L402Error::SecretNotFound);
            }
        };

        match macaroon.verify_signature(&secret) {
            Ok(()) => {}
            Err(MacaroonError::SignatureMismatch) => return Err(L402Error::SignatureMismatch),
            Err(MacaroonError::Malformed) => {
                return Err(L402Error::Invalid("malformed macaroon".to_string()))
            }
        }

        let satisfiers = SatisfierSet::for_service(target_service, self.clock.clone());
        verify_caveats(&macaroon.caveats, &satisfiers).map_err(L402Error::NotAuthorized)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use l402_common::clock::FixedClock;
    use l402_common::service::FixedPrice;
    use l402_secret_store::MemSecretStore;
    use regex::Regex;
    use std::time::Duration;

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
            protocol: l402_common::Protocol::Http,
            auth_level: l402_common::AuthLevel::On,
            auth_whitelist_regex: None,
            capabilities: vec!["read".to_string()],
            constraints: vec![],
            timeout: Some(Duration::from_secs(500)),
            headers: vec![],
            rate_limits: vec![],
            price_source: Arc::new(FixedPrice(500)),
        }
    }

    #[tokio::test]
    async fn mint_then_verify_happy_path() {
        let preimage = [7u8; 32];
        let payment_hash: [u8; 32] = Sha256::digest(preimage).into();

        let clock = Arc::new(FixedClock::new(1000));
        let secret_store = Arc::new(MemSecretStore::default());
        let challenger = Arc::new(FakeChallenger { payment_hash });
        let mint = Mint::new(secret_store, challenger, clock);

        let services = vec![service("svc1")];
        let minted = mint.mint(&services).await.unwrap();

        mint.verify(&minted.macaroon, &preimage, "svc1").await.unwrap();
    }

    #[tokio::test]
    async fn verify_rejects_wrong_preimage() {
        let preimage = [7u8; 32];
        let payment_hash: [u8; 32] = Sha256::digest(preimage).into();

        let clock = Arc::new(FixedClock::new(1000));
        let secret_store = Arc::new(MemSecretStore::default());
        let challenger = Arc::new(FakeChallenger { payment_hash });
        let mint = Mint::new(secret_store, challenger, clock);

        let services = vec![service("svc1")];
        let minted = mint.mint(&services).await.unwrap();

        let wrong_preimage = [8u8; 32];
        let err = mint
            .verify(&minted.macaroon, &wrong_preimage, "svc1")
            .await
            .unwrap_err();
        assert_eq!(err, L402Error::InvalidPreimage);
    }

    #[tokio::test]
    async fn verify_rejects_revoked_token() {
        let preimage = [7u8; 32];
        let payment_hash: [u8; 32] = Sha256::digest(preimage).into();

        let clock = Arc::new(FixedClock::new(1000));
        let secret_store = Arc::new(MemSecretStore::default());
        let challenger = Arc::new(FakeChallenger { payment_hash });
        let mint = Mint::new(secret_store.clone(), challenger, clock);

        let services = vec![service("svc1")];
        let minted = mint.mint(&services).await.unwrap();

        let id_hash: [u8; 32] = Sha256::digest(&minted.macaroon.id).into();
        secret_store.revoke(id_hash).await.unwrap();

        let err = mint
            .verify(&minted.macaroon, &preimage, "svc1")
            .await
            .unwrap_err();
        assert_eq!(err, L402Error::SecretNotFound);
    }

    #[tokio::test]
    async fn verify_rejects_tampered_signature() {
        let preimage = [7u8; 32];
        let payment_hash: [u8; 32] = Sha256::digest(preimage).into();

        let clock = Arc::new(FixedClock::new(1000));
        let secret_store = Arc::new(MemSecretStore::default());
        let challenger = Arc::new(FakeChallenger { payment_hash });
        let mint = Mint::new(secret_store, challenger, clock);

        let services = vec![service("svc1")];
        let minted = mint.mint(&services).await.unwrap();

        let mut tampered = minted.macaroon.encode();
        *tampered.last_mut().unwrap() ^= 0xff;
        let tampered = crate::macaroon::Macaroon::decode(&tampered).unwrap();

        let err = mint.verify(&tampered, &preimage, "svc1").await.unwrap_err();
        assert_eq!(err, L402Error::SignatureMismatch);
    }

    #[tokio::test]
    async fn verify_rejects_expired_timeout_caveat() {
        let preimage = [7u8; 32];
        let payment_hash: [u8; 32] = Sha256::digest(preimage).into();

        let clock = Arc::new(FixedClock::new(1000));
        let secret_store = Arc::new(MemSecretStore::default());
        let challenger = Arc::new(FakeChallenger { payment_hash });
        let mint = Mint::new(secret_store, challenger, clock.clone());

        let services = vec![service("svc1")];
        let minted = mint.mint(&services).await.unwrap();

        mint.verify(&minted.macaroon, &preimage, "svc1").await.unwrap();

        clock.set(1000 + 501);
        let err = mint
            .verify(&minted.macaroon, &preimage, "svc1")
            .await
            .unwrap_err();
        assert!(matches!(err, L402Error::NotAuthorized(_)));
    }
}
