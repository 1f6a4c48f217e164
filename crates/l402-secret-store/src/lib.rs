//! Secret store (§4.2) and the generic transactional retry executor shared
//! by the secret/onion/session stores (§4.8).

pub mod diesel_store;
pub mod mem_store;
pub mod schema;
pub mod transaction;

pub use diesel_store::DieselLNCSessionStore;
pub use diesel_store::DieselOnionStore;
pub use diesel_store::DieselSecretStore;
pub use mem_store::MemLNCSessionStore;
pub use mem_store::MemOnionStore;
pub use mem_store::MemSecretStore;
pub use transaction::RetryConfig;
pub use transaction::StoreError;

use async_trait::async_trait;

/// A 32-byte root secret, keyed by `id_hash = sha256(token_id)`.
pub type Secret = [u8; 32];

/// Persistent map from `id_hash` to a random per-token secret. All
/// operations are idempotent with respect to repeated calls (§4.2).
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Generates 32 random bytes and stores them under `id_hash`.
    async fn new_secret(&self, id_hash: [u8; 32]) -> Result<Secret, StoreError>;

    /// Fetches the secret stored under `id_hash`.
    async fn get(&self, id_hash: [u8; 32]) -> Result<Option<Secret>, StoreError>;

    /// Idempotently deletes the secret stored under `id_hash`.
    async fn revoke(&self, id_hash: [u8; 32]) -> Result<(), StoreError>;
}

/// Persists the proxy's onion service private key, a singleton blob (at
/// most one row) so it survives restarts without the onion address
/// changing (§4.8).
#[async_trait]
pub trait OnionStore: Send + Sync {
    /// Fetches the stored private key, if one has been persisted yet.
    async fn get(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Upserts the private key, replacing any previously stored one.
    async fn put(&self, private_key: Vec<u8>) -> Result<(), StoreError>;
}

/// Persistent map from an LNC pairing phrase's entropy to its opaque
/// session blob (§4.8).
#[async_trait]
pub trait LNCSessionStore: Send + Sync {
    async fn put(&self, passphrase_entropy: Vec<u8>, session_data: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, passphrase_entropy: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    async fn delete(&self, passphrase_entropy: &[u8]) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mem_store_round_trips_and_revokes() {
        let store = MemSecretStore::default();
        let id_hash = [7u8; 32];

        let secret = store.new_secret(id_hash).await.unwrap();
        assert_eq!(store.get(id_hash).await.unwrap(), Some(secret));

        store.revoke(id_hash).await.unwrap();
        assert_eq!(store.get(id_hash).await.unwrap(), None);

        // revoke is idempotent
        store.revoke(id_hash).await.unwrap();
    }

    #[tokio::test]
    async fn get_of_unknown_hash_is_none() {
        let store = MemSecretStore::default();
        assert_eq!(store.get([1u8; 32]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn onion_store_put_replaces_the_singleton_row() {
        let store = MemOnionStore::default();
        assert_eq!(store.get().await.unwrap(), None);

        store.put(vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(vec![1, 2, 3]));

        store.put(vec![4, 5, 6]).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(vec![4, 5, 6]));
    }

    #[tokio::test]
    async fn lnc_session_store_round_trips_and_deletes() {
        let store = MemLNCSessionStore::default();
        let entropy = vec![9u8; 16];

        assert_eq!(store.get(&entropy).await.unwrap(), None);
        store.put(entropy.clone(), vec![0xAB; 8]).await.unwrap();
        assert_eq!(store.get(&entropy).await.unwrap(), Some(vec![0xAB; 8]));

        store.delete(&entropy).await.unwrap();
        assert_eq!(store.get(&entropy).await.unwrap(), None);
    }
}
