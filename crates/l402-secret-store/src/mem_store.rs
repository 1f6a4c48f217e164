use crate::LNCSessionStore;
use crate::OnionStore;
use crate::Secret;
use crate::SecretStore;
use crate::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;

/// In-memory [`SecretStore`], used by tests and the local dev profile
/// where no Postgres instance is configured.
#[derive(Default)]
pub struct MemSecretStore {
    secrets: Mutex<HashMap<[u8; 32], Secret>>,
}

#[async_trait]
impl SecretStore for MemSecretStore {
    async fn new_secret(&self, id_hash: [u8; 32]) -> Result<Secret, StoreError> {
        let mut secrets = self.secrets.lock();
        if let Some(existing) = secrets.get(&id_hash) {
            return Ok(*existing);
        }
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        secrets.insert(id_hash, secret);
        Ok(secret)
    }

    async fn get(&self, id_hash: [u8; 32]) -> Result<Option<Secret>, StoreError> {
        Ok(self.secrets.lock().get(&id_hash).copied())
    }

    async fn revoke(&self, id_hash: [u8; 32]) -> Result<(), StoreError> {
        self.secrets.lock().remove(&id_hash);
        Ok(())
    }
}

/// In-memory [`OnionStore`], used by tests and the local dev profile.
#[derive(Default)]
pub struct MemOnionStore {
    private_key: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl OnionStore for MemOnionStore {
    async fn get(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.private_key.lock().clone())
    }

    async fn put(&self, private_key: Vec<u8>) -> Result<(), StoreError> {
        *self.private_key.lock() = Some(private_key);
        Ok(())
    }
}

/// In-memory [`LNCSessionStore`], used by tests and the local dev profile.
#[derive(Default)]
pub struct MemLNCSessionStore {
    sessions: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

#[async_trait]
impl LNCSessionStore for MemLNCSessionStore {
    async fn put(&self, passphrase_entropy: Vec<u8>, session_data: Vec<u8>) -> Result<(), StoreError> {
        self.sessions.lock().insert(passphrase_entropy, session_data);
        Ok(())
    }

    async fn get(&self, passphrase_entropy: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.sessions.lock().get(passphrase_entropy).cloned())
    }

    async fn delete(&self, passphrase_entropy: &[u8]) -> Result<(), StoreError> {
        self.sessions.lock().remove(passphrase_entropy);
        Ok(())
    }
}
