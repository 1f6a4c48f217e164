use crate::schema::lnc_sessions;
use crate::schema::onion_keys;
use crate::schema::secrets;
use crate::transaction::with_retry;
use crate::LNCSessionStore;
use crate::OnionStore;
use crate::RetryConfig;
use crate::Secret;
use crate::SecretStore;
use crate::StoreError;
use async_trait::async_trait;
use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::ExpressionMethods;
use diesel::OptionalExtension;
use diesel::PgConnection;
use diesel::QueryDsl;
use diesel::RunQueryDsl;
use rand::RngCore;
use time::OffsetDateTime;

/// The onion private key table holds at most one row, always under this id.
const ONION_KEY_ROW: i16 = 1;

/// Postgres-backed [`SecretStore`], grounded on the teacher's
/// `db::dlc_channels` diesel idiom (r2d2 pool, explicit filter/update
/// calls per operation).
pub struct DieselSecretStore {
    pool: Pool<ConnectionManager<PgConnection>>,
    retry: RetryConfig,
}

impl DieselSecretStore {
    pub fn new(pool: Pool<ConnectionManager<PgConnection>>, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl SecretStore for DieselSecretStore {
    async fn new_secret(&self, id_hash: [u8; 32]) -> Result<Secret, StoreError> {
        let pool = self.pool.clone();
        let retry = self.retry;
        tokio::task::spawn_blocking(move || {
            let mut fresh = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut fresh);

            let stored: Vec<u8> = with_retry(&pool, &retry, |conn| {
                diesel::insert_into(secrets::table)
                    .values((
                        secrets::id_hash.eq(id_hash.to_vec()),
                        secrets::secret.eq(fresh.to_vec()),
                        secrets::created_at.eq(OffsetDateTime::now_utc()),
                    ))
                    .on_conflict(secrets::id_hash)
                    .do_nothing()
                    .execute(conn)?;

                secrets::table
                    .filter(secrets::id_hash.eq(id_hash.to_vec()))
                    .select(secrets::secret)
                    .first(conn)
            })?;

            stored
                .try_into()
                .map_err(|_| StoreError::Db("stored secret was not 32 bytes".into()))
        })
        .await
        .map_err(|e| StoreError::Db(e.to_string()))?
    }

    async fn get(&self, id_hash: [u8; 32]) -> Result<Option<Secret>, StoreError> {
        let pool = self.pool.clone();
        let retry = self.retry;
        tokio::task::spawn_blocking(move || {
            let row: Option<Vec<u8>> = with_retry(&pool, &retry, |conn| {
                secrets::table
                    .filter(secrets::id_hash.eq(id_hash.to_vec()))
                    .select(secrets::secret)
                    .first(conn)
                    .optional()
            })?;

            match row {
                None => Ok(None),
                Some(bytes) => {
                    let secret: Secret = bytes
                        .try_into()
                        .map_err(|_| StoreError::Db("stored secret was not 32 bytes".into()))?;
                    Ok(Some(secret))
                }
            }
        })
        .await
        .map_err(|e| StoreError::Db(e.to_string()))?
    }

    async fn revoke(&self, id_hash: [u8; 32]) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let retry = self.retry;
        tokio::task::spawn_blocking(move || {
            with_retry(&pool, &retry, |conn| {
                diesel::delete(secrets::table.filter(secrets::id_hash.eq(id_hash.to_vec())))
                    .execute(conn)
            })?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Db(e.to_string()))?
    }
}

/// Postgres-backed [`OnionStore`]; the table carries at most one row, kept
/// under a fixed id and upserted in place.
pub struct DieselOnionStore {
    pool: Pool<ConnectionManager<PgConnection>>,
    retry: RetryConfig,
}

impl DieselOnionStore {
    pub fn new(pool: Pool<ConnectionManager<PgConnection>>, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl OnionStore for DieselOnionStore {
    async fn get(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let pool = self.pool.clone();
        let retry = self.retry;
        tokio::task::spawn_blocking(move || {
            with_retry(&pool, &retry, |conn| {
                onion_keys::table
                    .filter(onion_keys::id.eq(ONION_KEY_ROW))
                    .select(onion_keys::private_key)
                    .first(conn)
                    .optional()
            })
        })
        .await
        .map_err(|e| StoreError::Db(e.to_string()))?
    }

    async fn put(&self, private_key: Vec<u8>) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let retry = self.retry;
        tokio::task::spawn_blocking(move || {
            with_retry(&pool, &retry, |conn| {
                diesel::insert_into(onion_keys::table)
                    .values((
                        onion_keys::id.eq(ONION_KEY_ROW),
                        onion_keys::private_key.eq(private_key.clone()),
                    ))
                    .on_conflict(onion_keys::id)
                    .do_update()
                    .set(onion_keys::private_key.eq(private_key.clone()))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
        .map_err(|e| StoreError::Db(e.to_string()))?
    }
}

/// Postgres-backed [`LNCSessionStore`], one row per pairing-phrase entropy.
pub struct DieselLNCSessionStore {
    pool: Pool<ConnectionManager<PgConnection>>,
    retry: RetryConfig,
}

impl DieselLNCSessionStore {
    pub fn new(pool: Pool<ConnectionManager<PgConnection>>, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl LNCSessionStore for DieselLNCSessionStore {
    async fn put(&self, passphrase_entropy: Vec<u8>, session_data: Vec<u8>) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let retry = self.retry;
        tokio::task::spawn_blocking(move || {
            with_retry(&pool, &retry, |conn| {
                diesel::insert_into(lnc_sessions::table)
                    .values((
                        lnc_sessions::passphrase_entropy.eq(passphrase_entropy.clone()),
                        lnc_sessions::session_data.eq(session_data.clone()),
                        lnc_sessions::created_at.eq(OffsetDateTime::now_utc()),
                    ))
                    .on_conflict(lnc_sessions::passphrase_entropy)
                    .do_update()
                    .set(lnc_sessions::session_data.eq(session_data.clone()))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
        .map_err(|e| StoreError::Db(e.to_string()))?
    }

    async fn get(&self, passphrase_entropy: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let pool = self.pool.clone();
        let retry = self.retry;
        let key = passphrase_entropy.to_vec();
        tokio::task::spawn_blocking(move || {
            with_retry(&pool, &retry, |conn| {
                lnc_sessions::table
                    .filter(lnc_sessions::passphrase_entropy.eq(key.clone()))
                    .select(lnc_sessions::session_data)
                    .first(conn)
                    .optional()
            })
        })
        .await
        .map_err(|e| StoreError::Db(e.to_string()))?
    }

    async fn delete(&self, passphrase_entropy: &[u8]) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let retry = self.retry;
        let key = passphrase_entropy.to_vec();
        tokio::task::spawn_blocking(move || {
            with_retry(&pool, &retry, |conn| {
                diesel::delete(lnc_sessions::table.filter(lnc_sessions::passphrase_entropy.eq(key.clone())))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
        .map_err(|e| StoreError::Db(e.to_string()))?
    }
}
