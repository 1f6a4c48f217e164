use diesel::connection::Connection;
use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::result::DatabaseErrorKind;
use diesel::result::Error as DieselError;
use diesel::PgConnection;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

/// `{num_retries, retry_delay}` from §9's configuration-record list.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub num_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            num_retries: 10,
            retry_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("could not obtain a pooled connection: {0}")]
    Pool(String),
    #[error("retries exceeded")]
    RetriesExceeded,
    #[error("store error: {0}")]
    Db(String),
}

/// Runs `body` inside a `Serializable` transaction, retrying on
/// `SerializationFailure` with a uniform random backoff in
/// `[0, retry_delay)`, up to `cfg.num_retries` times (§4.8). Shared by the
/// secret, onion and LNC-session stores so they don't each reimplement the
/// retry loop.
pub fn with_retry<T>(
    pool: &Pool<ConnectionManager<PgConnection>>,
    cfg: &RetryConfig,
    mut body: impl FnMut(&mut PgConnection) -> Result<T, DieselError>,
) -> Result<T, StoreError> {
    let mut attempt = 0u32;
    loop {
        let mut conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;

        let result = conn.build_transaction().serializable().run(|conn| body(conn));

        match result {
            Ok(value) => return Ok(value),
            Err(DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _)) => {
                attempt += 1;
                if attempt > cfg.num_retries {
                    return Err(StoreError::RetriesExceeded);
                }
                let jitter = rand::thread_rng().gen_range(0..cfg.retry_delay.as_millis().max(1) as u64);
                std::thread::sleep(Duration::from_millis(jitter));
                tracing::debug!(attempt, "retrying transaction after serialization conflict");
            }
            Err(e) => return Err(StoreError::Db(e.to_string())),
        }
    }
}
