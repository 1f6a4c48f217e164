//! A development-only [`InvoiceClient`]. It mints invoices in-process and
//! settles them after a short, configurable delay instead of talking to a
//! real Lightning node. Wiring an actual node (gRPC to `lnd`, or an embedded
//! LDK node) is out of scope here — §1 treats the node as an external
//! collaborator reached through this trait — so this stand-in exists purely
//! to give the binary something concrete to run against.
//!
//! Do not point this at a deployment that takes real payments: no invoice
//! here is ever backed by funds moving anywhere.

use async_trait::async_trait;
use l402_challenger::AddInvoiceRequest;
use l402_challenger::InvoiceClient;
use l402_challenger::InvoiceState;
use l402_challenger::InvoiceUpdate;
use l402_common::L402Error;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::Digest;
use sha2::Sha256;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Inner {
    rows: Mutex<Vec<InvoiceUpdate>>,
    add_index: AtomicU64,
    settle_index: AtomicU64,
    live: Mutex<Vec<mpsc::Sender<InvoiceUpdate>>>,
}

#[derive(Clone)]
pub struct DevInvoiceClient {
    inner: Arc<Inner>,
    settle_after: Duration,
}

impl DevInvoiceClient {
    pub fn new(settle_after: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                rows: Mutex::new(Vec::new()),
                add_index: AtomicU64::new(0),
                settle_index: AtomicU64::new(0),
                live: Mutex::new(Vec::new()),
            }),
            settle_after,
        }
    }

    fn push_update(&self, update: InvoiceUpdate) {
        self.inner.rows.lock().push(update.clone());
        self.inner.live.lock().retain(|tx| tx.try_send(update.clone()).is_ok());
    }
}

#[async_trait]
impl InvoiceClient for DevInvoiceClient {
    async fn list_invoices(
        &self,
        index_offset: u64,
        limit: u64,
        reversed: bool,
    ) -> Result<Vec<InvoiceUpdate>, L402Error> {
        let rows = self.inner.rows.lock();
        let mut out: Vec<InvoiceUpdate> = if reversed {
            rows.iter().rev().cloned().collect()
        } else {
            rows.iter()
                .filter(|row| row.add_index >= index_offset)
                .cloned()
                .collect()
        };
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn add_invoice(&self, request: AddInvoiceRequest) -> Result<(String, [u8; 32]), L402Error> {
        let mut preimage = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut preimage);
        let payment_hash: [u8; 32] = Sha256::digest(preimage).into();
        let add_index = self.inner.add_index.fetch_add(1, Ordering::SeqCst) + 1;
        let payment_request = format!(
            "devinvoice:price={};hash={}",
            request.price_sats,
            hex::encode(payment_hash)
        );

        self.push_update(InvoiceUpdate {
            payment_hash: Some(payment_hash),
            state: InvoiceState::Open,
            created_at: 0,
            expiry_secs: 3600,
            add_index,
            settle_index: 0,
        });

        let inner = self.inner.clone();
        let settle_after = self.settle_after;
        tokio::spawn(async move {
            tokio::time::sleep(settle_after).await;
            let settle_index = inner.settle_index.fetch_add(1, Ordering::SeqCst) + 1;
            let update = InvoiceUpdate {
                payment_hash: Some(payment_hash),
                state: InvoiceState::Settled,
                created_at: 0,
                expiry_secs: 3600,
                add_index,
                settle_index,
            };
            inner.rows.lock().push(update.clone());
            inner.live.lock().retain(|tx| tx.try_send(update.clone()).is_ok());
        });

        Ok((payment_request, payment_hash))
    }

    async fn subscribe_invoices(
        &self,
        _add_index: u64,
        _settle_index: u64,
    ) -> Result<mpsc::Receiver<InvoiceUpdate>, L402Error> {
        let (tx, rx) = mpsc::channel(64);
        self.inner.live.lock().push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settles_after_the_configured_delay() {
        let client = DevInvoiceClient::new(Duration::from_millis(10));
        let (_, hash) = client
            .add_invoice(AddInvoiceRequest { price_sats: 10 })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let rows = client.list_invoices(0, 10, false).await.unwrap();
        assert!(rows
            .iter()
            .any(|row| row.payment_hash == Some(hash) && row.state == InvoiceState::Settled));
    }
}
