use crate::invoice_client::AddInvoiceRequest;
use crate::invoice_client::InvoiceClient;
use crate::invoice_client::InvoiceState;
use crate::invoice_client::InvoiceUpdate;
use crate::state::InvoiceStateMap;
use async_trait::async_trait;
use l402_common::ChallengeSource;
use l402_common::Clock;
use l402_common::L402Error;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct ChallengerConfig {
    /// Page size used by the historical loader when paging forward through
    /// the invoice database (§4.4).
    pub batch_size: u64,
    /// How long `verify_invoice_status` will wait for the historical load
    /// to complete before giving up, separately from its own timeout.
    pub initial_load_timeout: Duration,
}

impl Default for ChallengerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            initial_load_timeout: Duration::from_secs(30),
        }
    }
}

/// Tracks Lightning invoice state on behalf of the mint (§4.4): mints fresh
/// invoices on demand, and maintains a live view of every outstanding
/// invoice's state by combining a one-time historical load with a
/// long-lived subscription.
pub struct Challenger {
    client: Arc<dyn InvoiceClient>,
    clock: Arc<dyn Clock>,
    state: Arc<InvoiceStateMap>,
    initial_load_complete: Arc<AtomicBool>,
    initial_load_timeout: Duration,
    notify: Arc<Notify>,
    quit: CancellationToken,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Challenger {
    /// Spawns the historical loader and the subscription task, returning
    /// the challenger plus a channel that receives fatal errors from either
    /// background task (a closed node connection, for instance).
    pub fn new(
        client: Arc<dyn InvoiceClient>,
        clock: Arc<dyn Clock>,
        config: ChallengerConfig,
    ) -> (Arc<Self>, tokio::sync::mpsc::Receiver<L402Error>) {
        let (fatal_tx, fatal_rx) = tokio::sync::mpsc::channel(16);
        let (indices_tx, indices_rx) = tokio::sync::oneshot::channel();

        let state = Arc::new(InvoiceStateMap::new());
        let initial_load_complete = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let quit = CancellationToken::new();

        let historical = tokio::spawn(historical_loader(
            client.clone(),
            clock.clone(),
            state.clone(),
            initial_load_complete.clone(),
            notify.clone(),
            quit.clone(),
            fatal_tx.clone(),
            config.batch_size,
            indices_tx,
        ));

        let subscription = tokio::spawn(subscription_loop(
            client.clone(),
            clock.clone(),
            state.clone(),
            notify.clone(),
            quit.clone(),
            fatal_tx,
            indices_rx,
        ));

        let this = Arc::new(Self {
            client,
            clock,
            state,
            initial_load_complete,
            initial_load_timeout: config.initial_load_timeout,
            notify,
            quit,
            tasks: tokio::sync::Mutex::new(vec![historical, subscription]),
        });

        (this, fatal_rx)
    }

    /// Blocks until `payment_hash` reaches `target`, or fails after
    /// `timeout` if it does not, or the invoice is unknown, or the
    /// challenger is shutting down (§4.4).
    pub async fn verify_invoice_status(
        &self,
        payment_hash: [u8; 32],
        target: InvoiceState,
        timeout: Duration,
    ) -> Result<(), L402Error> {
        self.wait_initial_load().await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.quit.is_cancelled() {
                return Err(L402Error::ShuttingDown);
            }
            if let Some(entry) = self.state.get(&payment_hash) {
                if entry.state == target {
                    return Ok(());
                }
            }

            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    return match self.state.get(&payment_hash) {
                        None => Err(L402Error::Invalid(
                            "no invoice found for payment hash".to_string(),
                        )),
                        Some(entry) if entry.state == target => Ok(()),
                        Some(_) => Err(L402Error::Invalid(
                            "invoice did not reach the target state before the deadline".to_string(),
                        )),
                    };
                }
                _ = self.quit.cancelled() => return Err(L402Error::ShuttingDown),
            }
        }
    }

    async fn wait_initial_load(&self) -> Result<(), L402Error> {
        if self.initial_load_complete.load(Ordering::SeqCst) {
            return Ok(());
        }
        let deadline = tokio::time::Instant::now() + self.initial_load_timeout;
        loop {
            let notified = self.notify.notified();
            if self.initial_load_complete.load(Ordering::SeqCst) {
                return Ok(());
            }
            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    return if self.initial_load_complete.load(Ordering::SeqCst) {
                        Ok(())
                    } else {
                        Err(L402Error::Invalid(
                            "historical invoice load did not complete before the deadline".to_string(),
                        ))
                    };
                }
                _ = self.quit.cancelled() => return Err(L402Error::ShuttingDown),
            }
        }
    }

    /// Signals both background tasks to stop and waits for them to exit.
    pub async fn stop(&self) {
        self.quit.cancel();
        self.notify.notify_waiters();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }
}

#[async_trait]
impl ChallengeSource for Challenger {
    async fn new_challenge(&self, price_sats: u64) -> Result<(String, [u8; 32]), L402Error> {
        self.client
            .add_invoice(AddInvoiceRequest { price_sats })
            .await
    }
}

#[allow(clippy::too_many_arguments)]
async fn historical_loader(
    client: Arc<dyn InvoiceClient>,
    clock: Arc<dyn Clock>,
    state: Arc<InvoiceStateMap>,
    initial_load_complete: Arc<AtomicBool>,
    notify: Arc<Notify>,
    quit: CancellationToken,
    fatal_tx: tokio::sync::mpsc::Sender<L402Error>,
    batch_size: u64,
    indices_tx: tokio::sync::oneshot::Sender<(u64, u64)>,
) {
    let discovered = client.list_invoices(0, 1, true).await;
    let (final_add_index, final_settle_index) = match discovered {
        Ok(rows) => rows
            .first()
            .map(|row| (row.add_index, row.settle_index))
            .unwrap_or((0, 0)),
        Err(err) => {
            tracing::error!(%err, "historical loader failed to discover invoice indices");
            let _ = fatal_tx.send(err).await;
            initial_load_complete.store(true, Ordering::SeqCst);
            notify.notify_waiters();
            let _ = indices_tx.send((0, 0));
            return;
        }
    };

    let mut offset = 0u64;
    loop {
        if quit.is_cancelled() {
            break;
        }
        match client.list_invoices(offset, batch_size, false).await {
            Ok(batch) => {
                if batch.is_empty() {
                    break;
                }
                let len = batch.len() as u64;
                for row in &batch {
                    state.apply(row, clock.as_ref());
                }
                notify.notify_waiters();
                offset += len;
                if len < batch_size {
                    break;
                }
            }
            Err(err) => {
                tracing::error!(%err, "historical loader page fetch failed");
                if !quit.is_cancelled() {
                    let _ = fatal_tx.send(err).await;
                }
                break;
            }
        }
    }

    initial_load_complete.store(true, Ordering::SeqCst);
    notify.notify_waiters();
    let _ = indices_tx.send((final_add_index, final_settle_index));
}

async fn subscription_loop(
    client: Arc<dyn InvoiceClient>,
    clock: Arc<dyn Clock>,
    state: Arc<InvoiceStateMap>,
    notify: Arc<Notify>,
    quit: CancellationToken,
    fatal_tx: tokio::sync::mpsc::Sender<L402Error>,
    indices_rx: tokio::sync::oneshot::Receiver<(u64, u64)>,
) {
    let (add_index, settle_index) = tokio::select! {
        result = indices_rx => match result {
            Ok(indices) => indices,
            Err(_) => return,
        },
        _ = quit.cancelled() => return,
    };

    let mut receiver = tokio::select! {
        result = client.subscribe_invoices(add_index, settle_index) => match result {
            Ok(rx) => rx,
            Err(err) => {
                tracing::error!(%err, "failed to open invoice subscription");
                let _ = fatal_tx.send(err).await;
                return;
            }
        },
        _ = quit.cancelled() => return,
    };

    loop {
        tokio::select! {
            update = receiver.recv() => match update {
                Some(update) => {
                    state.apply(&update, clock.as_ref());
                    notify.notify_waiters();
                }
                None => {
                    if !quit.is_cancelled() {
                        tracing::warn!("invoice subscription closed unexpectedly");
                        let _ = fatal_tx
                            .send(L402Error::BackendUnavailable(
                                "invoice subscription closed".to_string(),
                            ))
                            .await;
                    }
                    break;
                }
            },
            _ = quit.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice_client::InvoiceUpdate;
    use l402_common::clock::FixedClock;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;

    struct FakeInvoiceClient {
        historical: Vec<InvoiceUpdate>,
        live: SyncMutex<Option<VecDeque<InvoiceUpdate>>>,
    }

    #[async_trait]
    impl InvoiceClient for FakeInvoiceClient {
        async fn list_invoices(
            &self,
            index_offset: u64,
            limit: u64,
            reversed: bool,
        ) -> Result<Vec<InvoiceUpdate>, L402Error> {
            if reversed {
                return Ok(self
                    .historical
                    .last()
                    .cloned()
                    .map(|row| vec![row])
                    .unwrap_or_default());
            }
            let rows: Vec<_> = self
                .historical
                .iter()
                .skip(index_offset as usize)
                .take(limit as usize)
                .cloned()
                .collect();
            Ok(rows)
        }

        async fn add_invoice(
            &self,
            request: AddInvoiceRequest,
        ) -> Result<(String, [u8; 32]), L402Error> {
            Ok((format!("lnbc{}", request.price_sats), [9u8; 32]))
        }

        async fn subscribe_invoices(
            &self,
            _add_index: u64,
            _settle_index: u64,
        ) -> Result<tokio::sync::mpsc::Receiver<InvoiceUpdate>, L402Error> {
            let (tx, rx) = tokio::sync::mpsc::channel(16);
            if let Some(mut queue) = self.live.lock().take() {
                tokio::spawn(async move {
                    while let Some(update) = queue.pop_front() {
                        if tx.send(update).await.is_err() {
                            break;
                        }
                    }
                });
            }
            Ok(rx)
        }
    }

    fn historical_row(hash: u8, state: InvoiceState, add_index: u64) -> InvoiceUpdate {
        InvoiceUpdate {
            payment_hash: Some([hash; 32]),
            state,
            created_at: 0,
            expiry_secs: 10_000,
            add_index,
            settle_index: 0,
        }
    }

    #[tokio::test]
    async fn loads_historical_invoices_and_reports_settled_state() {
        let client = Arc::new(FakeInvoiceClient {
            historical: vec![historical_row(1, InvoiceState::Settled, 1)],
            live: SyncMutex::new(Some(VecDeque::new())),
        });
        let clock = Arc::new(FixedClock::new(1000));
        let (challenger, _fatal_rx) =
            Challenger::new(client, clock, ChallengerConfig::default());

        challenger
            .verify_invoice_status([1u8; 32], InvoiceState::Settled, Duration::from_secs(1))
            .await
            .unwrap();

        challenger.stop().await;
    }

    #[tokio::test]
    async fn unknown_invoice_times_out_with_not_found() {
        let client = Arc::new(FakeInvoiceClient {
            historical: vec![],
            live: SyncMutex::new(Some(VecDeque::new())),
        });
        let clock = Arc::new(FixedClock::new(1000));
        let (challenger, _fatal_rx) =
            Challenger::new(client, clock, ChallengerConfig::default());

        let err = challenger
            .verify_invoice_status([2u8; 32], InvoiceState::Settled, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, L402Error::Invalid(_)));

        challenger.stop().await;
    }

    #[tokio::test]
    async fn subscription_update_unblocks_waiter() {
        let mut live = VecDeque::new();
        live.push_back(historical_row(3, InvoiceState::Settled, 2));
        let client = Arc::new(FakeInvoiceClient {
            historical: vec![],
            live: SyncMutex::new(Some(live)),
        });
        let clock = Arc::new(FixedClock::new(1000));
        let (challenger, _fatal_rx) =
            Challenger::new(client, clock, ChallengerConfig::default());

        challenger
            .verify_invoice_status([3u8; 32], InvoiceState::Settled, Duration::from_secs(2))
            .await
            .unwrap();

        challenger.stop().await;
    }
}
