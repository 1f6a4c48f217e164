use async_trait::async_trait;
use l402_common::L402Error;

/// Lifecycle states a Lightning invoice can report (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceState {
    Open,
    Accepted,
    Settled,
    Canceled,
}

/// One row from a node's invoice list, or one event off its subscription
/// stream. `payment_hash` is `None` for the rare invoice that carries no
/// hash at all; such rows are always irrelevant (§4.4).
#[derive(Debug, Clone)]
pub struct InvoiceUpdate {
    pub payment_hash: Option<[u8; 32]>,
    pub state: InvoiceState,
    pub created_at: i64,
    pub expiry_secs: i64,
    pub add_index: u64,
    pub settle_index: u64,
}

/// What the challenger asks the backing node for when it mints a fresh
/// challenge (§4.3/§4.4).
pub struct AddInvoiceRequest {
    pub price_sats: u64,
}

/// Seam to whatever Lightning node backs invoice issuance and settlement
/// tracking. Implemented for a real node client outside this crate, and by
/// `FakeInvoiceClient` in tests.
#[async_trait]
pub trait InvoiceClient: Send + Sync {
    /// Lists invoices starting at `index_offset`, at most `limit` of them.
    /// `reversed` walks backwards from the newest index, used by the
    /// historical loader to discover the current add/settle index without
    /// paging through the entire invoice database.
    async fn list_invoices(
        &self,
        index_offset: u64,
        limit: u64,
        reversed: bool,
    ) -> Result<Vec<InvoiceUpdate>, L402Error>;

    /// Creates a new invoice and returns its `(payment_request, payment_hash)`.
    async fn add_invoice(&self, request: AddInvoiceRequest) -> Result<(String, [u8; 32]), L402Error>;

    /// Opens a subscription to invoice state changes starting at the given
    /// add/settle indices. The returned receiver yields one `InvoiceUpdate`
    /// per change; it closes when the subscription ends.
    async fn subscribe_invoices(
        &self,
        add_index: u64,
        settle_index: u64,
    ) -> Result<tokio::sync::mpsc::Receiver<InvoiceUpdate>, L402Error>;
}
