//! Invoice challenger (§4.4): mints fresh Lightning invoices on behalf of
//! the mint and tracks their settlement state via a historical load
//! followed by a live subscription.

mod challenger;
mod invoice_client;
mod state;

pub use challenger::Challenger;
pub use challenger::ChallengerConfig;
pub use invoice_client::AddInvoiceRequest;
pub use invoice_client::InvoiceClient;
pub use invoice_client::InvoiceState;
pub use invoice_client::InvoiceUpdate;
