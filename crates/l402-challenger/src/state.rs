use crate::invoice_client::InvoiceState;
use crate::invoice_client::InvoiceUpdate;
use l402_common::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub(crate) struct InvoiceEntry {
    pub state: InvoiceState,
    pub created_at: i64,
    pub expiry_secs: i64,
}

/// The in-memory view of invoice states the challenger tracks (§4.4). Kept
/// behind a plain mutex: lookups and updates are O(1) and never held across
/// an await point.
pub(crate) struct InvoiceStateMap {
    entries: Mutex<HashMap<[u8; 32], InvoiceEntry>>,
}

impl InvoiceStateMap {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, payment_hash: &[u8; 32]) -> Option<InvoiceEntry> {
        self.entries.lock().get(payment_hash).copied()
    }

    /// Applies one update, following the irrelevant-invoice rule: an
    /// irrelevant invoice is dropped from the map rather than stored.
    pub fn apply(&self, update: &InvoiceUpdate, clock: &dyn Clock) {
        let Some(hash) = update.payment_hash else {
            return;
        };
        if is_irrelevant(update, clock) {
            self.entries.lock().remove(&hash);
        } else {
            self.entries.lock().insert(
                hash,
                InvoiceEntry {
                    state: update.state,
                    created_at: update.created_at,
                    expiry_secs: update.expiry_secs,
                },
            );
        }
    }
}

/// An invoice is irrelevant to the challenger once it can never settle:
/// it has been canceled outright, or it is still unsettled and its
/// creation-plus-expiry window has already passed (§4.4).
fn is_irrelevant(update: &InvoiceUpdate, clock: &dyn Clock) -> bool {
    match update.state {
        InvoiceState::Canceled => true,
        InvoiceState::Settled => false,
        InvoiceState::Open | InvoiceState::Accepted => {
            clock.now_unix() > update.created_at + update.expiry_secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l402_common::clock::FixedClock;

    fn update(state: InvoiceState, created_at: i64, expiry_secs: i64) -> InvoiceUpdate {
        InvoiceUpdate {
            payment_hash: Some([1u8; 32]),
            state,
            created_at,
            expiry_secs,
            add_index: 1,
            settle_index: 0,
        }
    }

    #[test]
    fn canceled_invoice_is_removed() {
        let clock = FixedClock::new(1000);
        let map = InvoiceStateMap::new();
        map.apply(&update(InvoiceState::Open, 500, 10_000), &clock);
        assert!(map.get(&[1u8; 32]).is_some());
        map.apply(&update(InvoiceState::Canceled, 500, 10_000), &clock);
        assert!(map.get(&[1u8; 32]).is_none());
    }

    #[test]
    fn expired_unsettled_invoice_is_removed() {
        let clock = FixedClock::new(11_000);
        let map = InvoiceStateMap::new();
        map.apply(&update(InvoiceState::Open, 0, 10_000), &clock);
        assert!(map.get(&[1u8; 32]).is_none());
    }

    #[test]
    fn settled_invoice_survives_past_expiry() {
        let clock = FixedClock::new(11_000);
        let map = InvoiceStateMap::new();
        map.apply(&update(InvoiceState::Settled, 0, 10_000), &clock);
        assert!(map.get(&[1u8; 32]).is_some());
    }

    #[test]
    fn update_with_no_payment_hash_is_ignored() {
        let clock = FixedClock::new(1000);
        let map = InvoiceStateMap::new();
        let mut upd = update(InvoiceState::Open, 500, 10_000);
        upd.payment_hash = None;
        map.apply(&upd, &clock);
        assert!(map.get(&[1u8; 32]).is_none());
    }
}
