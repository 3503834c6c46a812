use std::sync::Mutex;

use async_trait::async_trait;
use freightdesk_models::{Quote, QuoteRequest};
use freightdesk_store::{QuoteLedger, StoreError};

/// The marketplace's quote storage. Mockable for testing.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Persist a quote and return the id the storage assigned to it.
    async fn submit(&self, quote: &Quote, request: &QuoteRequest) -> Result<String, StoreError>;
}

/// Quote storage backed by the local SQLite ledger.
///
/// `rusqlite::Connection` is not `Sync`, so access goes through a `Mutex`.
pub struct LedgerQuoteStore {
    ledger: Mutex<QuoteLedger>,
}

impl LedgerQuoteStore {
    pub fn new(ledger: QuoteLedger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    /// Run a closure against the ledger, e.g. to record feedback or list quotes.
    pub fn with_ledger<T>(
        &self,
        f: impl FnOnce(&QuoteLedger) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let ledger = self
            .ledger
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Ledger mutex poisoned: {e}")))?;
        f(&ledger)
    }
}

#[async_trait]
impl QuoteStore for LedgerQuoteStore {
    async fn submit(&self, quote: &Quote, request: &QuoteRequest) -> Result<String, StoreError> {
        self.with_ledger(|ledger| {
            if ledger.get(&quote.id)?.is_none() {
                ledger.insert(quote, request.message.as_deref())?;
            }
            Ok(quote.id.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightdesk_models::QuoteStatus;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn submit_inserts_into_ledger() {
        let store = LedgerQuoteStore::new(QuoteLedger::open_in_memory().unwrap());
        let request = QuoteRequest::agent("cargo-1", dec!(1223), Some("Free tomorrow".to_string()));
        let quote = Quote::pending(&request);

        let id = store.submit(&quote, &request).await.unwrap();
        assert_eq!(id, quote.id);

        let stored = store.with_ledger(|l| l.get(&id)).unwrap().unwrap();
        assert_eq!(stored.status, QuoteStatus::Pending);
        assert_eq!(stored.price, dec!(1223));
    }

    #[tokio::test]
    async fn resubmitting_is_idempotent() {
        let store = LedgerQuoteStore::new(QuoteLedger::open_in_memory().unwrap());
        let request = QuoteRequest::manual("cargo-1", dec!(990));
        let quote = Quote::pending(&request);

        store.submit(&quote, &request).await.unwrap();
        store.submit(&quote, &request).await.unwrap();
        assert_eq!(store.with_ledger(|l| l.count()).unwrap(), 1);
    }
}
