//! Boundaries between the import pipeline and wherever the books live.

use async_trait::async_trait;

use crate::account::BankAccountId;
use crate::invoice::{InvoiceId, OpenInvoice};
use crate::money::Money;
use crate::transaction::{ExistingTransaction, TransactionRecord};

/// Read side, queried once when an import session opens.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The `limit` most recent stored transactions, newest first.
    async fn recent_transactions(&self, limit: usize) -> Result<Vec<ExistingTransaction>, Self::Error>;

    /// Invoices in `draft` or `sent` status.
    async fn open_invoices(&self) -> Result<Vec<OpenInvoice>, Self::Error>;
}

/// Write side, driven one request at a time by the commit step.
#[async_trait]
pub trait CommitSink: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), Self::Error>;

    async fn mark_invoice_paid(&self, invoice: InvoiceId) -> Result<(), Self::Error>;

    /// Recomputes `sum(income) - sum(expense)` for the account and returns it.
    async fn recalculate_balance(&self, account: BankAccountId) -> Result<Money, Self::Error>;
}
