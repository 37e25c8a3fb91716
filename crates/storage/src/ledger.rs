use async_trait::async_trait;
use kontoauszug_core::{
    BankAccountId, CommitSink, ExistingTransaction, InvoiceId, LedgerReader, Money, OpenInvoice, TransactionRecord,
};

use crate::db::{self, DbPool, StorageError};

/// SQLite-backed books for import sessions.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: DbPool,
}

impl SqliteLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerReader for SqliteLedger {
    type Error = StorageError;

    async fn recent_transactions(&self, limit: usize) -> Result<Vec<ExistingTransaction>, StorageError> {
        db::fetch_recent_transactions(&self.pool, limit).await
    }

    async fn open_invoices(&self) -> Result<Vec<OpenInvoice>, StorageError> {
        db::fetch_open_invoices(&self.pool).await
    }
}

#[async_trait]
impl CommitSink for SqliteLedger {
    type Error = StorageError;

    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), StorageError> {
        db::insert_transaction(&self.pool, record).await.map(|_| ())
    }

    async fn mark_invoice_paid(&self, invoice: InvoiceId) -> Result<(), StorageError> {
        db::mark_invoice_paid(&self.pool, invoice).await
    }

    async fn recalculate_balance(&self, account: BankAccountId) -> Result<Money, StorageError> {
        db::recalculate_balance(&self.pool, account).await
    }
}
