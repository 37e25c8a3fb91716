use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use kontoauszug_core::{
    BankAccountId, CommitSink, EntryType, ExistingTransaction, InvoiceId, InvoiceStatus, LedgerReader, Money,
    OpenInvoice, TransactionRecord,
};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MemoryError(pub String);

/// In-memory books with switchable failures.
#[derive(Default)]
pub struct MemoryLedger {
    pub existing: Vec<ExistingTransaction>,
    pub invoices: Vec<OpenInvoice>,
    pub inserted: Mutex<Vec<TransactionRecord>>,
    pub paid: Mutex<Vec<InvoiceId>>,
    /// Inserts whose description contains one of these fail.
    pub reject_descriptions: HashSet<String>,
    pub reject_invoices: HashSet<InvoiceId>,
    pub fail_balance: bool,
}

impl MemoryLedger {
    pub fn inserted(&self) -> Vec<TransactionRecord> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn paid(&self) -> Vec<InvoiceId> {
        self.paid.lock().unwrap().clone()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn invoice(id: i64, number: &str, cents: i64) -> OpenInvoice {
    OpenInvoice {
        id: InvoiceId(id),
        invoice_number: number.to_string(),
        amount: Money::from_cents(cents),
        status: InvoiceStatus::Sent,
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    type Error = MemoryError;

    /// Committed records first, newest on top, then the seeded rows.
    async fn recent_transactions(&self, limit: usize) -> Result<Vec<ExistingTransaction>, MemoryError> {
        let inserted = self.inserted.lock().unwrap();
        Ok(inserted
            .iter()
            .rev()
            .map(|r| ExistingTransaction { date: r.date, amount: r.amount })
            .chain(self.existing.iter().copied())
            .take(limit)
            .collect())
    }

    async fn open_invoices(&self) -> Result<Vec<OpenInvoice>, MemoryError> {
        let paid = self.paid.lock().unwrap();
        Ok(self
            .invoices
            .iter()
            .filter(|i| i.status.is_open() && !paid.contains(&i.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CommitSink for MemoryLedger {
    type Error = MemoryError;

    async fn insert_transaction(&self, record: &TransactionRecord) -> Result<(), MemoryError> {
        if self.reject_descriptions.iter().any(|d| record.description.contains(d.as_str())) {
            return Err(MemoryError(format!("constraint failed for '{}'", record.description)));
        }
        self.inserted.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn mark_invoice_paid(&self, invoice: InvoiceId) -> Result<(), MemoryError> {
        if self.reject_invoices.contains(&invoice) {
            return Err(MemoryError(format!("invoice {invoice} is locked")));
        }
        self.paid.lock().unwrap().push(invoice);
        Ok(())
    }

    async fn recalculate_balance(&self, account: BankAccountId) -> Result<Money, MemoryError> {
        if self.fail_balance {
            return Err(MemoryError("database is locked".into()));
        }
        Ok(self
            .inserted
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.bank_account_id == Some(account))
            .map(|r| match r.entry_type {
                EntryType::Income => r.amount,
                EntryType::Expense => -r.amount,
            })
            .sum())
    }
}
