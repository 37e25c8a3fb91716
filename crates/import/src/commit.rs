use kontoauszug_core::{BankAccountId, CommitSink, InvoiceId, Money};
use serde::Serialize;
use uuid::Uuid;

use crate::session::EnhancedTransaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitFailure {
    pub transaction_id: Uuid,
    pub description: String,
    pub error: String,
}

/// The transaction was stored, only the invoice status update failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceUpdateFailure {
    pub transaction_id: Uuid,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub committed: usize,
    pub failed: Vec<CommitFailure>,
    pub invoice_failures: Vec<InvoiceUpdateFailure>,
    /// Invoices marked paid.
    pub linked: usize,
    /// Rows left unselected during review.
    pub skipped: usize,
    /// `None` without an account or when recalculation failed.
    pub balance: Option<Money>,
}

impl CommitSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.invoice_failures.is_empty()
    }
}

/// Writes selected rows one by one. A failed row is recorded and skipped;
/// nothing already written is rolled back.
pub async fn commit_selected<S: CommitSink>(
    entries: &[EnhancedTransaction],
    account: Option<BankAccountId>,
    sink: &S,
) -> CommitSummary {
    let mut summary = CommitSummary::default();

    for entry in entries {
        if !entry.selected {
            summary.skipped += 1;
            continue;
        }

        let record = entry.transaction.to_record(account);
        if let Err(e) = sink.insert_transaction(&record).await {
            tracing::warn!(id = %entry.id, date = %record.date, amount = %record.amount, error = %e, "failed to commit transaction");
            summary.failed.push(CommitFailure {
                transaction_id: entry.id,
                description: record.description,
                error: e.to_string(),
            });
            continue;
        }
        summary.committed += 1;

        let Some(invoice) = &entry.matching_invoice else {
            continue;
        };
        match sink.mark_invoice_paid(invoice.id).await {
            Ok(()) => summary.linked += 1,
            Err(e) => {
                tracing::warn!(id = %entry.id, invoice = %invoice.invoice_number, error = %e, "failed to mark invoice paid");
                summary.invoice_failures.push(InvoiceUpdateFailure {
                    transaction_id: entry.id,
                    invoice_id: invoice.id,
                    invoice_number: invoice.invoice_number.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    if let Some(account) = account {
        summary.balance = match sink.recalculate_balance(account).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                tracing::warn!(%account, error = %e, "failed to recalculate balance");
                None
            }
        };
    }

    tracing::info!(
        committed = summary.committed,
        failed = summary.failed.len(),
        linked = summary.linked,
        skipped = summary.skipped,
        "import committed"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, invoice, MemoryLedger};
    use kontoauszug_core::{EntryType, NormalizedTransaction};

    fn entry(cents: i64, description: &str, selected: bool) -> EnhancedTransaction {
        let mut tx = NormalizedTransaction::new(date(2024, 1, 15), Money::from_cents(cents));
        tx.description = description.to_string();
        EnhancedTransaction {
            id: Uuid::new_v4(),
            transaction: tx,
            is_duplicate: !selected,
            selected,
            matching_invoice: None,
            match_kind: None,
        }
    }

    // ── fold ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn commits_selected_rows_only() {
        let ledger = MemoryLedger::default();
        let entries = [entry(-4500, "Strom", true), entry(15_000, "Kunde", false), entry(2_000, "Zins", true)];

        let summary = commit_selected(&entries, Some(BankAccountId(1)), &ledger).await;
        assert_eq!(summary.committed, 2);
        assert_eq!(summary.skipped, 1);
        assert!(summary.is_clean());
        assert_eq!(summary.balance, Some(Money::from_cents(-2500)));

        let inserted = ledger.inserted();
        assert_eq!(inserted[0].entry_type, EntryType::Expense);
        assert_eq!(inserted[0].amount, Money::from_cents(4500));
        assert_eq!(inserted[1].entry_type, EntryType::Income);
    }

    #[tokio::test]
    async fn failed_rows_are_recorded_and_skipped() {
        let ledger = MemoryLedger {
            reject_descriptions: ["Kaputt".to_string()].into(),
            ..MemoryLedger::default()
        };
        let mut bad = entry(3_000, "Kaputt", true);
        bad.matching_invoice = Some(invoice(9, "RE-9", 3_000));
        let entries = [entry(1_000, "A", true), bad, entry(2_000, "B", true)];

        let summary = commit_selected(&entries, None, &ledger).await;
        assert_eq!(summary.committed, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].transaction_id, entries[1].id);
        assert_eq!(summary.linked, 0);
        assert!(ledger.paid().is_empty());
        assert_eq!(summary.balance, None);
    }

    #[tokio::test]
    async fn marks_matched_invoices_paid() {
        let ledger = MemoryLedger::default();
        let mut paid = entry(15_000, "Rechnung RE-2024-042", true);
        paid.matching_invoice = Some(invoice(42, "RE-2024-042", 15_000));

        let summary = commit_selected(&[paid], Some(BankAccountId(1)), &ledger).await;
        assert_eq!(summary.linked, 1);
        assert_eq!(ledger.paid(), vec![InvoiceId(42)]);
    }

    #[tokio::test]
    async fn invoice_update_failure_keeps_transaction() {
        let ledger = MemoryLedger {
            reject_invoices: [InvoiceId(42)].into(),
            ..MemoryLedger::default()
        };
        let mut paid = entry(15_000, "Rechnung RE-2024-042", true);
        paid.matching_invoice = Some(invoice(42, "RE-2024-042", 15_000));

        let summary = commit_selected(&[paid], Some(BankAccountId(1)), &ledger).await;
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.linked, 0);
        assert_eq!(summary.invoice_failures.len(), 1);
        assert_eq!(summary.invoice_failures[0].invoice_number, "RE-2024-042");
        assert_eq!(ledger.inserted().len(), 1);
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn balance_failure_is_none() {
        let ledger = MemoryLedger { fail_balance: true, ..MemoryLedger::default() };
        let summary = commit_selected(&[entry(100, "x", true)], Some(BankAccountId(1)), &ledger).await;
        assert_eq!(summary.committed, 1);
        assert_eq!(summary.balance, None);
    }

    #[tokio::test]
    async fn nothing_selected() {
        let ledger = MemoryLedger::default();
        let summary = commit_selected(&[entry(100, "x", false)], Some(BankAccountId(1)), &ledger).await;
        assert_eq!(summary.committed, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.balance, Some(Money::zero()));
    }
}
