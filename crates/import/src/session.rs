//! Review state for one import: upload a statement, preview and adjust the
//! parsed rows, then commit the selection.

use std::fmt;

use kontoauszug_core::{
    BankAccountId, CommitSink, ExistingTransaction, InvoiceId, LedgerReader, NormalizedTransaction, OpenInvoice,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::commit::{commit_selected, CommitSummary};
use crate::config::ImportSettings;
use crate::csv::BankFormatProfile;
use crate::dedup::{DuplicateFilter, DEFAULT_SNAPSHOT_LIMIT};
use crate::detect::FormatTag;
use crate::error::ImportError;
use crate::invoice_match::{InvoiceMatcher, MatchKind};
use crate::pdf::StatementExtractor;
use crate::pipeline::{parse_file, ParsedStatement, RawImportFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStep {
    Upload,
    Preview,
    Committing,
    Complete,
}

impl fmt::Display for ImportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStep::Upload => write!(f, "upload"),
            ImportStep::Preview => write!(f, "preview"),
            ImportStep::Committing => write!(f, "committing"),
            ImportStep::Complete => write!(f, "complete"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not possible during {actual}, expected {expected}")]
    InvalidStep { expected: ImportStep, actual: ImportStep },
    #[error("The import is being or has been committed")]
    Locked,
    #[error("Unknown transaction {0}")]
    UnknownTransaction(Uuid),
    #[error("Invoice {0} is not open")]
    UnknownInvoice(InvoiceId),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("Failed to load ledger data: {0}")]
    Ledger(String),
}

/// A parsed row plus review state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnhancedTransaction {
    /// Only unique within one session.
    pub id: Uuid,
    #[serde(flatten)]
    pub transaction: NormalizedTransaction,
    pub is_duplicate: bool,
    pub selected: bool,
    pub matching_invoice: Option<OpenInvoice>,
    pub match_kind: Option<MatchKind>,
}

/// Ledger state captured when a session opens or starts over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub existing: Vec<ExistingTransaction>,
    pub open_invoices: Vec<OpenInvoice>,
}

impl SessionSnapshot {
    pub async fn fetch<R: LedgerReader>(reader: &R, limit: usize) -> Result<Self, SessionError> {
        let existing = reader
            .recent_transactions(limit)
            .await
            .map_err(|e| SessionError::Ledger(e.to_string()))?;
        let open_invoices = reader
            .open_invoices()
            .await
            .map_err(|e| SessionError::Ledger(e.to_string()))?;
        tracing::debug!(existing = existing.len(), invoices = open_invoices.len(), "ledger snapshot loaded");
        Ok(Self { existing, open_invoices })
    }
}

/// Flags duplicates, suggests invoices and assigns fresh ids.
pub fn process_transactions(
    transactions: Vec<NormalizedTransaction>,
    snapshot: &SessionSnapshot,
    filter: &DuplicateFilter,
    matcher: &InvoiceMatcher,
) -> Vec<EnhancedTransaction> {
    transactions
        .into_iter()
        .map(|transaction| {
            let is_duplicate = filter.is_duplicate(&transaction, &snapshot.existing);
            let found = matcher.find_match(&transaction, &snapshot.open_invoices);
            EnhancedTransaction {
                id: Uuid::new_v4(),
                is_duplicate,
                selected: !is_duplicate,
                matching_invoice: found.map(|(inv, _)| inv.clone()),
                match_kind: found.map(|(_, kind)| kind),
                transaction,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub total: usize,
    pub selected: usize,
    pub duplicates: usize,
    pub matched: usize,
}

pub struct ImportSession {
    step: ImportStep,
    snapshot: SessionSnapshot,
    snapshot_limit: usize,
    filter: DuplicateFilter,
    matcher: InvoiceMatcher,
    file_name: Option<String>,
    format: Option<FormatTag>,
    transactions: Vec<EnhancedTransaction>,
    last_commit: Option<CommitSummary>,
}

impl ImportSession {
    pub fn new(snapshot: SessionSnapshot) -> Self {
        Self {
            step: ImportStep::Upload,
            snapshot,
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            filter: DuplicateFilter::default(),
            matcher: InvoiceMatcher::default(),
            file_name: None,
            format: None,
            transactions: Vec::new(),
            last_commit: None,
        }
    }

    /// Loads the duplicate and invoice snapshots, bounded by the configured limit.
    pub async fn open<R: LedgerReader>(reader: &R, settings: &ImportSettings) -> Result<Self, SessionError> {
        let snapshot = SessionSnapshot::fetch(reader, settings.duplicate_snapshot_limit).await?;
        let mut session = Self::new(snapshot);
        session.snapshot_limit = settings.duplicate_snapshot_limit;
        session.filter = DuplicateFilter::new(settings.tolerance());
        session.matcher = InvoiceMatcher::new(settings.tolerance());
        Ok(session)
    }

    pub fn step(&self) -> ImportStep {
        self.step
    }

    pub fn transactions(&self) -> &[EnhancedTransaction] {
        &self.transactions
    }

    pub fn open_invoices(&self) -> &[OpenInvoice] {
        &self.snapshot.open_invoices
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn format(&self) -> Option<FormatTag> {
        self.format
    }

    pub fn last_commit(&self) -> Option<&CommitSummary> {
        self.last_commit.as_ref()
    }

    pub fn selected(&self) -> impl Iterator<Item = &EnhancedTransaction> + '_ {
        self.transactions.iter().filter(|t| t.selected)
    }

    pub fn summary(&self) -> ReviewSummary {
        self.transactions.iter().fold(ReviewSummary::default(), |mut s, t| {
            s.total += 1;
            s.selected += usize::from(t.selected);
            s.duplicates += usize::from(t.is_duplicate);
            s.matched += usize::from(t.matching_invoice.is_some());
            s
        })
    }

    fn require(&self, expected: ImportStep) -> Result<(), SessionError> {
        match self.step {
            actual if actual == expected => Ok(()),
            ImportStep::Committing | ImportStep::Complete => Err(SessionError::Locked),
            actual => Err(SessionError::InvalidStep { expected, actual }),
        }
    }

    fn transition(&mut self, to: ImportStep) {
        tracing::info!(from = %self.step, %to, "import step changed");
        self.step = to;
    }

    fn entry_mut(&mut self, id: Uuid) -> Result<&mut EnhancedTransaction, SessionError> {
        self.transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(SessionError::UnknownTransaction(id))
    }

    /// Parses `file` and moves to preview. On failure the session stays on upload.
    pub async fn upload(
        &mut self,
        file: &RawImportFile,
        profile: &BankFormatProfile,
        extractor: Option<&dyn StatementExtractor>,
    ) -> Result<(), SessionError> {
        self.require(ImportStep::Upload)?;
        let parsed = parse_file(file, profile, extractor).await?;
        self.preview(&file.file_name, parsed)
    }

    pub fn preview(&mut self, file_name: &str, parsed: ParsedStatement) -> Result<(), SessionError> {
        self.require(ImportStep::Upload)?;
        if parsed.transactions.is_empty() {
            return Err(ImportError::NoTransactionsFound(file_name.to_string()).into());
        }
        self.transactions = process_transactions(parsed.transactions, &self.snapshot, &self.filter, &self.matcher);
        self.file_name = Some(file_name.to_string());
        self.format = parsed.format;
        self.transition(ImportStep::Preview);
        Ok(())
    }

    /// Back to upload; the parsed rows are discarded.
    pub fn back(&mut self) -> Result<(), SessionError> {
        self.require(ImportStep::Preview)?;
        self.transactions.clear();
        self.file_name = None;
        self.format = None;
        self.transition(ImportStep::Upload);
        Ok(())
    }

    pub fn toggle_selection(&mut self, id: Uuid) -> Result<bool, SessionError> {
        self.require(ImportStep::Preview)?;
        let entry = self.entry_mut(id)?;
        entry.selected = !entry.selected;
        Ok(entry.selected)
    }

    /// Selects everything except duplicates.
    pub fn select_all(&mut self) -> Result<(), SessionError> {
        self.require(ImportStep::Preview)?;
        for t in &mut self.transactions {
            t.selected = !t.is_duplicate;
        }
        Ok(())
    }

    pub fn select_none(&mut self) -> Result<(), SessionError> {
        self.require(ImportStep::Preview)?;
        for t in &mut self.transactions {
            t.selected = false;
        }
        Ok(())
    }

    /// `None` removes the match. The invoice must be one of the session's open invoices.
    pub fn override_match(&mut self, id: Uuid, invoice: Option<InvoiceId>) -> Result<(), SessionError> {
        self.require(ImportStep::Preview)?;
        let invoice = match invoice {
            Some(invoice_id) => Some(
                self.snapshot
                    .open_invoices
                    .iter()
                    .find(|i| i.id == invoice_id)
                    .cloned()
                    .ok_or(SessionError::UnknownInvoice(invoice_id))?,
            ),
            None => None,
        };
        let entry = self.entry_mut(id)?;
        entry.match_kind = invoice.as_ref().map(|_| MatchKind::Manual);
        entry.matching_invoice = invoice;
        Ok(())
    }

    /// Commits the selection and completes the session. The session is locked
    /// from the moment the commit starts.
    pub async fn commit<S: CommitSink>(
        &mut self,
        sink: &S,
        account: Option<BankAccountId>,
    ) -> Result<CommitSummary, SessionError> {
        self.require(ImportStep::Preview)?;
        self.transition(ImportStep::Committing);

        let summary = commit_selected(&self.transactions, account, sink).await;

        self.last_commit = Some(summary.clone());
        self.transition(ImportStep::Complete);
        Ok(summary)
    }

    /// Starts over on upload with a fresh ledger snapshot, so rows booked by
    /// the previous commit count as duplicates. On failure nothing changes.
    pub async fn reset<R: LedgerReader>(&mut self, reader: &R) -> Result<(), SessionError> {
        self.snapshot = SessionSnapshot::fetch(reader, self.snapshot_limit).await?;
        self.transactions.clear();
        self.file_name = None;
        self.format = None;
        self.last_commit = None;
        self.transition(ImportStep::Upload);
        Ok(())
    }
}
