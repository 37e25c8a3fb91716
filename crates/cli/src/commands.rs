use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use kontoauszug_core::{BankAccount, BankAccountId, InvoiceId, InvoiceStatus, Money};
use kontoauszug_import::{
    CommitSummary, HttpStatementExtractor, ImportConfig, ImportSession, RawImportFile, StatementExtractor,
};
use kontoauszug_storage::{DbPool, SqliteLedger};

pub struct AppState {
    pub db: DbPool,
    pub config: ImportConfig,
    /// Present only when an extraction endpoint is configured.
    pub extractor: Option<HttpStatementExtractor>,
}

impl AppState {
    pub async fn load(db_path: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<Self> {
        let project_dirs = directories::ProjectDirs::from("de", "kontoauszug", "Kontoauszug");

        let db_path = match db_path {
            Some(path) => path,
            None => {
                let dirs = project_dirs.as_ref().context("Failed to get app directory")?;
                let data_dir = dirs.data_dir();
                std::fs::create_dir_all(data_dir)
                    .with_context(|| format!("Failed to create {}", data_dir.display()))?;
                data_dir.join("ledger.db")
            }
        };

        let config = match config_path.or_else(|| project_dirs.map(|d| d.config_dir().join("config.toml"))) {
            Some(path) => ImportConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))?,
            None => ImportConfig::default(),
        };

        let extractor = match config.extraction.endpoint {
            Some(_) => Some(HttpStatementExtractor::from_config(&config.extraction)?),
            None => None,
        };

        let db = kontoauszug_storage::create_db(&db_path)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        tracing::debug!(db = %db_path.display(), "state loaded");

        Ok(Self { db, config, extractor })
    }

    fn ledger(&self) -> SqliteLedger {
        SqliteLedger::new(self.db.clone())
    }

    async fn previewed_session(&self, file: &Path, profile: Option<&str>) -> Result<ImportSession> {
        let profile = self.config.resolve_profile(profile)?;
        let raw = RawImportFile::read(file).await?;
        let mut session = ImportSession::open(&self.ledger(), &self.config.import).await?;
        let extractor = self.extractor.as_ref().map(|e| e as &dyn StatementExtractor);
        session.upload(&raw, &profile, extractor).await?;
        Ok(session)
    }
}

/// Row edits applied between preview and commit.
pub struct ReviewChoices {
    pub toggle: Vec<usize>,
    pub link: Vec<(usize, i64)>,
    pub unlink: Vec<usize>,
}

pub async fn preview(state: &AppState, file: &Path, profile: Option<&str>) -> Result<()> {
    let session = state.previewed_session(file, profile).await?;
    print_session(&session);
    Ok(())
}

pub async fn import(
    state: &AppState,
    file: &Path,
    account: i64,
    profile: Option<&str>,
    review: &ReviewChoices,
) -> Result<()> {
    let account = BankAccountId(account);
    if kontoauszug_storage::get_bank_account(&state.db, account).await?.is_none() {
        bail!("Bank account {account} does not exist. Add it with `kontoauszug account add`.");
    }

    let mut session = state.previewed_session(file, profile).await?;
    let row_id = |session: &ImportSession, row: usize| {
        row.checked_sub(1)
            .and_then(|idx| session.transactions().get(idx))
            .map(|t| t.id)
            .with_context(|| format!("No row {row} in {}", file.display()))
    };

    for &row in &review.toggle {
        let id = row_id(&session, row)?;
        session.toggle_selection(id)?;
    }
    for &row in &review.unlink {
        let id = row_id(&session, row)?;
        session.override_match(id, None)?;
    }
    for &(row, invoice) in &review.link {
        let id = row_id(&session, row)?;
        session.override_match(id, Some(InvoiceId(invoice)))?;
    }

    print_session(&session);
    let summary = session.commit(&state.ledger(), Some(account)).await?;
    print_commit(&summary);
    Ok(())
}

pub fn profiles(state: &AppState) {
    for name in state.config.profile_names() {
        let marker = if name == state.config.import.default_profile { " (default)" } else { "" };
        println!("{name}{marker}");
    }
}

pub async fn add_account(state: &AppState, name: &str, iban: Option<&str>) -> Result<()> {
    let id = kontoauszug_storage::insert_bank_account(&state.db, &BankAccount::new(name, iban)).await?;
    println!("Added bank account {id}: {name}");
    Ok(())
}

pub async fn list_accounts(state: &AppState) -> Result<()> {
    for account in kontoauszug_storage::list_bank_accounts(&state.db).await? {
        let id = account.id.map(|i| i.to_string()).unwrap_or_default();
        println!(
            "{id:>4}  {:<30} {:<24} {:>14}",
            account.name,
            account.iban.as_deref().unwrap_or("-"),
            account.balance.to_string()
        );
    }
    Ok(())
}

pub async fn add_invoice(state: &AppState, number: &str, amount: Money, status: InvoiceStatus) -> Result<()> {
    let id = kontoauszug_storage::insert_invoice(&state.db, number, amount, status).await?;
    println!("Added invoice {id}: {number} ({amount}, {status})");
    Ok(())
}

pub async fn list_invoices(state: &AppState) -> Result<()> {
    for invoice in kontoauszug_storage::fetch_open_invoices(&state.db).await? {
        println!(
            "{:>4}  {:<20} {:>14}  {}",
            invoice.id,
            invoice.invoice_number,
            invoice.amount.to_string(),
            invoice.status
        );
    }
    Ok(())
}

fn print_session(session: &ImportSession) {
    if let (Some(name), Some(format)) = (session.file_name(), session.format()) {
        println!("{name} ({format})");
    }
    for (idx, entry) in session.transactions().iter().enumerate() {
        let tx = &entry.transaction;
        let mark = if entry.selected { "x" } else { " " };
        let dup = if entry.is_duplicate { "dup" } else { "" };
        let invoice = entry
            .matching_invoice
            .as_ref()
            .map(|i| format!(" -> {}", i.invoice_number))
            .unwrap_or_default();
        println!(
            "{:>3} [{mark}] {} {:>14} {dup:<3} {}{invoice}",
            idx + 1,
            tx.date,
            tx.amount.to_string(),
            tx.display_description()
        );
    }

    let s = session.summary();
    println!(
        "{} rows, {} selected, {} duplicates, {} matched",
        s.total, s.selected, s.duplicates, s.matched
    );
}

fn print_commit(summary: &CommitSummary) {
    println!(
        "Committed {}, skipped {}, linked {} invoices",
        summary.committed, summary.skipped, summary.linked
    );
    for failure in &summary.failed {
        println!("  failed: {} ({})", failure.description, failure.error);
    }
    for failure in &summary.invoice_failures {
        println!("  invoice {} not marked paid: {}", failure.invoice_number, failure.error);
    }
    match summary.balance {
        Some(balance) => println!("New balance: {balance}"),
        None => println!("Balance could not be recalculated"),
    }
}
