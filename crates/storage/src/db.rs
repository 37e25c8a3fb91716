use chrono::NaiveDate;
use kontoauszug_core::{
    BankAccount, BankAccountId, ExistingTransaction, InvoiceId, InvoiceStatus, Money, OpenInvoice,
    TransactionRecord,
};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use thiserror::Error;

pub type DbPool = Pool<Sqlite>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Amount {0} does not fit into the cents column")]
    AmountOutOfRange(Money),
    #[error("Invoice {0} does not exist or is already paid")]
    InvoiceNotOpen(InvoiceId),
    #[error("Bank account {0} does not exist")]
    AccountNotFound(BankAccountId),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    apply_pragmas(&pool).await?;
    run_migrations(&pool).await?;

    tracing::debug!(path = %path.display(), "database ready");
    Ok(pool)
}

/// Single-connection in-memory database, kept alive for the pool's lifetime.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    apply_pragmas(&pool).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn apply_pragmas(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA cache_size = -32000")
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            iban TEXT UNIQUE,
            balance_cents INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            entry_type TEXT NOT NULL CHECK (entry_type IN ('income', 'expense')),
            amount_cents INTEGER NOT NULL CHECK (amount_cents >= 0),
            description TEXT NOT NULL,
            category TEXT,
            bank_account_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (bank_account_id) REFERENCES bank_accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invoices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_number TEXT NOT NULL UNIQUE,
            amount_cents INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'sent', 'paid')),
            paid_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn cents(amount: Money) -> Result<i64, StorageError> {
    amount.to_cents().ok_or(StorageError::AmountOutOfRange(amount))
}

// ── bank accounts ────────────────────────────────────────────────────────────

pub async fn insert_bank_account(pool: &DbPool, account: &BankAccount) -> Result<BankAccountId, StorageError> {
    let result = sqlx::query("INSERT INTO bank_accounts (name, iban, balance_cents) VALUES (?, ?, ?)")
        .bind(&account.name)
        .bind(&account.iban)
        .bind(cents(account.balance)?)
        .execute(pool)
        .await?;
    Ok(BankAccountId(result.last_insert_rowid()))
}

pub async fn get_bank_account(pool: &DbPool, id: BankAccountId) -> Result<Option<BankAccount>, StorageError> {
    let row = sqlx::query_as::<_, (i64, String, Option<String>, i64)>(
        "SELECT id, name, iban, balance_cents FROM bank_accounts WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(bank_account_from_row))
}

pub async fn list_bank_accounts(pool: &DbPool) -> Result<Vec<BankAccount>, StorageError> {
    let rows = sqlx::query_as::<_, (i64, String, Option<String>, i64)>(
        "SELECT id, name, iban, balance_cents FROM bank_accounts ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(bank_account_from_row).collect())
}

fn bank_account_from_row(r: (i64, String, Option<String>, i64)) -> BankAccount {
    BankAccount {
        id: Some(BankAccountId(r.0)),
        name: r.1,
        iban: r.2,
        balance: Money::from_cents(r.3),
    }
}

// ── invoices ─────────────────────────────────────────────────────────────────

pub async fn insert_invoice(
    pool: &DbPool,
    invoice_number: &str,
    amount: Money,
    status: InvoiceStatus,
) -> Result<InvoiceId, StorageError> {
    let result = sqlx::query("INSERT INTO invoices (invoice_number, amount_cents, status) VALUES (?, ?, ?)")
        .bind(invoice_number)
        .bind(cents(amount)?)
        .bind(status.to_string())
        .execute(pool)
        .await?;
    Ok(InvoiceId(result.last_insert_rowid()))
}

pub async fn get_invoice_status(pool: &DbPool, id: InvoiceId) -> Result<Option<InvoiceStatus>, StorageError> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM invoices WHERE id = ?")
        .bind(id.0)
        .fetch_optional(pool)
        .await?;

    status
        .map(|s| s.parse::<InvoiceStatus>().map_err(StorageError::Corrupt))
        .transpose()
}

/// Draft and sent invoices, oldest first.
pub async fn fetch_open_invoices(pool: &DbPool) -> Result<Vec<OpenInvoice>, StorageError> {
    let rows = sqlx::query_as::<_, (i64, String, i64, String)>(
        "SELECT id, invoice_number, amount_cents, status FROM invoices WHERE status IN ('draft', 'sent') ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(OpenInvoice {
                id: InvoiceId(r.0),
                invoice_number: r.1,
                amount: Money::from_cents(r.2),
                status: r.3.parse().map_err(StorageError::Corrupt)?,
            })
        })
        .collect()
}

pub async fn mark_invoice_paid(pool: &DbPool, id: InvoiceId) -> Result<(), StorageError> {
    let result = sqlx::query(
        "UPDATE invoices SET status = 'paid', paid_at = date('now') WHERE id = ? AND status IN ('draft', 'sent')",
    )
    .bind(id.0)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::InvoiceNotOpen(id));
    }
    Ok(())
}

// ── transactions ─────────────────────────────────────────────────────────────

pub async fn insert_transaction(pool: &DbPool, record: &TransactionRecord) -> Result<i64, StorageError> {
    let result = sqlx::query(
        "INSERT INTO transactions (date, entry_type, amount_cents, description, category, bank_account_id) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(record.date)
    .bind(record.entry_type.to_string())
    .bind(cents(record.amount.abs())?)
    .bind(&record.description)
    .bind(&record.category)
    .bind(record.bank_account_id.map(|a| a.0))
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// The `limit` newest transactions by date. Amounts are magnitudes.
pub async fn fetch_recent_transactions(pool: &DbPool, limit: usize) -> Result<Vec<ExistingTransaction>, StorageError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, (NaiveDate, i64)>(
        "SELECT date, amount_cents FROM transactions ORDER BY date DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(date, amount_cents)| ExistingTransaction { date, amount: Money::from_cents(amount_cents) })
        .collect())
}

/// Stores and returns `sum(income) - sum(expense)` over the account's transactions.
pub async fn recalculate_balance(pool: &DbPool, account: BankAccountId) -> Result<Money, StorageError> {
    let (balance_cents,): (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(CASE WHEN entry_type = 'income' THEN amount_cents ELSE -amount_cents END), 0)
        FROM transactions
        WHERE bank_account_id = ?
        "#,
    )
    .bind(account.0)
    .fetch_one(pool)
    .await?;

    let result = sqlx::query("UPDATE bank_accounts SET balance_cents = ? WHERE id = ?")
        .bind(balance_cents)
        .bind(account.0)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::AccountNotFound(account));
    }

    Ok(Money::from_cents(balance_cents))
}
