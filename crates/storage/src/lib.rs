pub mod db;
pub mod ledger;

pub use db::{
    create_db, create_memory_db, fetch_open_invoices, fetch_recent_transactions, get_bank_account,
    get_invoice_status, insert_bank_account, insert_invoice, insert_transaction, list_bank_accounts,
    mark_invoice_paid, recalculate_balance, DbPool, StorageError,
};
pub use ledger::SqliteLedger;
