pub mod account;
pub mod invoice;
pub mod ledger;
pub mod money;
pub mod transaction;

pub use account::{BankAccount, BankAccountId};
pub use invoice::{InvoiceId, InvoiceStatus, OpenInvoice};
pub use ledger::{CommitSink, LedgerReader};
pub use money::Money;
pub use transaction::{EntryType, ExistingTransaction, NormalizedTransaction, TransactionRecord};
