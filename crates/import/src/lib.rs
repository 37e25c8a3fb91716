// Lazily compiled regexes, one accessor fn per pattern.
macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static ::regex::Regex {
            static R: ::std::sync::OnceLock<::regex::Regex> = ::std::sync::OnceLock::new();
            R.get_or_init(|| ::regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}

pub mod camt053;
pub mod commit;
pub mod config;
pub mod csv;
pub mod dedup;
pub mod detect;
pub mod error;
pub mod invoice_match;
pub mod mt940;
pub mod pdf;
pub mod pipeline;
pub mod session;
pub(crate) mod util;
pub(crate) mod xml;

#[cfg(test)]
mod test_support;

pub use camt053::{Camt053Parser, CamtError};
pub use commit::{commit_selected, CommitFailure, CommitSummary, InvoiceUpdateFailure};
pub use config::{ConfigError, ExtractionConfig, ImportConfig, ImportSettings};
pub use csv::{BankFormatProfile, CsvColumnMapping, CsvError, CsvParser, DecimalStyle};
pub use dedup::{is_duplicate, DuplicateFilter, DEFAULT_SNAPSHOT_LIMIT};
pub use detect::{detect, FormatTag, ImportSource, ACCEPTED_EXTENSIONS};
pub use error::ImportError;
pub use invoice_match::{find_match, InvoiceMatcher, MatchKind};
pub use mt940::Mt940Parser;
pub use pdf::{
    extract_from_pdf, ExtractedRow, ExtractionError, ExtractionRequest, HttpStatementExtractor, RawAmount,
    StatementExtractor,
};
pub use pipeline::{parse_file, parse_text, parser_for, ParsedStatement, RawImportFile, StatementParser};
pub use session::{
    process_transactions, EnhancedTransaction, ImportSession, ImportStep, ReviewSummary, SessionError,
    SessionSnapshot,
};
