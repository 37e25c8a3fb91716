use thiserror::Error;

use crate::camt053::CamtError;
use crate::csv::CsvError;
use crate::pdf::ExtractionError;

/// Everything that can end an import attempt before the review step.
/// The `Display` text is what the user gets to see.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported file type '{0}'. Accepted: .csv, .txt, .sta, .mt940, .xml, .pdf")]
    UnsupportedFile(String),
    #[error("The file could not be read as text: {0}")]
    Encoding(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("The CSV file could not be parsed: {0}")]
    Csv(#[from] CsvError),
    #[error("The CAMT.053 file could not be parsed: {0}")]
    Camt(#[from] CamtError),
    #[error("No transactions found in {0}")]
    NoTransactionsFound(String),
    #[error("PDF extraction failed ({0}). Please try a CSV, MT940 or CAMT.053 export instead")]
    Extraction(#[from] ExtractionError),
    #[error("Unknown bank format profile: {0}")]
    UnknownProfile(String),
}

impl ImportError {
    /// Parse failures and empty files get the same treatment: stay on upload, no retry.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            ImportError::Encoding(_)
                | ImportError::Csv(_)
                | ImportError::Camt(_)
                | ImportError::NoTransactionsFound(_)
        )
    }
}
