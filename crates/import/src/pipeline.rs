use std::path::Path;

use kontoauszug_core::NormalizedTransaction;

use crate::camt053::Camt053Parser;
use crate::csv::{BankFormatProfile, CsvParser};
use crate::detect::{detect, FormatTag, ImportSource};
use crate::error::ImportError;
use crate::mt940::Mt940Parser;
use crate::pdf::{extract_from_pdf, ExtractionError, StatementExtractor};

/// Turns statement text into transactions. Every implementation applies the
/// same sign convention: credit positive, debit negative.
pub trait StatementParser: Send + Sync {
    fn parse(&self, content: &str) -> Result<Vec<NormalizedTransaction>, ImportError>;
}

pub fn parser_for(format: FormatTag, profile: &BankFormatProfile) -> Box<dyn StatementParser> {
    match format {
        FormatTag::GeneralCsv => Box::new(CsvParser::new(profile.clone())),
        FormatTag::Mt940 => Box::new(Mt940Parser),
        FormatTag::Camt053 => Box::new(Camt053Parser),
    }
}

/// An uploaded file, held in memory until parsed.
#[derive(Debug, Clone)]
pub struct RawImportFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl RawImportFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self { file_name: file_name.into(), content: content.into() }
    }

    pub async fn read(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { file_name, content })
    }

    /// UTF-8 with an optional BOM, else Latin-1. Binary content is rejected.
    pub fn text(&self) -> Result<String, ImportError> {
        let bytes = self.content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&self.content);
        if bytes.contains(&0) {
            return Err(ImportError::Encoding(format!("{} looks like a binary file", self.file_name)));
        }
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => {
                tracing::debug!(file = %self.file_name, "not UTF-8, decoding as Latin-1");
                Ok(bytes.iter().map(|&b| b as char).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    /// `None` for PDF statements, which bypass format detection.
    pub format: Option<FormatTag>,
    pub transactions: Vec<NormalizedTransaction>,
}

pub fn parse_text(
    content: &str,
    file_name: &str,
    profile: &BankFormatProfile,
) -> Result<(FormatTag, Vec<NormalizedTransaction>), ImportError> {
    let format = detect(content, file_name);
    tracing::debug!(file = file_name, %format, "detected statement format");
    let transactions = parser_for(format, profile).parse(content)?;
    Ok((format, transactions))
}

/// Runs one uploaded file through detection and parsing. An empty result is
/// an error so callers never enter review with nothing to show.
pub async fn parse_file(
    file: &RawImportFile,
    profile: &BankFormatProfile,
    extractor: Option<&dyn StatementExtractor>,
) -> Result<ParsedStatement, ImportError> {
    let (format, transactions) = match ImportSource::classify(&file.file_name)? {
        ImportSource::Pdf => {
            let extractor = extractor.ok_or(ExtractionError::NotConfigured)?;
            (None, extract_from_pdf(&file.content, &file.file_name, extractor).await?)
        }
        ImportSource::Text => {
            let text = file.text()?;
            let (format, transactions) = parse_text(&text, &file.file_name, profile)?;
            (Some(format), transactions)
        }
    };

    if transactions.is_empty() {
        return Err(ImportError::NoTransactionsFound(file.file_name.clone()));
    }

    tracing::debug!(file = %file.file_name, count = transactions.len(), "statement parsed");
    Ok(ParsedStatement { format, transactions })
}
