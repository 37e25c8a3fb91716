use kontoauszug_core::NormalizedTransaction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{non_empty, parse_amount, parse_date};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalStyle {
    /// The separator that appears last is the decimal one; a lone comma is decimal.
    #[default]
    Auto,
    Comma,
    Point,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvColumnMapping {
    pub date_column: Option<usize>,
    pub amount_column: Option<usize>,
    pub debit_column: Option<usize>,
    pub credit_column: Option<usize>,
    pub description_column: Option<usize>,
    pub reference_column: Option<usize>,
    pub counterpart_column: Option<usize>,
    pub date_format: String,
}

impl Default for CsvColumnMapping {
    fn default() -> Self {
        Self {
            date_column: None,
            amount_column: None,
            debit_column: None,
            credit_column: None,
            description_column: None,
            reference_column: None,
            counterpart_column: None,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

/// Named column layout for one bank's delimited-text export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankFormatProfile {
    pub name: String,
    pub mapping: CsvColumnMapping,
    /// The first record is a header and is dropped. Header rows are skipped
    /// anyway when they fail to parse, so `false` is the tolerant choice.
    pub has_header: bool,
    /// `None` sniffs `;`, `,` or tab from the first line.
    pub delimiter: Option<char>,
    pub decimal: DecimalStyle,
}

impl Default for BankFormatProfile {
    fn default() -> Self {
        Self::generic()
    }
}

impl BankFormatProfile {
    /// `date;amount;description;reference`
    pub fn generic() -> Self {
        Self {
            name: "generic".to_string(),
            mapping: CsvColumnMapping {
                date_column: Some(0),
                amount_column: Some(1),
                description_column: Some(2),
                reference_column: Some(3),
                ..CsvColumnMapping::default()
            },
            has_header: false,
            delimiter: None,
            decimal: DecimalStyle::Auto,
        }
    }

    /// `date;description;debit;credit`
    pub fn generic_debit_credit() -> Self {
        Self {
            name: "generic_debit_credit".to_string(),
            mapping: CsvColumnMapping {
                date_column: Some(0),
                description_column: Some(1),
                debit_column: Some(2),
                credit_column: Some(3),
                ..CsvColumnMapping::default()
            },
            has_header: false,
            delimiter: None,
            decimal: DecimalStyle::Auto,
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::generic(), Self::generic_debit_credit()]
    }

    fn validate(&self) -> Result<(), CsvError> {
        let m = &self.mapping;
        if m.date_column.is_none() {
            return Err(CsvError::MissingColumn(format!("{}: date_column", self.name)));
        }
        if m.amount_column.is_none() && (m.debit_column.is_none() || m.credit_column.is_none()) {
            return Err(CsvError::MissingColumn(format!(
                "{}: amount_column or debit_column + credit_column",
                self.name
            )));
        }
        if let Some(d) = self.delimiter {
            if !d.is_ascii() {
                return Err(CsvError::InvalidDelimiter(d));
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    CsvError(#[from] ::csv::Error),
    #[error("Profile is missing a required column: {0}")]
    MissingColumn(String),
    #[error("Delimiter must be a single ASCII character, got '{0}'")]
    InvalidDelimiter(char),
}

pub struct CsvParser {
    profile: BankFormatProfile,
}

impl CsvParser {
    pub fn new(profile: BankFormatProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &BankFormatProfile {
        &self.profile
    }

    /// Rows without a parseable date and a non-zero amount are skipped.
    pub fn parse_str(&self, content: &str) -> Result<Vec<NormalizedTransaction>, CsvError> {
        self.profile.validate()?;

        let content = content.trim_start_matches('\u{feff}');
        let delimiter = self.profile.delimiter.unwrap_or_else(|| sniff_delimiter(content));

        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(::csv::Trim::All)
            .delimiter(delimiter as u8)
            .from_reader(content.as_bytes());

        let mut transactions = Vec::new();
        let mut skipped = 0usize;

        for (idx, result) in reader.records().enumerate() {
            let record = result?;

            if idx == 0 && self.profile.has_header {
                continue;
            }
            if record.iter().all(|f| f.is_empty()) {
                continue;
            }

            match self.parse_row(&record) {
                Some(tx) => transactions.push(tx),
                None => {
                    skipped += 1;
                    tracing::debug!(row = idx + 1, profile = %self.profile.name, "skipping CSV row");
                }
            }
        }

        tracing::debug!(
            parsed = transactions.len(),
            skipped,
            delimiter = %delimiter.escape_default(),
            "CSV statement parsed"
        );

        Ok(transactions)
    }

    fn parse_row(&self, record: &::csv::StringRecord) -> Option<NormalizedTransaction> {
        let mapping = &self.profile.mapping;
        let decimal = self.profile.decimal;

        let date = mapping
            .date_column
            .and_then(|col| record.get(col))
            .and_then(|s| parse_date(s, Some(&mapping.date_format)))?;

        let amount = if let Some(col) = mapping.amount_column {
            parse_amount(record.get(col)?, decimal)?
        } else {
            let field = |col: Option<usize>| {
                col.and_then(|c| record.get(c))
                    .filter(|s| !s.trim().is_empty())
                    .and_then(|s| parse_amount(s, decimal))
                    .filter(|m| !m.is_zero())
            };
            // Debit columns are outbound, credit columns inbound, whatever sign the bank printed.
            match (field(mapping.debit_column), field(mapping.credit_column)) {
                (Some(debit), _) => -debit.abs(),
                (None, Some(credit)) => credit.abs(),
                (None, None) => return None,
            }
        };

        if amount.is_zero() {
            return None;
        }

        let text = |col: Option<usize>| col.and_then(|c| record.get(c)).and_then(non_empty);

        let mut tx = NormalizedTransaction::new(date, amount);
        tx.description = text(mapping.description_column).unwrap_or_default();
        tx.reference = text(mapping.reference_column);
        tx.counterpart_name = text(mapping.counterpart_column);
        Some(tx)
    }
}

impl crate::pipeline::StatementParser for CsvParser {
    fn parse(&self, content: &str) -> Result<Vec<NormalizedTransaction>, crate::ImportError> {
        Ok(self.parse_str(content)?)
    }
}

/// Picks the most frequent of `;`, `,` and tab outside quotes on the first
/// non-empty line. Ties go to `;`, the usual choice of German banks.
fn sniff_delimiter(content: &str) -> char {
    let line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();

    let mut counts = [(';', 0usize), (',', 0), ('\t', 0)];
    let mut in_quotes = false;
    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(entry) = counts.iter_mut().find(|(d, _)| *d == c) {
            entry.1 += 1;
        }
    }

    counts
        .iter()
        .fold((';', 0usize), |best, &(d, n)| if n > best.1 { (d, n) } else { best })
        .0
}
