use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::ImportError;

re!(re_mt940_statement_line, r"(?m)^\s*:61:");
re!(re_mt940_reference, r"(?m)^\s*:20:");
re!(re_mt940_account, r"(?m)^\s*:25:");

pub const ACCEPTED_EXTENSIONS: &[&str] = &["csv", "txt", "sta", "mt940", "xml", "pdf"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    GeneralCsv,
    Mt940,
    Camt053,
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatTag::GeneralCsv => write!(f, "general_csv"),
            FormatTag::Mt940 => write!(f, "mt940"),
            FormatTag::Camt053 => write!(f, "camt053"),
        }
    }
}

impl std::str::FromStr for FormatTag {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general_csv" | "csv" => Ok(FormatTag::GeneralCsv),
            "mt940" => Ok(FormatTag::Mt940),
            "camt053" | "camt.053" => Ok(FormatTag::Camt053),
            other => Err(format!("Unknown format: '{other}'")),
        }
    }
}

/// How a file enters the pipeline, decided from its extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSource {
    /// Text content, routed through [`detect`].
    Text,
    /// Sent to the external extraction service.
    Pdf,
}

impl ImportSource {
    pub fn classify(file_name: &str) -> Result<Self, ImportError> {
        match extension(file_name).as_deref() {
            Some("pdf") => Ok(ImportSource::Pdf),
            Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext) => Ok(ImportSource::Text),
            _ => Err(ImportError::UnsupportedFile(file_name.to_string())),
        }
    }
}

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// Classifies statement content. MT940 markers win over XML sniffing, and
/// anything unrecognized is handed to the CSV parser.
pub fn detect(content: &str, file_name: &str) -> FormatTag {
    let ext = extension(file_name);

    if matches!(ext.as_deref(), Some("sta") | Some("mt940"))
        || re_mt940_statement_line().is_match(content)
        || (re_mt940_reference().is_match(content) && re_mt940_account().is_match(content))
    {
        return FormatTag::Mt940;
    }

    let head = content.trim_start_matches('\u{feff}').trim_start();
    // Only an XML document qualifies; CSV narratives may mention the namespace.
    if head.starts_with('<')
        && (content.contains("<BkToCstmrStmt") || content.contains("camt.053") || content.contains("<Document"))
    {
        return FormatTag::Camt053;
    }

    FormatTag::GeneralCsv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mt940_by_statement_line_tag() {
        let content = ":20:STARTUMS\n:25:10020030/1234567\n:61:2401150115D45,00NTRFNONREF\n";
        assert_eq!(detect(content, "export.txt"), FormatTag::Mt940);
    }

    #[test]
    fn detects_mt940_by_header_tags_without_entries() {
        assert_eq!(detect(":20:STARTUMS\n:25:DE89370400440532013000\n", "a.txt"), FormatTag::Mt940);
    }

    #[test]
    fn detects_mt940_by_extension() {
        assert_eq!(detect("", "auszug.STA"), FormatTag::Mt940);
    }

    #[test]
    fn detects_camt053_by_root() {
        let xml = r#"<?xml version="1.0"?><Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02"><BkToCstmrStmt/></Document>"#;
        assert_eq!(detect(xml, "statement.xml"), FormatTag::Camt053);
    }

    #[test]
    fn mt940_markers_take_priority_over_xml() {
        let content = "<Document>\n:61:2401150115C10,00NTRF\n";
        assert_eq!(detect(content, "weird.xml"), FormatTag::Mt940);
    }

    #[test]
    fn csv_mentioning_camt_namespace_stays_csv() {
        let content = "2024-01-15;150,00;Export camt.053 <BkToCstmrStmt> umgestellt\n";
        assert_eq!(detect(content, "umsatz.csv"), FormatTag::GeneralCsv);
    }

    #[test]
    fn falls_back_to_csv() {
        assert_eq!(detect("2024-01-15;150,00;Miete", "umsatz.csv"), FormatTag::GeneralCsv);
        assert_eq!(detect("", "empty.csv"), FormatTag::GeneralCsv);
    }

    #[test]
    fn inline_colon_tags_are_not_mt940() {
        assert_eq!(detect("2024-01-15;10,00;Ref :61: inside text", "a.csv"), FormatTag::GeneralCsv);
    }

    #[test]
    fn classify_by_extension() {
        assert_eq!(ImportSource::classify("Auszug.PDF").unwrap(), ImportSource::Pdf);
        assert_eq!(ImportSource::classify("umsatz.csv").unwrap(), ImportSource::Text);
        assert_eq!(ImportSource::classify("x.mt940").unwrap(), ImportSource::Text);
        assert!(matches!(
            ImportSource::classify("photo.jpg"),
            Err(ImportError::UnsupportedFile(_))
        ));
        assert!(ImportSource::classify("no_extension").is_err());
    }

    #[test]
    fn format_tag_roundtrip() {
        use std::str::FromStr;
        for tag in [FormatTag::GeneralCsv, FormatTag::Mt940, FormatTag::Camt053] {
            assert_eq!(FormatTag::from_str(&tag.to_string()).unwrap(), tag);
        }
    }
}
