use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use kontoauszug_core::{Money, NormalizedTransaction};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ExtractionConfig;
use crate::csv::DecimalStyle;
use crate::error::ImportError;
use crate::util::{non_empty, parse_amount, parse_date};

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("extraction service unreachable: {0}")]
    Transport(String),
    #[error("extraction service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("extraction service reported: {0}")]
    Service(String),
    #[error("unreadable extraction response: {0}")]
    InvalidResponse(String),
    #[error("no extraction service configured")]
    NotConfigured,
}

/// Body sent to the extraction service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub file_name: String,
    pub file_base64: String,
    pub mime_type: String,
}

impl ExtractionRequest {
    pub fn pdf(file_name: &str, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.to_string(),
            file_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: "application/pdf".to_string(),
        }
    }
}

/// Services answer with either a JSON number or a formatted string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl RawAmount {
    fn to_money(&self) -> Option<Money> {
        match self {
            RawAmount::Number(n) => Decimal::from_f64_retain(*n).map(Money::from_decimal),
            RawAmount::Text(s) => parse_amount(s, DecimalStyle::Auto),
        }
    }
}

/// One row as returned by the service, before sign normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedRow {
    pub date: String,
    pub amount: RawAmount,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default, alias = "counterpartName")]
    pub counterpart_name: Option<String>,
    #[serde(default, rename = "type")]
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    success: bool,
    #[serde(default)]
    transactions: Vec<ExtractedRow>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
pub trait StatementExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<ExtractedRow>, ExtractionError>;
}

/// JSON-over-HTTP client for an extraction service.
pub struct HttpStatementExtractor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpStatementExtractor {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), api_key })
    }

    /// The API key is read from the environment variable named in the config.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let endpoint = config.endpoint.as_deref().ok_or(ExtractionError::NotConfigured)?;
        let api_key = config.api_key_env.as_deref().and_then(|var| match std::env::var(var) {
            Ok(key) => non_empty(&key),
            Err(_) => {
                tracing::warn!(var, "extraction API key variable is not set");
                None
            }
        });
        Self::new(endpoint, api_key, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl StatementExtractor for HttpStatementExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<ExtractedRow>, ExtractionError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Status { status, body });
        }

        let parsed: ExtractionResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

        if !parsed.success {
            return Err(ExtractionError::Service(
                parsed.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(parsed.transactions)
    }
}

/// Sends a PDF statement to `extractor` and normalizes what comes back.
pub async fn extract_from_pdf(
    bytes: &[u8],
    file_name: &str,
    extractor: &dyn StatementExtractor,
) -> Result<Vec<NormalizedTransaction>, ImportError> {
    let request = ExtractionRequest::pdf(file_name, bytes);
    let rows = extractor.extract(&request).await?;
    let total = rows.len();

    let transactions: Vec<_> = rows.iter().filter_map(normalize_row).collect();
    tracing::debug!(
        file = file_name,
        rows = total,
        kept = transactions.len(),
        "normalized extracted rows"
    );
    Ok(transactions)
}

fn normalize_row(row: &ExtractedRow) -> Option<NormalizedTransaction> {
    let date = parse_date(&row.date, None)?;
    let raw = row.amount.to_money()?;

    let amount = match row.direction.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("credit") | Some("income") => raw.abs(),
        Some("debit") | Some("expense") => -raw.abs(),
        _ => raw,
    };
    if amount.is_zero() {
        return None;
    }

    let mut tx = NormalizedTransaction::new(date, amount);
    tx.description = row.description.as_deref().map(str::trim).unwrap_or_default().to_string();
    tx.reference = row.reference.as_deref().and_then(non_empty);
    tx.counterpart_name = row.counterpart_name.as_deref().and_then(non_empty);
    Some(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct CannedExtractor {
        response: Result<Vec<ExtractedRow>, ()>,
        seen: Mutex<Vec<ExtractionRequest>>,
    }

    impl CannedExtractor {
        fn rows(json: &str) -> Self {
            Self { response: Ok(serde_json::from_str(json).unwrap()), seen: Mutex::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self { response: Err(()), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl StatementExtractor for CannedExtractor {
        async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<ExtractedRow>, ExtractionError> {
            self.seen.lock().unwrap().push(request.clone());
            self.response
                .clone()
                .map_err(|_| ExtractionError::Service("could not read document".into()))
        }
    }

    // ── request ──────────────────────────────────────────────────────────────

    #[test]
    fn request_is_base64_encoded_camel_case() {
        let request = ExtractionRequest::pdf("auszug.pdf", b"%PDF-1.4");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["fileName"], "auszug.pdf");
        assert_eq!(json["fileBase64"], "JVBERi0xLjQ=");
        assert_eq!(json["mimeType"], "application/pdf");
    }

    // ── normalization ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn applies_sign_convention() {
        let extractor = CannedExtractor::rows(
            r#"[
                {"date": "2024-02-01", "amount": 45.0, "type": "debit", "description": "Strom"},
                {"date": "15.02.2024", "amount": "1.190,00", "type": "credit", "counterpartName": "Kunde"},
                {"date": "2024-02-20", "amount": -12.5, "description": "Gebühr"}
            ]"#,
        );
        let txs = extract_from_pdf(b"%PDF", "auszug.pdf", &extractor).await.unwrap();
        assert_eq!(txs.len(), 3);
        assert_eq!(txs[0].amount, Money::from_cents(-4500));
        assert_eq!(txs[1].amount, Money::from_cents(119_000));
        assert_eq!(txs[1].date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
        assert_eq!(txs[1].counterpart_name.as_deref(), Some("Kunde"));
        assert_eq!(txs[2].amount, Money::from_cents(-1250));

        let seen = extractor.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].file_name, "auszug.pdf");
    }

    #[tokio::test]
    async fn drops_rows_without_date_or_amount() {
        let extractor = CannedExtractor::rows(
            r#"[
                {"date": "", "amount": 10},
                {"date": "2024-02-01", "amount": 0},
                {"date": "2024-02-01", "amount": "n/a"},
                {"date": "2024-02-02", "amount": "10,00", "type": "CREDIT"}
            ]"#,
        );
        let txs = extract_from_pdf(b"%PDF", "a.pdf", &extractor).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, Money::from_cents(1000));
    }

    #[tokio::test]
    async fn service_failure_becomes_extraction_error() {
        let extractor = CannedExtractor::failing();
        let err = extract_from_pdf(b"%PDF", "a.pdf", &extractor).await.unwrap_err();
        assert!(matches!(err, ImportError::Extraction(ExtractionError::Service(_))));
        assert!(err.to_string().contains("CSV"));
    }

    #[test]
    fn response_shape() {
        let parsed: ExtractionResponse =
            serde_json::from_str(r#"{"success": false, "error": "scan too blurry"}"#).unwrap();
        assert!(!parsed.success);
        assert!(parsed.transactions.is_empty());
        assert_eq!(parsed.error.as_deref(), Some("scan too blurry"));
    }

    #[test]
    fn from_config_requires_endpoint() {
        let config = ExtractionConfig::default();
        assert!(matches!(
            HttpStatementExtractor::from_config(&config),
            Err(ExtractionError::NotConfigured)
        ));
    }
}
