use chrono::NaiveDate;
use kontoauszug_core::{Money, NormalizedTransaction};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::util::non_empty;

// :61: value date, optional entry date, mark, optional funds code, amount, rest.
re!(re_statement_line, r"^(\d{6})(\d{4})?(RC|RD|C|D)([A-Z])?(\d+(?:,\d*)?)(.*)$");
// Transaction type identification (N/F/S + three chars) in front of the references.
re!(re_type_code, r"^[NFS][A-Z0-9]{3}");
re!(re_tag, r"^:(\d{2}[A-Z]?):(.*)$");
re!(re_structured_info, r"^\d{3}\?");
re!(re_sepa_keyword, r"(EREF|KREF|MREF|CRED|DEBT|SVWZ|ABWA|ABWE|IBAN|BIC)\+");

/// Line-by-line MT940 scanner. Every `:61:` opens a record; `:86:` and its
/// continuation lines attach to the record opened last.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mt940Parser;

impl Mt940Parser {
    pub fn parse_str(&self, content: &str) -> Vec<NormalizedTransaction> {
        let mut transactions = Vec::new();
        let mut current: Option<BuildingEntry> = None;
        let mut in_information = false;

        for raw_line in content.lines() {
            let untrimmed = raw_line.trim_end_matches('\r');
            let line = untrimmed.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = re_tag().captures(line) {
                let tag = caps.get(1).map_or("", |m| m.as_str());
                let value = caps.get(2).map_or("", |m| m.as_str());
                in_information = false;

                match tag {
                    "61" => {
                        finish(current.take(), &mut transactions);
                        current = Some(BuildingEntry::open(value));
                    }
                    "86" => {
                        if let Some(entry) = current.as_mut() {
                            let value = untrimmed.trim_start().strip_prefix(":86:").unwrap_or(value);
                            entry.info.push(value.to_string());
                            in_information = true;
                        }
                    }
                    _ => finish(current.take(), &mut transactions),
                }
            } else if line.starts_with('-') || line.starts_with('{') {
                // Message trailer or SWIFT block header.
                in_information = false;
                finish(current.take(), &mut transactions);
            } else if in_information {
                // Wrapped lines keep their edge spaces; structured subfields are glued back verbatim.
                if let Some(entry) = current.as_mut() {
                    entry.info.push(untrimmed.to_string());
                }
            }
        }

        finish(current.take(), &mut transactions);

        tracing::debug!(parsed = transactions.len(), "MT940 statement parsed");
        transactions
    }
}

impl crate::pipeline::StatementParser for Mt940Parser {
    fn parse(&self, content: &str) -> Result<Vec<NormalizedTransaction>, crate::ImportError> {
        Ok(self.parse_str(content))
    }
}

struct StatementLine {
    date: NaiveDate,
    amount: Money,
    customer_reference: Option<String>,
}

struct BuildingEntry {
    /// `None` when the `:61:` line was malformed; the record is dropped on close.
    line: Option<StatementLine>,
    info: Vec<String>,
}

impl BuildingEntry {
    fn open(value: &str) -> Self {
        let line = parse_statement_line(value);
        if line.is_none() {
            tracing::debug!(line = value, "discarding malformed :61: record");
        }
        BuildingEntry { line, info: Vec::new() }
    }
}

fn finish(entry: Option<BuildingEntry>, out: &mut Vec<NormalizedTransaction>) {
    let Some(entry) = entry else { return };
    let Some(line) = entry.line else { return };

    let mut tx = NormalizedTransaction::new(line.date, line.amount);
    let info = parse_information(&entry.info);
    tx.description = info.description;
    tx.counterpart_name = info.counterpart_name;
    tx.reference = info.reference.or(line.customer_reference);
    out.push(tx);
}

fn parse_statement_line(value: &str) -> Option<StatementLine> {
    let caps = re_statement_line().captures(value.trim())?;

    let date = parse_yymmdd(caps.get(1)?.as_str())?;
    let magnitude = Decimal::from_str(&caps.get(5)?.as_str().replace(',', ".")).ok()?;
    let magnitude = Money::from_decimal(magnitude);
    if magnitude.is_zero() {
        return None;
    }

    // RC reverses a credit, RD reverses a debit.
    let amount = match caps.get(3)?.as_str() {
        "C" | "RD" => magnitude,
        "D" | "RC" => -magnitude,
        _ => return None,
    };

    let rest = caps.get(6).map_or("", |m| m.as_str()).trim();
    let rest = match re_type_code().find(rest) {
        Some(m) => &rest[m.end()..],
        None => rest,
    };
    let customer_reference = rest
        .split("//")
        .next()
        .and_then(non_empty)
        .filter(|r| !r.eq_ignore_ascii_case("NONREF"));

    Some(StatementLine { date, amount, customer_reference })
}

fn parse_yymmdd(s: &str) -> Option<NaiveDate> {
    let yy: i32 = s.get(0..2)?.parse().ok()?;
    let mm: u32 = s.get(2..4)?.parse().ok()?;
    let dd: u32 = s.get(4..6)?.parse().ok()?;
    let year = if yy < 80 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, mm, dd)
}

#[derive(Debug, Default, PartialEq)]
struct Information {
    description: String,
    reference: Option<String>,
    counterpart_name: Option<String>,
}

/// Interprets `:86:` text. German banks use the structured `NNN?00...?20...`
/// layout; everything else is taken verbatim as the description.
fn parse_information(lines: &[String]) -> Information {
    let Some(first) = lines.first() else {
        return Information::default();
    };

    if !re_structured_info().is_match(first) {
        let parts: Vec<&str> = lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
        return Information {
            description: parts.join(" "),
            ..Information::default()
        };
    }

    // Subfields wrap at arbitrary positions, so the lines are glued back together.
    let joined: String = lines.concat();
    let mut booking_text = String::new();
    let mut purpose = String::new();
    let mut name = String::new();

    for field in joined.split('?').skip(1) {
        let (Some(code), Some(content)) = (field.get(0..2), field.get(2..)) else {
            continue;
        };
        match code.parse::<u8>() {
            Ok(0) => booking_text.push_str(content),
            Ok(20..=29) | Ok(60..=63) => purpose.push_str(content),
            Ok(32..=33) => name.push_str(content),
            _ => {}
        }
    }

    let (description, reference) = split_sepa_purpose(&purpose);
    let description = if description.is_empty() {
        booking_text.trim().to_string()
    } else {
        description
    };

    Information {
        description,
        reference,
        counterpart_name: non_empty(&name),
    }
}

/// Splits `EREF+...SVWZ+...` purpose text into the free-text part and the
/// end-to-end reference. Text without keywords is returned unchanged.
fn split_sepa_purpose(purpose: &str) -> (String, Option<String>) {
    let keywords: Vec<_> = re_sepa_keyword().find_iter(purpose).collect();
    if keywords.is_empty() {
        return (purpose.trim().to_string(), None);
    }

    let mut reference = None;
    let mut remittance = None;
    let mut untagged = purpose[..keywords[0].start()].trim().to_string();

    for (i, kw) in keywords.iter().enumerate() {
        let end = keywords.get(i + 1).map_or(purpose.len(), |next| next.start());
        let value = purpose[kw.end()..end].trim();
        match kw.as_str() {
            "EREF+" if !value.eq_ignore_ascii_case("NOTPROVIDED") => {
                reference = non_empty(value);
            }
            "SVWZ+" => remittance = non_empty(value),
            _ => {}
        }
    }

    if let Some(text) = remittance {
        untagged = text;
    }
    (untagged, reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse(content: &str) -> Vec<NormalizedTransaction> {
        Mt940Parser.parse_str(content)
    }

    // ── :61: line ─────────────────────────────────────────────────────────────

    #[test]
    fn statement_line_debit() {
        let line = parse_statement_line("2401150115D45,00NTRFNONREF//B4A15").unwrap();
        assert_eq!(line.date, date(2024, 1, 15));
        assert_eq!(line.amount, Money::from_cents(-4500));
        assert_eq!(line.customer_reference, None);
    }

    #[test]
    fn statement_line_credit_with_reference() {
        let line = parse_statement_line("240116C1250,5NTRFKD-4711//BANKREF").unwrap();
        assert_eq!(line.amount, Money::from_cents(125050));
        assert_eq!(line.customer_reference.as_deref(), Some("KD-4711"));
    }

    #[test]
    fn statement_line_reversals() {
        assert!(parse_statement_line("240115RC10,00NTRF").unwrap().amount.is_negative());
        assert!(parse_statement_line("240115RD10,00NTRF").unwrap().amount.is_positive());
    }

    #[test]
    fn statement_line_funds_code() {
        let line = parse_statement_line("240115CR99,99NMSCNONREF").unwrap();
        assert_eq!(line.amount, Money::from_cents(9999));
    }

    #[test]
    fn statement_line_malformed() {
        assert!(parse_statement_line("garbage").is_none());
        assert!(parse_statement_line("241315C10,00NTRF").is_none());
        assert!(parse_statement_line("240115C0,00NTRF").is_none());
    }

    // ── :86: information ──────────────────────────────────────────────────────

    #[test]
    fn structured_information_fields() {
        let info = parse_information(&[
            "166?00GUTSCHRIFT?109075?20EREF+RE-2024-042?21SVWZ+Rechnung RE-2024-".to_string(),
            "042 Danke?30BYLADEM1001?31DE02120300000000202051?32Kunde Müller".to_string(),
            "?33 GmbH".to_string(),
        ]);
        assert_eq!(info.description, "Rechnung RE-2024-042 Danke");
        assert_eq!(info.reference.as_deref(), Some("RE-2024-042"));
        assert_eq!(info.counterpart_name.as_deref(), Some("Kunde Müller GmbH"));
    }

    #[test]
    fn structured_information_without_sepa_keywords() {
        let info = parse_information(&["835?00ENTGELT?20Kontofuehrung 01/2024".to_string()]);
        assert_eq!(info.description, "Kontofuehrung 01/2024");
        assert_eq!(info.reference, None);
    }

    #[test]
    fn structured_information_falls_back_to_booking_text() {
        let info = parse_information(&["805?00ABSCHLUSS?32Bank".to_string()]);
        assert_eq!(info.description, "ABSCHLUSS");
    }

    #[test]
    fn eref_notprovided_is_ignored() {
        let (text, reference) = split_sepa_purpose("EREF+NOTPROVIDEDSVWZ+Miete");
        assert_eq!(text, "Miete");
        assert_eq!(reference, None);
    }

    // ── full statement ────────────────────────────────────────────────────────

    const SAMPLE_MT940: &str = "\
{1:F01BYLADEM1AXXX0000000000}{4:
:20:STARTUMS
:25:10020030/1234567
:28C:00001/001
:60F:C240112EUR1000,00
:61:2401150115D45,00NTRFNONREF//B4A15
:86:Invoice 2024-0099
:61:2401160116C150,00NTRFNONREF
:86:166?00GUTSCHRIFT?20EREF+E2E-1?21SVWZ+RE-2024-042?32Kunde
 Müller
:62F:C240116EUR1105,00
-}
";

    #[test]
    fn parses_full_statement() {
        let txs = parse(SAMPLE_MT940);
        assert_eq!(txs.len(), 2);

        assert_eq!(txs[0].date, date(2024, 1, 15));
        assert_eq!(txs[0].amount, Money::from_cents(-4500));
        assert_eq!(txs[0].description, "Invoice 2024-0099");

        assert_eq!(txs[1].amount, Money::from_cents(15000));
        assert_eq!(txs[1].description, "RE-2024-042");
        assert_eq!(txs[1].reference.as_deref(), Some("E2E-1"));
        assert_eq!(txs[1].counterpart_name.as_deref(), Some("Kunde Müller"));
    }

    #[test]
    fn unstructured_continuation_lines_are_joined() {
        let txs = parse(":61:240115C10,00NTRFREF-1\n:86:Zahlung fuer\nRechnung 17\n");
        assert_eq!(txs[0].description, "Zahlung fuer Rechnung 17");
        assert_eq!(txs[0].reference.as_deref(), Some("REF-1"));
    }

    #[test]
    fn structured_wrap_keeps_spaces_at_line_edges() {
        let txs = parse(
            ":61:240115C10,00NTRFNONREF\r\n:86:166?00GUTSCHRIFT?20SVWZ+Zahlung fuer \r\nRechnung 17?32Kunde\r\n Mueller GmbH\r\n",
        );
        assert_eq!(txs[0].description, "Zahlung fuer Rechnung 17");
        assert_eq!(txs[0].counterpart_name.as_deref(), Some("Kunde Mueller GmbH"));
    }

    #[test]
    fn record_without_information_is_kept() {
        let txs = parse(":61:240115C10,00NTRFNONREF\n");
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].description, "");
    }

    #[test]
    fn malformed_record_is_discarded_with_its_information() {
        let txs = parse(":61:24011XC10,00\n:86:belongs to broken record\n:61:240116D5,00NTRF\n");
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].amount, Money::from_cents(-500));
        assert_eq!(txs[0].description, "");
    }

    #[test]
    fn information_after_closing_balance_is_not_attached() {
        let txs = parse(":61:240115C10,00NTRF\n:86:mine\n:62F:C240115EUR10,00\n:86:statement level\n");
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].description, "mine");
    }

    #[test]
    fn no_statement_lines_yields_empty() {
        assert!(parse(":20:STARTUMS\n:25:123\n").is_empty());
        assert!(parse("").is_empty());
    }
}
