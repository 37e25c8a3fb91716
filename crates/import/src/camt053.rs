use chrono::NaiveDate;
use kontoauszug_core::{Money, NormalizedTransaction};
use thiserror::Error;

use crate::util::{non_empty, parse_date};
use crate::xml::{XmlEvent, XmlScanner, XmlSyntaxError};

#[derive(Error, Debug)]
pub enum CamtError {
    #[error("malformed XML: {0}")]
    Malformed(String),
}

impl From<XmlSyntaxError> for CamtError {
    fn from(e: XmlSyntaxError) -> Self {
        CamtError::Malformed(format!("{} at byte {}", e.message, e.offset))
    }
}

/// ISO 20022 bank-to-customer statement. Each `Ntry` element becomes one transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct Camt053Parser;

impl Camt053Parser {
    pub fn parse_str(&self, content: &str) -> Result<Vec<NormalizedTransaction>, CamtError> {
        let mut stack: Vec<&str> = Vec::new();
        let mut entry: Option<(usize, EntryFields)> = None;
        let mut text = String::new();
        let mut out = Vec::new();

        for event in XmlScanner::new(content) {
            match event? {
                XmlEvent::Start { name, self_closing } => {
                    text.clear();
                    if self_closing {
                        continue;
                    }
                    stack.push(name);
                    if name == "Ntry" && entry.is_none() {
                        entry = Some((stack.len(), EntryFields::default()));
                    }
                }
                XmlEvent::Text(t) => {
                    if entry.is_some() {
                        text.push_str(&t);
                    }
                }
                XmlEvent::End { name } => {
                    match stack.last() {
                        Some(open) if *open == name => {}
                        Some(open) => {
                            return Err(CamtError::Malformed(format!(
                                "closing </{name}> does not match <{open}>"
                            )))
                        }
                        None => return Err(CamtError::Malformed(format!("unexpected </{name}>"))),
                    }

                    if let Some((depth, fields)) = entry.as_mut() {
                        if stack.len() == *depth {
                            if let Some(tx) = fields.finish() {
                                out.push(tx);
                            }
                            entry = None;
                        } else {
                            fields.assign(&stack[*depth..], text.trim());
                        }
                    }
                    text.clear();
                    stack.pop();
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(CamtError::Malformed(format!("element <{open}> is never closed")));
        }

        tracing::debug!(count = out.len(), "parsed CAMT.053 entries");
        Ok(out)
    }
}

impl crate::pipeline::StatementParser for Camt053Parser {
    fn parse(&self, content: &str) -> Result<Vec<NormalizedTransaction>, crate::ImportError> {
        Ok(self.parse_str(content)?)
    }
}

#[derive(Debug, Default)]
struct EntryFields {
    amount: Option<Money>,
    indicator: Option<String>,
    booking_date: Option<NaiveDate>,
    value_date: Option<NaiveDate>,
    unstructured: Vec<String>,
    additional_info: Option<String>,
    end_to_end_id: Option<String>,
    debtor_name: Option<String>,
    creditor_name: Option<String>,
}

impl EntryFields {
    /// `path` is relative to the `Ntry` element, ending with the element just closed.
    fn assign(&mut self, path: &[&str], value: &str) {
        if value.is_empty() {
            return;
        }

        match path {
            ["Amt"] => self.amount = value.parse::<Money>().ok(),
            ["CdtDbtInd"] => self.indicator = Some(value.to_ascii_uppercase()),
            ["BookgDt", "Dt" | "DtTm"] => {
                if self.booking_date.is_none() {
                    self.booking_date = parse_date(value, None);
                }
            }
            ["ValDt", "Dt" | "DtTm"] => {
                if self.value_date.is_none() {
                    self.value_date = parse_date(value, None);
                }
            }
            ["AddtlNtryInf"] => self.additional_info = non_empty(value),
            [.., "RmtInf", "Ustrd"] => self.unstructured.push(value.to_string()),
            [.., "Refs", "EndToEndId"] => {
                if self.end_to_end_id.is_none() && !value.eq_ignore_ascii_case("NOTPROVIDED") {
                    self.end_to_end_id = Some(value.to_string());
                }
            }
            _ => {
                if let Some(party) = related_party(path) {
                    let slot = match party {
                        "Dbtr" => &mut self.debtor_name,
                        _ => &mut self.creditor_name,
                    };
                    if slot.is_none() {
                        *slot = Some(value.to_string());
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> Option<NormalizedTransaction> {
        let magnitude = self.amount?.abs();
        let (amount, counterpart) = match self.indicator.as_deref() {
            Some("CRDT") => (magnitude, self.debtor_name.take()),
            Some("DBIT") => (-magnitude, self.creditor_name.take()),
            other => {
                tracing::debug!(indicator = ?other, "dropping entry without credit/debit indicator");
                return None;
            }
        };
        if amount.is_zero() {
            return None;
        }
        let date = self.booking_date.or(self.value_date)?;

        let mut tx = NormalizedTransaction::new(date, amount);
        tx.description = if self.unstructured.is_empty() {
            self.additional_info.take().unwrap_or_default()
        } else {
            self.unstructured.join(" ")
        };
        tx.reference = self.end_to_end_id.take();
        tx.counterpart_name = counterpart;
        Some(tx)
    }
}

/// Matches `…/RltdPties/Dbtr/Nm` and the newer `…/RltdPties/Dbtr/Pty/Nm`
/// (likewise `Cdtr`), returning the party tag.
fn related_party<'a>(path: &[&'a str]) -> Option<&'a str> {
    let idx = path.iter().rposition(|p| *p == "RltdPties")?;
    match &path[idx + 1..] {
        [party @ ("Dbtr" | "Cdtr"), "Nm"] | [party @ ("Dbtr" | "Cdtr"), "Pty", "Nm"] => Some(*party),
        _ => None,
    }
}
