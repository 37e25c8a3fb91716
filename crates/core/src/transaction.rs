use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::BankAccountId;
use super::money::Money;

/// Canonical output of every statement parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub date: NaiveDate,
    pub amount: Money,
    #[serde(default)]
    pub description: String,
    pub reference: Option<String>,
    pub counterpart_name: Option<String>,
    pub category: Option<String>,
}

impl NormalizedTransaction {
    pub fn new(date: NaiveDate, amount: Money) -> Self {
        NormalizedTransaction {
            date,
            amount,
            description: String::new(),
            reference: None,
            counterpart_name: None,
            category: None,
        }
    }

    pub fn is_inbound(&self) -> bool {
        self.amount.is_positive()
    }

    /// Description, falling back to the counterpart name when empty.
    pub fn display_description(&self) -> &str {
        let desc = self.description.trim();
        if !desc.is_empty() {
            return desc;
        }
        self.counterpart_name.as_deref().map(str::trim).unwrap_or_default()
    }

    pub fn entry_type(&self) -> EntryType {
        if self.amount.is_negative() {
            EntryType::Expense
        } else {
            EntryType::Income
        }
    }

    pub fn to_record(&self, bank_account_id: Option<BankAccountId>) -> TransactionRecord {
        TransactionRecord {
            date: self.date,
            entry_type: self.entry_type(),
            amount: self.amount.abs(),
            description: self.display_description().to_string(),
            category: self.category.clone(),
            bank_account_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Income,
    Expense,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Income => write!(f, "income"),
            EntryType::Expense => write!(f, "expense"),
        }
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(EntryType::Income),
            "expense" => Ok(EntryType::Expense),
            other => Err(format!("Unknown entry type: '{other}'")),
        }
    }
}

/// Persistence request emitted by the commit step. `amount` is always the magnitude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    pub entry_type: EntryType,
    pub amount: Money,
    pub description: String,
    pub category: Option<String>,
    pub bank_account_id: Option<BankAccountId>,
}

/// Date and amount of an already stored transaction, used for duplicate checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingTransaction {
    pub date: NaiveDate,
    pub amount: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn record_for_outbound_is_expense_with_magnitude() {
        let mut tx = NormalizedTransaction::new(date(2024, 1, 15), Money::from_cents(-4500));
        tx.description = "Miete Januar".to_string();
        let record = tx.to_record(Some(BankAccountId(7)));
        assert_eq!(record.entry_type, EntryType::Expense);
        assert_eq!(record.amount, Money::from_cents(4500));
        assert_eq!(record.description, "Miete Januar");
        assert_eq!(record.bank_account_id, Some(BankAccountId(7)));
    }

    #[test]
    fn record_for_inbound_is_income() {
        let tx = NormalizedTransaction::new(date(2024, 1, 15), Money::from_cents(15000));
        assert_eq!(tx.to_record(None).entry_type, EntryType::Income);
        assert!(tx.is_inbound());
    }

    #[test]
    fn description_falls_back_to_counterpart() {
        let mut tx = NormalizedTransaction::new(date(2024, 1, 15), Money::from_cents(100));
        tx.description = "   ".to_string();
        tx.counterpart_name = Some("Stadtwerke".to_string());
        assert_eq!(tx.display_description(), "Stadtwerke");

        tx.counterpart_name = None;
        assert_eq!(tx.display_description(), "");
    }

    #[test]
    fn entry_type_roundtrip() {
        use std::str::FromStr;
        assert_eq!(EntryType::from_str(&EntryType::Income.to_string()).unwrap(), EntryType::Income);
        assert_eq!(EntryType::from_str(&EntryType::Expense.to_string()).unwrap(), EntryType::Expense);
        assert!(EntryType::from_str("transfer").is_err());
    }

    #[test]
    fn serializes_date_as_iso() {
        let tx = NormalizedTransaction::new(date(2024, 3, 1), Money::from_cents(100));
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["date"], "2024-03-01");
    }
}
