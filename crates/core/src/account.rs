use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BankAccountId(pub i64);

impl fmt::Display for BankAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: Option<BankAccountId>,
    pub name: String,
    pub iban: Option<String>,
    pub balance: super::money::Money,
}

impl BankAccount {
    pub fn new(name: &str, iban: Option<&str>) -> Self {
        BankAccount {
            id: None,
            name: name.to_string(),
            iban: iban.map(str::to_string),
            balance: super::money::Money::zero(),
        }
    }
}
