use kontoauszug_core::{Money, NormalizedTransaction, OpenInvoice};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Invoice total equals the incoming amount.
    Amount,
    /// Invoice number appears in the description or reference.
    Reference,
    /// Chosen during review.
    Manual,
}

/// Suggests the open invoice an incoming payment settles. Suggestions are
/// advisory and only applied on commit.
#[derive(Debug, Clone, Copy)]
pub struct InvoiceMatcher {
    pub amount_tolerance: Money,
}

impl Default for InvoiceMatcher {
    fn default() -> Self {
        Self { amount_tolerance: Money::from_cents(1) }
    }
}

impl InvoiceMatcher {
    pub fn new(amount_tolerance: Money) -> Self {
        Self { amount_tolerance }
    }

    /// Amount matches take precedence over reference matches. Outgoing and
    /// zero amounts never match.
    pub fn find_match<'a>(
        &self,
        tx: &NormalizedTransaction,
        open_invoices: &'a [OpenInvoice],
    ) -> Option<(&'a OpenInvoice, MatchKind)> {
        if !tx.amount.is_positive() {
            return None;
        }

        if let Some(inv) = open_invoices
            .iter()
            .find(|inv| inv.amount.is_within(tx.amount, self.amount_tolerance))
        {
            return Some((inv, MatchKind::Amount));
        }

        let haystack = format!(
            "{} {}",
            tx.description,
            tx.reference.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        open_invoices
            .iter()
            .find(|inv| {
                let number = inv.invoice_number.trim().to_lowercase();
                !number.is_empty() && haystack.contains(&number)
            })
            .map(|inv| (inv, MatchKind::Reference))
    }
}

pub fn find_match<'a>(tx: &NormalizedTransaction, open_invoices: &'a [OpenInvoice]) -> Option<&'a OpenInvoice> {
    InvoiceMatcher::default().find_match(tx, open_invoices).map(|(inv, _)| inv)
}
