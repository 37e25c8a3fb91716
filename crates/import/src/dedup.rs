use kontoauszug_core::{ExistingTransaction, Money, NormalizedTransaction};

/// How many recent ledger rows a session loads for duplicate checks.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 1000;

/// Flags imported rows that are already booked. Duplicates stay in the list
/// and are only deselected.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateFilter {
    pub tolerance: Money,
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self { tolerance: Money::from_cents(1) }
    }
}

impl DuplicateFilter {
    pub fn new(tolerance: Money) -> Self {
        Self { tolerance }
    }

    /// Same date and absolute amounts closer than the tolerance. The sign is
    /// ignored because ledger rows store magnitudes.
    pub fn is_duplicate(&self, tx: &NormalizedTransaction, existing: &[ExistingTransaction]) -> bool {
        existing
            .iter()
            .any(|e| e.date == tx.date && e.amount.abs().is_within(tx.amount.abs(), self.tolerance))
    }
}

pub fn is_duplicate(tx: &NormalizedTransaction, existing: &[ExistingTransaction]) -> bool {
    DuplicateFilter::default().is_duplicate(tx, existing)
}
