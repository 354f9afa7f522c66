//! Which entries belong to a period, and how a period's line items must change

use bigdecimal::BigDecimal;
use std::collections::{HashMap, HashSet};

use crate::billing::boundary::PeriodWindow;
use crate::types::*;

/// Card charges falling in the window, de-duplicated by id, in input order
pub fn assign_entries<'a>(
    card_id: &str,
    window: &PeriodWindow,
    entries: &'a [LedgerEntry],
) -> Vec<&'a LedgerEntry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| e.is_card_charge(card_id) && window.contains(e.date))
        .filter(|e| seen.insert(e.id.as_str()))
        .collect()
}

/// Changes needed to bring a period's line items in line with its entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineItemDiff {
    /// Entries with no line item yet
    pub to_add: Vec<LedgerEntry>,
    /// Line items whose entry no longer belongs to the period
    pub to_remove: Vec<PeriodLineItem>,
    /// Line items carrying their entry's new amount
    pub to_update: Vec<PeriodLineItem>,
}

impl LineItemDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_update.is_empty()
    }
}

/// Diff current line items against the entries that should be linked
pub fn diff_line_items(current: &[PeriodLineItem], matching: &[&LedgerEntry]) -> LineItemDiff {
    let by_entry: HashMap<&str, &PeriodLineItem> =
        current.iter().map(|i| (i.entry_id.as_str(), i)).collect();
    let wanted: HashSet<&str> = matching.iter().map(|e| e.id.as_str()).collect();

    let mut diff = LineItemDiff::default();
    for entry in matching {
        match by_entry.get(entry.id.as_str()) {
            None => diff.to_add.push((*entry).clone()),
            Some(item) if item.amount != entry.amount => {
                let mut updated = (*item).clone();
                updated.amount = entry.amount.clone();
                diff.to_update.push(updated);
            }
            Some(_) => {}
        }
    }
    diff.to_remove = current
        .iter()
        .filter(|i| !wanted.contains(i.entry_id.as_str()))
        .cloned()
        .collect();
    diff
}

/// The three figures of a draft period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodTotals {
    pub calculated: BigDecimal,
    pub adjustments: BigDecimal,
    pub total: BigDecimal,
}

impl PeriodTotals {
    pub fn compute(charges: &[&LedgerEntry], adjustments: &[Adjustment]) -> Self {
        let calculated: BigDecimal = charges.iter().map(|e| e.amount.clone()).sum();
        let adjustments: BigDecimal = adjustments.iter().map(|a| a.amount.clone()).sum();
        Self {
            total: &calculated + &adjustments,
            calculated,
            adjustments,
        }
    }

    /// Whether the period already carries these figures
    pub fn matches(&self, period: &BillingPeriod) -> bool {
        period.calculated_amount == self.calculated
            && period.adjustments_amount == self.adjustments
            && period.total_amount == self.total
    }

    pub fn apply_to(&self, period: &mut BillingPeriod) {
        period.calculated_amount = self.calculated.clone();
        period.adjustments_amount = self.adjustments.clone();
        period.total_amount = self.total.clone();
    }
}
