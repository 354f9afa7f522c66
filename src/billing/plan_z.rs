//! Deferred financing: one charge turned into equal monthly installments

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::billing::calendar;
use crate::reconciliation::similarity::{strip_installment_marker, to_cents};
use crate::types::*;

/// Result of splitting one Plan-Z charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanZSplit {
    /// The charge that gets deleted
    pub original: LedgerEntry,
    /// Replacement installments, first one billed in the current period
    pub installments: Vec<LedgerEntry>,
    /// How much less is owed this period: original minus first installment
    pub reduction: BigDecimal,
}

impl PlanZSplit {
    pub fn first(&self) -> Option<&LedgerEntry> {
        self.installments.first()
    }
}

/// Split `entry` into `count` monthly installments dated +0, +1, .. months
///
/// Installments are rounded to the cent; the last one absorbs the remainder
/// so they always add up to the original amount.
pub fn split_plan_z(entry: &LedgerEntry, count: u32) -> PlanZSplit {
    let count = count.max(1);
    let share = to_cents(&(&entry.amount / BigDecimal::from(count)));
    let group_id = uuid::Uuid::new_v4().to_string();
    let base = strip_installment_marker(&entry.description);

    let mut allotted = BigDecimal::from(0);
    let installments: Vec<LedgerEntry> = (1..=count)
        .map(|position| {
            let amount = if position == count {
                &entry.amount - &allotted
            } else {
                share.clone()
            };
            allotted += &amount;

            let status = if position == 1 {
                EntryStatus::Completed
            } else {
                EntryStatus::Pending
            };
            let mut installment = LedgerEntry::new(
                entry.kind,
                amount,
                entry.currency.clone(),
                calendar::shift_date(entry.date, position as i32 - 1),
                format!("{} ({}/{})", base, position, count),
            )
            .with_installment(group_id.clone(), position, count)
            .with_status(status);
            installment.category = entry.category.clone();
            installment.source_account_id = entry.source_account_id.clone();
            installment.destination_account_id = entry.destination_account_id.clone();
            installment
        })
        .collect();

    let reduction = &entry.amount - &installments[0].amount;
    PlanZSplit {
        original: entry.clone(),
        installments,
        reduction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn plan_z_charge(amount: &str) -> LedgerEntry {
        LedgerEntry::expense(
            "card",
            BigDecimal::from_str(amount).unwrap(),
            "USD".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            "Laptop".to_string(),
        )
        .with_plan_z(true)
    }

    #[test]
    fn test_even_split() {
        let split = split_plan_z(&plan_z_charge("900"), 3);
        let amounts: Vec<BigDecimal> = split
            .installments
            .iter()
            .map(|e| e.amount.clone())
            .collect();
        assert_eq!(amounts, vec![BigDecimal::from(300); 3]);
        assert_eq!(split.reduction, BigDecimal::from(600));

        let dates: Vec<NaiveDate> = split.installments.iter().map(|e| e.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            ]
        );
    }

    #[test]
    fn test_installments_share_group_and_drop_flag() {
        let split = split_plan_z(&plan_z_charge("900"), 3);
        let group = &split.installments[0].installment.as_ref().unwrap().group_id;
        for (i, e) in split.installments.iter().enumerate() {
            let installment = e.installment.as_ref().unwrap();
            assert_eq!(&installment.group_id, group);
            assert_eq!(installment.position, i as u32 + 1);
            assert!(!e.plan_z);
            assert_eq!(e.source_account_id.as_deref(), Some("card"));
        }
        assert_eq!(split.installments[0].status, EntryStatus::Completed);
        assert_eq!(split.installments[2].status, EntryStatus::Pending);
        assert_eq!(split.installments[1].description, "Laptop (2/3)");
    }

    #[test]
    fn test_uneven_split_keeps_total() {
        let split = split_plan_z(&plan_z_charge("100"), 3);
        let total: BigDecimal = split.installments.iter().map(|e| e.amount.clone()).sum();
        assert_eq!(total, BigDecimal::from(100));
        assert_eq!(split.installments[0].amount, BigDecimal::from_str("33.33").unwrap());
        assert_eq!(split.installments[2].amount, BigDecimal::from_str("33.34").unwrap());
        assert_eq!(split.reduction, BigDecimal::from_str("66.67").unwrap());
    }
}
