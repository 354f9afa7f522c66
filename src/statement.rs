//! Structured statement data handed over by institution-specific parsers

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::AdjustmentType;

/// One physical card covered by a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementCard {
    /// Short tag printed next to each line (usually the last four digits)
    pub tag: String,
    pub holder: Option<String>,
    pub is_primary: bool,
}

/// A charge, refund or payment line of a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub date: NaiveDate,
    pub description: String,
    /// Positive for charges, negative for refunds
    pub amount: BigDecimal,
    pub currency: String,
    pub installment_current: Option<u32>,
    pub installment_total: Option<u32>,
    pub is_plan_z: bool,
    pub card_tag: Option<String>,
    /// Payments made towards the card; never reconciled
    pub is_payment: bool,
}

impl ParsedTransaction {
    /// A plain single-payment charge
    pub fn charge(date: NaiveDate, description: &str, amount: BigDecimal, currency: &str) -> Self {
        Self {
            date,
            description: description.to_string(),
            amount,
            currency: currency.to_string(),
            installment_current: None,
            installment_total: None,
            is_plan_z: false,
            card_tag: None,
            is_payment: false,
        }
    }

    pub fn with_installment(mut self, current: u32, total: u32) -> Self {
        self.installment_current = Some(current);
        self.installment_total = Some(total);
        self
    }

    pub fn with_card_tag(mut self, tag: &str) -> Self {
        self.card_tag = Some(tag.to_string());
        self
    }

    pub fn as_payment(mut self) -> Self {
        self.is_payment = true;
        self
    }

    pub fn as_plan_z(mut self) -> Self {
        self.is_plan_z = true;
        self
    }

    /// Whether the line is one installment of a multi-payment purchase
    pub fn is_installment(&self) -> bool {
        self.installment_current.is_some() && self.installment_total.is_some_and(|t| t > 1)
    }

    /// Positions still to be billed after this one
    pub fn remaining_installments(&self) -> std::ops::RangeInclusive<u32> {
        match (self.installment_current, self.installment_total) {
            (Some(current), Some(total)) if current < total => (current + 1)..=total,
            #[allow(clippy::reversed_empty_ranges)]
            _ => 1..=0,
        }
    }
}

/// A bank-added charge or credit (tax, interest, fees, credits)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAdjustment {
    pub adjustment_type: AdjustmentType,
    pub description: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub card_tag: Option<String>,
}

impl ParsedAdjustment {
    pub fn new(
        adjustment_type: AdjustmentType,
        description: &str,
        amount: BigDecimal,
        currency: &str,
    ) -> Self {
        Self {
            adjustment_type,
            description: description.to_string(),
            amount,
            currency: currency.to_string(),
            card_tag: None,
        }
    }

    pub fn with_card_tag(mut self, tag: &str) -> Self {
        self.card_tag = Some(tag.to_string());
        self
    }

    /// Amount with the sign its type dictates
    pub fn signed_amount(&self) -> BigDecimal {
        self.adjustment_type.signed_amount(&self.amount)
    }
}

/// Totals as printed by the bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementTotals {
    pub home_currency: String,
    pub home_total: BigDecimal,
    pub foreign_currency: Option<String>,
    pub foreign_total: Option<BigDecimal>,
}

/// Structured view of one credit-card statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub institution: String,
    pub card_brand: Option<String>,
    pub cards: Vec<StatementCard>,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
    pub previous_closing_date: Option<NaiveDate>,
    pub previous_due_date: Option<NaiveDate>,
    pub next_closing_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    pub totals: StatementTotals,
    pub transactions: Vec<ParsedTransaction>,
    pub adjustments: Vec<ParsedAdjustment>,
}

impl ParsedStatement {
    /// An empty statement for the given period dates
    pub fn new(
        institution: &str,
        closing_date: NaiveDate,
        due_date: NaiveDate,
        home_currency: &str,
        home_total: BigDecimal,
    ) -> Self {
        Self {
            institution: institution.to_string(),
            card_brand: None,
            cards: Vec::new(),
            closing_date,
            due_date,
            previous_closing_date: None,
            previous_due_date: None,
            next_closing_date: None,
            next_due_date: None,
            totals: StatementTotals {
                home_currency: home_currency.to_string(),
                home_total,
                foreign_currency: None,
                foreign_total: None,
            },
            transactions: Vec::new(),
            adjustments: Vec::new(),
        }
    }

    /// Whether the statement covers more than one physical card
    pub fn is_consolidated(&self) -> bool {
        self.cards.len() > 1
    }

    pub fn primary_card_tag(&self) -> Option<&str> {
        self.cards
            .iter()
            .find(|c| c.is_primary)
            .map(|c| c.tag.as_str())
    }

    /// Lines that take part in matching: everything except payments
    pub fn chargeable_transactions(&self) -> impl Iterator<Item = (usize, &ParsedTransaction)> {
        self.transactions
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_payment)
    }

    /// Narrow a consolidated statement to one card
    ///
    /// Lines tagged for `card_tag` are kept; untagged lines are kept only when
    /// `card_tag` is the primary card and `untagged_to_primary` is set. The
    /// totals are recomputed from what remains since the printed figure
    /// covers every card.
    pub fn for_card(&self, card_tag: Option<&str>, untagged_to_primary: bool) -> ParsedStatement {
        let Some(tag) = card_tag else {
            return self.clone();
        };
        if !self.is_consolidated() {
            return self.clone();
        }

        let target_is_primary = self.primary_card_tag() == Some(tag);
        let keep = |line_tag: &Option<String>| match line_tag {
            Some(t) => t == tag,
            None => untagged_to_primary && target_is_primary,
        };

        let mut filtered = self.clone();
        filtered.transactions.retain(|t| keep(&t.card_tag));
        filtered.adjustments.retain(|a| keep(&a.card_tag));
        filtered.recompute_totals();
        filtered
    }

    /// Set the totals to the sum of the non-payment lines and adjustments
    pub fn recompute_totals(&mut self) {
        let home = self.totals.home_currency.clone();
        self.totals.home_total = self.currency_sum(&home);
        if let Some(foreign) = self.totals.foreign_currency.clone() {
            self.totals.foreign_total = Some(self.currency_sum(&foreign));
        }
    }

    fn currency_sum(&self, currency: &str) -> BigDecimal {
        let transactions: BigDecimal = self
            .chargeable_transactions()
            .filter(|(_, t)| t.currency.eq_ignore_ascii_case(currency))
            .map(|(_, t)| t.amount.clone())
            .sum();
        let adjustments: BigDecimal = self
            .adjustments
            .iter()
            .filter(|a| a.currency.eq_ignore_ascii_case(currency))
            .map(|a| a.signed_amount())
            .sum();
        transactions + adjustments
    }
}
