//! Pairing of parsed statement lines with recorded ledger entries

use bigdecimal::BigDecimal;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::billing::calendar;
use crate::config::EngineConfig;
use crate::reconciliation::rules::{self, CandidateFacts, MatchType, Score};
use crate::reconciliation::similarity::{amounts_match, description_similarity};
use crate::statement::{ParsedAdjustment, ParsedStatement, ParsedTransaction};
use crate::traits::LedgerStorage;
use crate::types::*;
use crate::utils::validation::validate_credit_card;

/// Verdict for one parsed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationItem {
    /// Position of the line in the statement's transaction list
    pub index: usize,
    pub transaction: ParsedTransaction,
    pub matched_entry: Option<LedgerEntry>,
    pub match_type: MatchType,
    /// 0-100
    pub confidence: u32,
    pub similarity: u32,
    /// Name of the rule that produced the verdict
    pub rule: Option<String>,
}

/// Verdict for one parsed adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentReconciliation {
    pub index: usize,
    pub adjustment: ParsedAdjustment,
    /// Existing adjustment of the same type and amount, if any
    pub existing_adjustment_id: Option<String>,
    pub should_apply: bool,
}

/// Aggregate figures of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub total_transactions: usize,
    pub exact: usize,
    pub partial: usize,
    pub not_found: usize,
    pub discrepancy: usize,
    pub adjustments_to_apply: usize,
    pub adjustments_existing: usize,
    /// Authoritative total printed on the statement
    pub pdf_total: BigDecimal,
    /// Matched entries plus existing adjustments
    pub stored_total: BigDecimal,
    pub difference: BigDecimal,
}

/// Output of [`reconcile_lines`] and [`ReconciliationEngine::reconcile`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub account_id: String,
    pub year: i32,
    pub month: u32,
    /// Existing period for the statement month, if one was already created
    pub period_id: Option<String>,
    /// Statement narrowed to the target card
    pub statement: ParsedStatement,
    pub items: Vec<ReconciliationItem>,
    pub adjustment_items: Vec<AdjustmentReconciliation>,
    pub summary: ReconciliationSummary,
}

/// Date range scanned for candidate entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateWindow {
    /// Inclusive start: the day after the previous closing
    pub start: NaiveDate,
    /// Inclusive end: due date plus the configured buffer
    pub end: NaiveDate,
    /// Start of the redundant month-start..closing scan
    pub month_start: NaiveDate,
    pub closing: NaiveDate,
}

impl CandidateWindow {
    pub fn for_statement(statement: &ParsedStatement, due_buffer_days: i64) -> Self {
        let previous_closing = statement
            .previous_closing_date
            .unwrap_or_else(|| calendar::shift_date(statement.closing_date, -1));
        Self {
            start: calendar::next_day(previous_closing),
            end: statement.due_date + Duration::days(due_buffer_days),
            month_start: calendar::month_start(statement.closing_date),
            closing: statement.closing_date,
        }
    }
}

fn candidate_facts(line: &ParsedTransaction, entry: &LedgerEntry) -> CandidateFacts {
    let entry_position = entry.installment_position();
    CandidateFacts {
        amount_matches: amounts_match(&line.amount, &entry.amount),
        same_installment_position: line.installment_current.is_some()
            && line.installment_current == entry_position,
        either_installment: line.is_installment() || entry.installment.is_some(),
        days_apart: calendar::days_apart(line.date, entry.date),
        similarity: description_similarity(&line.description, &entry.description),
    }
}

struct Best<'a> {
    slot: usize,
    entry: &'a LedgerEntry,
    score: Score,
    facts: CandidateFacts,
}

fn better(candidate: &Best<'_>, current: &Option<Best<'_>>) -> bool {
    match current {
        None => true,
        Some(best) => {
            candidate.score.confidence > best.score.confidence
                || (candidate.score.confidence == best.score.confidence
                    && candidate.facts.days_apart < best.facts.days_apart)
        }
    }
}

/// Match every chargeable line against the candidate pool
///
/// Pure: the same inputs always yield the same verdicts. A candidate claimed
/// by one line is never offered to a later line.
pub fn reconcile_lines(
    account_id: &str,
    statement: &ParsedStatement,
    candidates: &[LedgerEntry],
    existing_adjustments: &[Adjustment],
    period_id: Option<String>,
) -> ReconciliationResult {
    let mut claimed = vec![false; candidates.len()];
    let mut items = Vec::new();

    for (index, line) in statement.chargeable_transactions() {
        let mut best: Option<Best<'_>> = None;
        let mut best_discrepancy: Option<Best<'_>> = None;

        for (slot, entry) in candidates.iter().enumerate() {
            if claimed[slot] {
                continue;
            }
            let facts = candidate_facts(line, entry);
            let score = rules::score(&facts);
            if score.is_match() {
                let candidate = Best {
                    slot,
                    entry,
                    score,
                    facts,
                };
                if better(&candidate, &best) {
                    best = Some(candidate);
                }
            } else if let Some(score) = rules::score_discrepancy(&facts) {
                let candidate = Best {
                    slot,
                    entry,
                    score,
                    facts,
                };
                if better(&candidate, &best_discrepancy) {
                    best_discrepancy = Some(candidate);
                }
            }
        }

        let item = match best.or(best_discrepancy) {
            Some(winner) => {
                claimed[winner.slot] = true;
                ReconciliationItem {
                    index,
                    transaction: line.clone(),
                    matched_entry: Some(winner.entry.clone()),
                    match_type: winner.score.match_type,
                    confidence: winner.score.confidence,
                    similarity: winner.facts.similarity,
                    rule: winner.score.rule.map(str::to_string),
                }
            }
            None => ReconciliationItem {
                index,
                transaction: line.clone(),
                matched_entry: None,
                match_type: MatchType::NotFound,
                confidence: 0,
                similarity: 0,
                rule: None,
            },
        };
        items.push(item);
    }

    let adjustment_items = reconcile_adjustments(&statement.adjustments, existing_adjustments);
    let summary = summarize(statement, &items, &adjustment_items, existing_adjustments);
    let closing = statement.closing_date;

    ReconciliationResult {
        account_id: account_id.to_string(),
        year: closing.year(),
        month: closing.month(),
        period_id,
        statement: statement.clone(),
        items,
        adjustment_items,
        summary,
    }
}

/// An incoming adjustment already exists when one of the same type has a matching amount
pub fn reconcile_adjustments(
    incoming: &[ParsedAdjustment],
    existing: &[Adjustment],
) -> Vec<AdjustmentReconciliation> {
    let mut used: HashSet<&str> = HashSet::new();
    incoming
        .iter()
        .enumerate()
        .map(|(index, adjustment)| {
            let found = existing.iter().find(|e| {
                !used.contains(e.id.as_str())
                    && e.adjustment_type == adjustment.adjustment_type
                    && amounts_match(&e.amount, &adjustment.amount)
            });
            if let Some(e) = found {
                used.insert(e.id.as_str());
            }
            AdjustmentReconciliation {
                index,
                adjustment: adjustment.clone(),
                existing_adjustment_id: found.map(|e| e.id.clone()),
                should_apply: found.is_none(),
            }
        })
        .collect()
}

fn summarize(
    statement: &ParsedStatement,
    items: &[ReconciliationItem],
    adjustment_items: &[AdjustmentReconciliation],
    existing_adjustments: &[Adjustment],
) -> ReconciliationSummary {
    let count = |kind: MatchType| items.iter().filter(|i| i.match_type == kind).count();
    let matched: BigDecimal = items
        .iter()
        .filter(|i| matches!(i.match_type, MatchType::Exact | MatchType::Partial))
        .filter_map(|i| i.matched_entry.as_ref())
        .map(|e| e.amount.clone())
        .sum();
    let adjustments: BigDecimal = existing_adjustments.iter().map(|a| a.amount.clone()).sum();
    let stored_total = matched + adjustments;
    let pdf_total = statement.totals.home_total.clone();

    ReconciliationSummary {
        total_transactions: items.len(),
        exact: count(MatchType::Exact),
        partial: count(MatchType::Partial),
        not_found: count(MatchType::NotFound),
        discrepancy: count(MatchType::Discrepancy),
        adjustments_to_apply: adjustment_items.iter().filter(|a| a.should_apply).count(),
        adjustments_existing: adjustment_items.iter().filter(|a| !a.should_apply).count(),
        difference: &pdf_total - &stored_total,
        pdf_total,
        stored_total,
    }
}

/// Loads candidates from storage and runs [`reconcile_lines`]
pub struct ReconciliationEngine<S: LedgerStorage> {
    storage: S,
    config: EngineConfig,
}

impl<S: LedgerStorage> ReconciliationEngine<S> {
    pub fn new(storage: S, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    /// Reconcile a statement against the recorded entries of a card
    pub async fn reconcile(
        &self,
        statement: &ParsedStatement,
        account_id: &str,
    ) -> LedgerResult<ReconciliationResult> {
        let account = self
            .storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        validate_credit_card(&account)?;

        let statement = statement.for_card(
            account.card_tag.as_deref(),
            self.config.untagged_lines_to_primary,
        );
        let candidates = self.load_candidates(&account, &statement).await?;

        let closing = statement.closing_date;
        let period = self
            .storage
            .find_period(&account.id, closing.year(), closing.month())
            .await?;
        let existing_adjustments = match &period {
            Some(p) => self.storage.get_adjustments(&p.id).await?,
            None => Vec::new(),
        };

        debug!(
            account_id = %account.id,
            candidates = candidates.len(),
            lines = statement.transactions.len(),
            "Reconciling statement"
        );

        let result = reconcile_lines(
            &account.id,
            &statement,
            &candidates,
            &existing_adjustments,
            period.map(|p| p.id),
        );

        info!(
            account_id = %account.id,
            year = result.year,
            month = result.month,
            exact = result.summary.exact,
            partial = result.summary.partial,
            not_found = result.summary.not_found,
            discrepancy = result.summary.discrepancy,
            difference = %result.summary.difference,
            "Statement reconciled"
        );

        Ok(result)
    }

    async fn load_candidates(
        &self,
        account: &Account,
        statement: &ParsedStatement,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let window = CandidateWindow::for_statement(statement, self.config.due_date_buffer_days);
        let primary = self
            .storage
            .get_account_entries(&account.id, Some(window.start), Some(window.end))
            .await?;
        let redundant = self
            .storage
            .get_account_entries(&account.id, Some(window.month_start), Some(window.closing))
            .await?;

        let mut seen = HashSet::new();
        let mut candidates: Vec<LedgerEntry> = primary
            .into_iter()
            .chain(redundant)
            .filter(|e| e.kind != EntryKind::Transfer && e.adjustment_id.is_none())
            .filter(|e| seen.insert(e.id.clone()))
            .collect();
        candidates.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(candidates)
    }
}
