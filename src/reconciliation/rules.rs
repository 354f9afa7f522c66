//! Match scoring policy as an ordered list of rules
//!
//! Each rule is a predicate over the facts of one (statement line, ledger
//! entry) pair plus a confidence formula. The first rule whose predicate
//! holds decides the verdict for that pair.

use serde::{Deserialize, Serialize};

/// Dates at most this many days apart count as the same day
pub const DATE_WINDOW_DAYS: i64 = 1;

pub const SAME_POSITION_CONFIDENCE: u32 = 98;
pub const INSTALLMENT_STRONG_SIMILARITY: u32 = 80;
pub const INSTALLMENT_STRONG_CONFIDENCE: u32 = 95;
pub const DATED_SIMILARITY: u32 = 50;
pub const DATED_BASE_CONFIDENCE: u32 = 90;
pub const INSTALLMENT_WEAK_SIMILARITY: u32 = 60;
pub const INSTALLMENT_WEAK_BASE_CONFIDENCE: u32 = 85;
pub const DATED_PARTIAL_BASE_CONFIDENCE: u32 = 70;
pub const UNDATED_SIMILARITY: u32 = 70;
pub const UNDATED_PARTIAL_BASE_CONFIDENCE: u32 = 50;
/// Cap on the similarity bonus added to exact verdicts
pub const MAX_SIMILARITY_BONUS: u32 = 10;

pub const DISCREPANCY_SIMILARITY: u32 = 85;
pub const DISCREPANCY_BASE_CONFIDENCE: u32 = 40;

/// Verdict for one statement line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Partial,
    NotFound,
    Discrepancy,
}

/// Everything the rules look at for one candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFacts {
    pub amount_matches: bool,
    /// Both sides carry the same installment position
    pub same_installment_position: bool,
    /// At least one side is an installment
    pub either_installment: bool,
    pub days_apart: i64,
    /// Description similarity, 0-100
    pub similarity: u32,
}

impl CandidateFacts {
    fn within_date_window(&self) -> bool {
        self.days_apart <= DATE_WINDOW_DAYS
    }
}

/// One scoring rule; all rules require matching amounts
#[derive(Debug, Clone, Copy)]
pub struct MatchRule {
    pub name: &'static str,
    pub match_type: MatchType,
    applies: fn(&CandidateFacts) -> bool,
    confidence: fn(&CandidateFacts) -> u32,
}

impl MatchRule {
    pub fn applies(&self, facts: &CandidateFacts) -> bool {
        facts.amount_matches && (self.applies)(facts)
    }

    pub fn confidence(&self, facts: &CandidateFacts) -> u32 {
        (self.confidence)(facts).min(100)
    }
}

fn similarity_bonus(facts: &CandidateFacts) -> u32 {
    (facts.similarity / 10).min(MAX_SIMILARITY_BONUS)
}

fn same_position(f: &CandidateFacts) -> bool {
    f.same_installment_position
}

fn installment_strong(f: &CandidateFacts) -> bool {
    f.either_installment && f.similarity >= INSTALLMENT_STRONG_SIMILARITY
}

fn dated_similar(f: &CandidateFacts) -> bool {
    f.within_date_window() && f.similarity >= DATED_SIMILARITY
}

fn installment_weak(f: &CandidateFacts) -> bool {
    f.either_installment && f.similarity >= INSTALLMENT_WEAK_SIMILARITY
}

fn dated_dissimilar(f: &CandidateFacts) -> bool {
    f.within_date_window() && f.similarity < DATED_SIMILARITY
}

fn undated_similar(f: &CandidateFacts) -> bool {
    !f.within_date_window() && f.similarity >= UNDATED_SIMILARITY
}

/// The scoring policy, evaluated top to bottom
pub const MATCH_RULES: [MatchRule; 6] = [
    MatchRule {
        name: "same_installment_position",
        match_type: MatchType::Exact,
        applies: same_position,
        confidence: |_| SAME_POSITION_CONFIDENCE,
    },
    MatchRule {
        name: "installment_similar_description",
        match_type: MatchType::Exact,
        applies: installment_strong,
        confidence: |_| INSTALLMENT_STRONG_CONFIDENCE,
    },
    MatchRule {
        name: "same_day_similar_description",
        match_type: MatchType::Exact,
        applies: dated_similar,
        confidence: |f| DATED_BASE_CONFIDENCE + similarity_bonus(f),
    },
    MatchRule {
        name: "installment_related_description",
        match_type: MatchType::Exact,
        applies: installment_weak,
        confidence: |f| INSTALLMENT_WEAK_BASE_CONFIDENCE + similarity_bonus(f),
    },
    MatchRule {
        name: "same_day_different_description",
        match_type: MatchType::Partial,
        applies: dated_dissimilar,
        confidence: |f| DATED_PARTIAL_BASE_CONFIDENCE + f.similarity / 5,
    },
    MatchRule {
        name: "similar_description_other_day",
        match_type: MatchType::Partial,
        applies: undated_similar,
        confidence: |f| UNDATED_PARTIAL_BASE_CONFIDENCE + f.similarity / 5,
    },
];

/// Verdict of scoring one candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub match_type: MatchType,
    pub confidence: u32,
    pub rule: Option<&'static str>,
}

impl Score {
    pub fn not_found() -> Self {
        Self {
            match_type: MatchType::NotFound,
            confidence: 0,
            rule: None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self.match_type, MatchType::Exact | MatchType::Partial)
    }
}

/// Score a candidate pair with the first applicable rule
pub fn score(facts: &CandidateFacts) -> Score {
    MATCH_RULES
        .iter()
        .find(|rule| rule.applies(facts))
        .map(|rule| Score {
            match_type: rule.match_type,
            confidence: rule.confidence(facts),
            rule: Some(rule.name),
        })
        .unwrap_or_else(Score::not_found)
}

/// Score a pair whose amounts differ but which clearly describe the same charge
pub fn score_discrepancy(facts: &CandidateFacts) -> Option<Score> {
    let plausible = !facts.amount_matches
        && facts.within_date_window()
        && facts.similarity >= DISCREPANCY_SIMILARITY;
    plausible.then(|| Score {
        match_type: MatchType::Discrepancy,
        confidence: DISCREPANCY_BASE_CONFIDENCE + facts.similarity / 5,
        rule: Some("same_day_amount_differs"),
    })
}
