//! # Card Ledger Core
//!
//! Credit-card statement reconciliation and billing-cycle engine for a
//! personal-finance ledger.
//!
//! ## Features
//!
//! - **Reconciliation**: scores parsed statement lines against recorded entries
//!   and claims each entry at most once
//! - **Import**: creates missing entries (installment plans included), links
//!   matches and stores statement adjustments in one unit of work
//! - **Billing periods**: DRAFT -> CLOSED -> PAID lifecycle with idempotent
//!   recomputation, Plan-Z splitting at payment and multi-month projection
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use card_ledger_core::{utils::MemoryStorage, Account, CardLedger};
//!
//! let storage = MemoryStorage::new();
//! let _ledger = CardLedger::new(storage);
//! let _card = Account::credit_card(
//!     "visa".to_string(),
//!     "Visa Gold".to_string(),
//!     "USD".to_string(),
//!     15,
//!     5,
//! );
//! ```

pub mod billing;
pub mod config;
pub mod import;
pub mod ledger;
pub mod reconciliation;
pub mod statement;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use billing::cycle::{BillingCycleEngine, PaymentReceipt, PeriodDetail, ProjectedPeriod};
pub use config::EngineConfig;
pub use import::{DecisionAction, DecisionTarget, ImportApplier, ImportDecision, ImportOutcome};
pub use ledger::*;
pub use reconciliation::engine::{ReconciliationEngine, ReconciliationItem, ReconciliationResult};
pub use reconciliation::rules::MatchType;
pub use statement::*;
pub use traits::*;
pub use types::*;

// Re-export entry patterns for convenience
pub use ledger::entry::patterns;
