//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{LedgerError, LedgerResult};

const ENV_PREFIX: &str = "CARD_LEDGER_";

/// Tunables shared by the reconciliation, import and billing engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Days past the due date still scanned for candidate entries
    pub due_date_buffer_days: i64,
    /// Number of monthly installments a Plan-Z charge is split into
    pub plan_z_installments: u32,
    /// Timeout of ordinary units of work
    pub default_timeout_secs: u64,
    /// Timeout of imports and payments, which may write dozens of rows
    pub extended_timeout_secs: u64,
    /// Attribute untagged lines of a consolidated statement to the primary card
    pub untagged_lines_to_primary: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            due_date_buffer_days: 5,
            plan_z_installments: 3,
            default_timeout_secs: 5,
            extended_timeout_secs: 30,
            untagged_lines_to_primary: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> LedgerResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LedgerError::Validation(format!("Invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `CARD_LEDGER_*` environment variables
    pub fn from_env() -> LedgerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> LedgerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(value) = var("DUE_DATE_BUFFER_DAYS") {
            config.due_date_buffer_days = parse_var("DUE_DATE_BUFFER_DAYS", &value)?;
        }
        if let Some(value) = var("PLAN_Z_INSTALLMENTS") {
            config.plan_z_installments = parse_var("PLAN_Z_INSTALLMENTS", &value)?;
        }
        if let Some(value) = var("DEFAULT_TIMEOUT_SECS") {
            config.default_timeout_secs = parse_var("DEFAULT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = var("EXTENDED_TIMEOUT_SECS") {
            config.extended_timeout_secs = parse_var("EXTENDED_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = var("UNTAGGED_LINES_TO_PRIMARY") {
            config.untagged_lines_to_primary = parse_var("UNTAGGED_LINES_TO_PRIMARY", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.due_date_buffer_days < 0 {
            return Err(LedgerError::Validation(
                "due_date_buffer_days cannot be negative".to_string(),
            ));
        }
        if self.plan_z_installments < 2 {
            return Err(LedgerError::Validation(
                "plan_z_installments must be at least 2".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn extended_timeout(&self) -> Duration {
        Duration::from_secs(self.extended_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> LedgerResult<T> {
    value.trim().parse().map_err(|_| {
        LedgerError::Validation(format!("{}{} has invalid value '{}'", ENV_PREFIX, name, value))
    })
}
