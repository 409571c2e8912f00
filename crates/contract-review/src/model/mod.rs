//! Core domain types: contracts, audit rules, risk points and payment terms.
//!
//! Enum variants serialize to the lowercase slugs used on the wire
//! (`wind-turbine`, `non-standard`, `high`, ...). Records serialize with
//! camelCase field names.

mod contract;
mod risk;
mod rule;

pub use contract::{
    format_file_size, Contract, ContractQuery, ContractStandard, ContractStatus, ContractType,
    NewContract,
};
pub use risk::{PaymentTerm, RiskCount, RiskDraft, RiskLevel, RiskPoint, RiskType};
pub use rule::{AuditRule, RuleDraft, RuleQuery, DEFAULT_RULE_CATEGORY, DEFAULT_RULE_NAME};

/// Error returned when a slug does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl From<ParseEnumError> for crate::Error {
    fn from(err: ParseEnumError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
