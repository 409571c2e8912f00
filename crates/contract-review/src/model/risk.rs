use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParseEnumError;

/// Severity of a risk finding or audit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Must be fixed before signing.
    High,
    /// Should be reviewed.
    #[default]
    Medium,
    /// Informational.
    Low,
}

impl RiskLevel {
    /// Wire slug.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Report label, e.g. `高风险`.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::High => "高风险",
            Self::Medium => "中风险",
            Self::Low => "低风险",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ParseEnumError::new("risk level", other)),
        }
    }
}

/// Area of the contract a finding concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskType {
    /// Commercial terms (payment, pricing, delivery).
    Commercial,
    /// Legal terms (liability, disputes).
    Legal,
    /// Technical terms (specifications, acceptance).
    Technical,
}

impl RiskType {
    /// Wire slug.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commercial => "commercial",
            Self::Legal => "legal",
            Self::Technical => "technical",
        }
    }

    /// Report label, e.g. `商务风险`.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Commercial => "商务风险",
            Self::Legal => "法务风险",
            Self::Technical => "技术风险",
        }
    }
}

impl fmt::Display for RiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "commercial" => Ok(Self::Commercial),
            "legal" => Ok(Self::Legal),
            "technical" => Ok(Self::Technical),
            other => Err(ParseEnumError::new("risk type", other)),
        }
    }
}

/// A risk finding recorded against a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPoint {
    /// Unique identifier.
    pub id: String,
    /// Owning contract.
    pub contract_id: String,
    /// Rule category, e.g. `商务条款`.
    pub category: String,
    /// Area of the finding.
    pub risk_type: RiskType,
    /// Severity.
    pub level: RiskLevel,
    /// What is wrong.
    pub description: String,
    /// Where in the contract, e.g. `第5.2条`.
    pub location: String,
    /// Suggested fix.
    pub suggestion: String,
    /// Rule that produced the finding, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Verbatim contract text the finding refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Writable fields of a risk point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskDraft {
    /// Rule category.
    #[serde(default)]
    pub category: String,
    /// Area of the finding.
    pub risk_type: RiskType,
    /// Severity.
    #[serde(default)]
    pub level: RiskLevel,
    /// What is wrong.
    #[serde(default)]
    pub description: String,
    /// Where in the contract.
    #[serde(default)]
    pub location: String,
    /// Suggested fix.
    #[serde(default)]
    pub suggestion: String,
    /// Rule that produced the finding.
    #[serde(default)]
    pub rule_id: Option<String>,
    /// Verbatim contract text.
    #[serde(default)]
    pub excerpt: Option<String>,
}

/// Number of risk points per level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskCount {
    /// High-risk findings.
    pub high: u32,
    /// Medium-risk findings.
    pub medium: u32,
    /// Low-risk findings.
    pub low: u32,
}

impl RiskCount {
    /// Count the levels of the given risk points.
    pub fn from_levels(levels: impl IntoIterator<Item = RiskLevel>) -> Self {
        let mut count = Self::default();
        for level in levels {
            count.add(level);
        }
        count
    }

    /// Record one more finding at `level`.
    pub fn add(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::High => self.high += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::Low => self.low += 1,
        }
    }

    /// Total number of findings.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.high + self.medium + self.low
    }

    /// The highest level present; `Low` when there are no findings.
    #[must_use]
    pub fn overall(&self) -> RiskLevel {
        if self.high > 0 {
            RiskLevel::High
        } else if self.medium > 0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// One milestone of a contract's payment schedule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentTerm {
    /// Milestone, e.g. `预付款`.
    pub node: String,
    /// Share of the contract value, e.g. `30%`.
    pub ratio: String,
    /// When the payment is due.
    pub time_regulation: String,
    /// Batch or installment label.
    pub batch: String,
    /// Free-form remark.
    pub note: String,
}
