use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ContractType, RiskLevel};

/// Category given to rules imported without one.
pub const DEFAULT_RULE_CATEGORY: &str = "未分类";

/// Name given to rules imported without one.
pub const DEFAULT_RULE_NAME: &str = "未命名规则";

/// A configurable audit rule that risk findings are checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRule {
    /// Unique identifier.
    pub id: String,
    /// Rule category, e.g. `商务条款`.
    pub category: String,
    /// Rule name.
    pub name: String,
    /// The agreed standard, e.g. `预付款比例不得超过30%`.
    pub standard: String,
    /// Severity of a violation.
    pub level: RiskLevel,
    /// What the rule checks.
    pub description: String,
    /// Contract types the rule applies to. Never empty.
    pub contract_types: Vec<ContractType>,
    /// Creation date.
    pub created_at: NaiveDate,
    /// Last modification date.
    pub updated_at: NaiveDate,
}

impl AuditRule {
    /// Whether the rule applies to `contract_type`.
    #[must_use]
    pub fn applies_to(&self, contract_type: ContractType) -> bool {
        self.contract_types.contains(&contract_type)
    }
}

/// Writable fields of an audit rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleDraft {
    /// Rule category.
    pub category: String,
    /// Rule name.
    pub name: String,
    /// The agreed standard.
    pub standard: String,
    /// Severity of a violation.
    pub level: RiskLevel,
    /// What the rule checks.
    pub description: String,
    /// Contract types the rule applies to.
    pub contract_types: Vec<ContractType>,
}

impl RuleDraft {
    /// Apply the defaults for blank fields.
    ///
    /// Trims text, fills in the default category and name, and widens an
    /// empty contract-type list to every type. Duplicate types are dropped.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.category = non_blank_or(&self.category, DEFAULT_RULE_CATEGORY);
        self.name = non_blank_or(&self.name, DEFAULT_RULE_NAME);
        self.standard = self.standard.trim().to_string();
        self.description = self.description.trim().to_string();

        let mut types = Vec::with_capacity(ContractType::ALL.len());
        for ty in ContractType::ALL {
            if self.contract_types.contains(&ty) {
                types.push(ty);
            }
        }
        if types.is_empty() {
            types.extend(ContractType::ALL);
        }
        self.contract_types = types;
        self
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Filters for listing audit rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleQuery {
    /// Exact category.
    pub category: Option<String>,
    /// Exact level.
    pub level: Option<RiskLevel>,
    /// Rules applicable to this contract type.
    pub contract_type: Option<ContractType>,
    /// Case-insensitive substring of name or description.
    pub text: Option<String>,
}

impl RuleQuery {
    /// Whether `rule` passes every filter that is set.
    #[must_use]
    pub fn matches(&self, rule: &AuditRule) -> bool {
        if let Some(category) = &self.category {
            if &rule.category != category {
                return false;
            }
        }
        if let Some(level) = self.level {
            if rule.level != level {
                return false;
            }
        }
        if let Some(ty) = self.contract_type {
            if !rule.applies_to(ty) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            if !rule.name.to_lowercase().contains(&needle)
                && !rule.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(level: RiskLevel, types: Vec<ContractType>) -> AuditRule {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        AuditRule {
            id: "r1".to_string(),
            category: "商务条款".to_string(),
            name: "付款条件审核".to_string(),
            standard: "预付款比例不得超过30%".to_string(),
            level,
            description: "审核合同中的付款条件".to_string(),
            contract_types: types,
            created_at: today,
            updated_at: today,
        }
    }

    #[test]
    fn test_normalized_fills_defaults() {
        let draft = RuleDraft {
            category: "  ".to_string(),
            name: String::new(),
            ..RuleDraft::default()
        }
        .normalized();

        assert_eq!(draft.category, DEFAULT_RULE_CATEGORY);
        assert_eq!(draft.name, DEFAULT_RULE_NAME);
        assert_eq!(draft.contract_types, ContractType::ALL.to_vec());
        assert_eq!(draft.level, RiskLevel::Medium);
    }

    #[test]
    fn test_normalized_dedups_types_in_canonical_order() {
        let draft = RuleDraft {
            contract_types: vec![
                ContractType::EnergyStorage,
                ContractType::WindTurbine,
                ContractType::EnergyStorage,
            ],
            ..RuleDraft::default()
        }
        .normalized();

        assert_eq!(
            draft.contract_types,
            vec![ContractType::WindTurbine, ContractType::EnergyStorage]
        );
    }

    #[test]
    fn test_query_matches() {
        let r = rule(RiskLevel::High, vec![ContractType::WindTurbine]);

        assert!(RuleQuery::default().matches(&r));
        assert!(RuleQuery {
            level: Some(RiskLevel::High),
            ..RuleQuery::default()
        }
        .matches(&r));
        assert!(!RuleQuery {
            contract_type: Some(ContractType::EnergyStorage),
            ..RuleQuery::default()
        }
        .matches(&r));
        assert!(RuleQuery {
            text: Some("付款".to_string()),
            ..RuleQuery::default()
        }
        .matches(&r));
        assert!(!RuleQuery {
            category: Some("法务条款".to_string()),
            ..RuleQuery::default()
        }
        .matches(&r));
    }

    #[test]
    fn test_rule_serializes_dates_as_plain_dates() {
        let value = serde_json::to_value(rule(RiskLevel::Low, ContractType::ALL.to_vec())).unwrap();
        assert_eq!(value["createdAt"], "2024-05-01");
        assert_eq!(value["contractTypes"][1], "energy-storage");
    }
}
