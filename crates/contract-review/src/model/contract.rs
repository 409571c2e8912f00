use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ParseEnumError, RiskCount};

/// Business line a contract belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractType {
    /// Wind turbine supply contracts.
    WindTurbine,
    /// Energy storage contracts.
    EnergyStorage,
}

impl ContractType {
    /// Every contract type, in display order.
    pub const ALL: [Self; 2] = [Self::WindTurbine, Self::EnergyStorage];

    /// Wire slug.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WindTurbine => "wind-turbine",
            Self::EnergyStorage => "energy-storage",
        }
    }

    /// Label used in reports, e.g. `风机合同`.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::WindTurbine => "风机合同",
            Self::EnergyStorage => "储能合同",
        }
    }

    /// Short label used in rule applicability columns, e.g. `风机`.
    #[must_use]
    pub fn short_label(self) -> &'static str {
        match self {
            Self::WindTurbine => "风机",
            Self::EnergyStorage => "储能",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "wind-turbine" => Ok(Self::WindTurbine),
            "energy-storage" => Ok(Self::EnergyStorage),
            other => Err(ParseEnumError::new("contract type", other)),
        }
    }
}

/// Whether the contract follows the company template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractStandard {
    /// Drafted from the standard template.
    Standard,
    /// Drafted by the counterparty or heavily modified.
    NonStandard,
}

impl ContractStandard {
    /// Wire slug.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::NonStandard => "non-standard",
        }
    }
}

impl fmt::Display for ContractStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStandard {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "standard" => Ok(Self::Standard),
            "non-standard" => Ok(Self::NonStandard),
            other => Err(ParseEnumError::new("contract standard", other)),
        }
    }
}

/// Review progress of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractStatus {
    /// Stored, not yet converted or reviewed.
    #[default]
    Pending,
    /// Review in progress.
    Analyzing,
    /// Converted and reviewed.
    Completed,
}

impl ContractStatus {
    /// Wire slug.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "analyzing" => Ok(Self::Analyzing),
            "completed" => Ok(Self::Completed),
            other => Err(ParseEnumError::new("contract status", other)),
        }
    }
}

/// A stored contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    /// Unique identifier (UUID string).
    pub id: String,
    /// Display name, the original file name.
    pub name: String,
    /// Business line.
    #[serde(rename = "type")]
    pub contract_type: ContractType,
    /// Template conformance.
    pub standard: ContractStandard,
    /// When the file was uploaded.
    pub upload_date: DateTime<Utc>,
    /// Name of the file inside the upload directory.
    pub file_name: String,
    /// Public path of the file, `/contracts/<file_name>`.
    pub file_url: String,
    /// Human readable size, e.g. `1.25 MB`.
    pub file_size: String,
    /// Size in bytes.
    pub file_size_bytes: u64,
    /// MIME type of the stored file.
    pub file_type: String,
    /// BLAKE3 hash of the file bytes.
    pub content_hash: String,
    /// Review progress.
    pub status: ContractStatus,
    /// Markdown produced by the conversion backend. Omitted in listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_content: Option<String>,
    /// Number of recorded risk points per level.
    pub risk_count: RiskCount,
}

impl Contract {
    /// Public URL for a stored file name.
    #[must_use]
    pub fn file_url_for(file_name: &str) -> String {
        format!("/contracts/{file_name}")
    }
}

/// Fields supplied when a contract is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
    /// Display name.
    pub name: String,
    /// Business line.
    pub contract_type: ContractType,
    /// Template conformance.
    pub standard: ContractStandard,
    /// Name of the file inside the upload directory.
    pub file_name: String,
    /// Size in bytes.
    pub file_size_bytes: u64,
    /// MIME type.
    pub file_type: String,
    /// BLAKE3 hash of the file bytes.
    pub content_hash: String,
    /// Initial status.
    pub status: ContractStatus,
    /// Converted Markdown, if conversion already ran.
    pub markdown_content: Option<String>,
}

/// Filters for listing contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractQuery {
    /// Substring of the contract name, matched with Unicode case folding.
    pub name_contains: Option<String>,
    /// Restrict to one contract type.
    pub contract_type: Option<ContractType>,
    /// Number of rows to skip.
    pub offset: usize,
    /// Maximum number of rows.
    pub limit: usize,
}

impl Default for ContractQuery {
    fn default() -> Self {
        Self {
            name_contains: None,
            contract_type: None,
            offset: 0,
            limit: 50,
        }
    }
}

/// Format a byte count as megabytes with two decimals, e.g. `0.01 MB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_type_slugs() {
        assert_eq!(ContractType::WindTurbine.to_string(), "wind-turbine");
        assert_eq!(
            "energy-storage".parse::<ContractType>().unwrap(),
            ContractType::EnergyStorage
        );
        assert!("solar".parse::<ContractType>().is_err());
    }

    #[test]
    fn test_contract_type_labels() {
        assert_eq!(ContractType::WindTurbine.label(), "风机合同");
        assert_eq!(ContractType::EnergyStorage.short_label(), "储能");
    }

    #[test]
    fn test_contract_type_serde_matches_slug() {
        for ty in ContractType::ALL {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }

    #[test]
    fn test_standard_and_status_parse() {
        assert_eq!(
            "non-standard".parse::<ContractStandard>().unwrap(),
            ContractStandard::NonStandard
        );
        assert_eq!(
            " completed ".parse::<ContractStatus>().unwrap(),
            ContractStatus::Completed
        );
        assert_eq!(ContractStatus::default(), ContractStatus::Pending);
    }

    #[test]
    fn test_parse_error_message() {
        let err = "x".parse::<ContractStandard>().unwrap_err();
        assert_eq!(err.to_string(), "unknown contract standard: 'x'");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0.00 MB");
        assert_eq!(format_file_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_file_size(1024 * 1024 * 5 / 2), "2.50 MB");
    }

    #[test]
    fn test_file_url_for() {
        assert_eq!(Contract::file_url_for("a.pdf"), "/contracts/a.pdf");
    }

    #[test]
    fn test_contract_serializes_camel_case() {
        let contract = Contract {
            id: "c1".to_string(),
            name: "供货合同.pdf".to_string(),
            contract_type: ContractType::WindTurbine,
            standard: ContractStandard::Standard,
            upload_date: Utc::now(),
            file_name: "供货合同.pdf".to_string(),
            file_url: "/contracts/供货合同.pdf".to_string(),
            file_size: "0.00 MB".to_string(),
            file_size_bytes: 10,
            file_type: "application/pdf".to_string(),
            content_hash: "h".to_string(),
            status: ContractStatus::Completed,
            markdown_content: None,
            risk_count: RiskCount::default(),
        };

        let value = serde_json::to_value(&contract).unwrap();
        assert_eq!(value["type"], "wind-turbine");
        assert_eq!(value["fileUrl"], "/contracts/供货合同.pdf");
        assert!(value.get("uploadDate").is_some());
        assert!(value.get("markdownContent").is_none());
        assert_eq!(value["riskCount"]["high"], 0);
    }
}
