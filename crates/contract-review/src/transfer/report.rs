//! Risk report rendering.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::{date_stamp, write_quoted_csv};
use crate::error::{Error, Result};
use crate::model::{
    Contract, ContractStandard, ContractType, ParseEnumError, RiskCount, RiskLevel, RiskPoint,
};

/// Column headers of the risk report CSV.
pub const REPORT_HEADERS: [&str; 6] = ["风险等级", "风险类型", "类别", "风险描述", "位置", "整改建议"];

/// Output format of a risk report download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Spreadsheet friendly CSV.
    #[default]
    Csv,
    /// Structured JSON.
    Json,
    /// Plain-text summary.
    Text,
}

impl ReportFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Text => "txt",
        }
    }

    /// MIME type of the rendered report.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            other => Err(ParseEnumError::new("report format", other)),
        }
    }
}

/// JSON shape of an exported risk report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport<'a> {
    /// Identifying fields of the contract.
    pub contract: ReportContract<'a>,
    /// Counts per level.
    pub summary: ReportSummary,
    /// The findings.
    pub risks: Vec<ReportRisk<'a>>,
    /// When the report was produced.
    pub export_date: DateTime<Utc>,
}

/// Contract section of a [`RiskReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportContract<'a> {
    /// Contract name.
    pub name: &'a str,
    /// Contract type.
    #[serde(rename = "type")]
    pub contract_type: ContractType,
    /// Upload time.
    pub upload_date: DateTime<Utc>,
    /// Template conformance.
    pub standard: ContractStandard,
}

/// Summary section of a [`RiskReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// All findings.
    pub total_risks: u32,
    /// High-risk findings.
    pub high_risks: u32,
    /// Medium-risk findings.
    pub medium_risks: u32,
    /// Low-risk findings.
    pub low_risks: u32,
}

impl From<RiskCount> for ReportSummary {
    fn from(count: RiskCount) -> Self {
        Self {
            total_risks: count.total(),
            high_risks: count.high,
            medium_risks: count.medium,
            low_risks: count.low,
        }
    }
}

/// One finding in a [`RiskReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRisk<'a> {
    /// Severity.
    pub level: RiskLevel,
    /// Area of the finding.
    #[serde(rename = "type")]
    pub risk_type: crate::model::RiskType,
    /// Rule category.
    pub category: &'a str,
    /// What is wrong.
    pub description: &'a str,
    /// Where in the contract.
    pub location: &'a str,
    /// Suggested fix.
    pub suggestion: &'a str,
}

impl<'a> RiskReport<'a> {
    /// Assemble the report for `contract` and its findings.
    #[must_use]
    pub fn new(contract: &'a Contract, risks: &'a [RiskPoint], export_date: DateTime<Utc>) -> Self {
        Self {
            contract: ReportContract {
                name: &contract.name,
                contract_type: contract.contract_type,
                upload_date: contract.upload_date,
                standard: contract.standard,
            },
            summary: count_levels(risks).into(),
            risks: risks
                .iter()
                .map(|risk| ReportRisk {
                    level: risk.level,
                    risk_type: risk.risk_type,
                    category: &risk.category,
                    description: &risk.description,
                    location: &risk.location,
                    suggestion: &risk.suggestion,
                })
                .collect(),
            export_date,
        }
    }
}

/// Render the findings as CSV.
///
/// # Errors
///
/// Returns an error if writing the CSV fails.
pub fn report_csv(risks: &[RiskPoint]) -> Result<String> {
    write_quoted_csv(
        &REPORT_HEADERS,
        risks.iter().map(|risk| {
            [
                risk.level.label(),
                risk.risk_type.label(),
                risk.category.as_str(),
                risk.description.as_str(),
                risk.location.as_str(),
                risk.suggestion.as_str(),
            ]
        }),
    )
}

/// Render the report as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn report_json(
    contract: &Contract,
    risks: &[RiskPoint],
    export_date: DateTime<Utc>,
) -> Result<String> {
    let report = RiskReport::new(contract, risks, export_date);
    serde_json::to_string_pretty(&report)
        .map_err(|err| Error::internal(format!("failed to render JSON report: {err}")))
}

/// Render the plain-text audit summary.
#[must_use]
pub fn report_text(contract: &Contract, risks: &[RiskPoint], audit_date: NaiveDate) -> String {
    let count = count_levels(risks);
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = write!(out, "【合同风险审核报告】\n\n");
    let _ = writeln!(out, "合同名称：{}", contract.name);
    let _ = writeln!(out, "合同类型：{}", contract.contract_type.label());
    let _ = write!(out, "审核日期：{}\n\n", audit_date.format("%Y/%-m/%-d"));

    let _ = writeln!(out, "【风险统计】");
    let _ = writeln!(out, "总风险数：{} 项", count.total());
    let _ = writeln!(out, "- 高风险：{} 项", count.high);
    let _ = writeln!(out, "- 中风险：{} 项", count.medium);
    let _ = write!(out, "- 低风险：{} 项\n\n", count.low);

    if count.high > 0 {
        let _ = writeln!(out, "【高风险项】");
        let high = risks.iter().filter(|risk| risk.level == RiskLevel::High);
        for (index, risk) in high.enumerate() {
            let _ = writeln!(out, "{}. {} - {}", index + 1, risk.category, risk.description);
            let _ = writeln!(out, "   位置：{}", risk.location);
            let _ = write!(out, "   建议：{}\n\n", risk.suggestion);
        }
    }

    let _ = writeln!(out, "【审核结论】");
    match count.overall() {
        RiskLevel::High => {
            let _ = write!(out, "该合同存在 {} 项高风险，建议重点关注并及时整改。", count.high);
        }
        RiskLevel::Medium => {
            let _ = write!(
                out,
                "该合同存在 {} 项中风险，建议评估后进行适当调整。",
                count.medium
            );
        }
        RiskLevel::Low => out.push_str("该合同风险较低，可以正常执行。"),
    }

    out
}

/// Download name of a report, `<name>-风险报告-<date>.<ext>`.
#[must_use]
pub fn report_file_name(contract: &Contract, format: ReportFormat, date: NaiveDate) -> String {
    format!(
        "{}-风险报告-{}.{}",
        contract.name,
        date_stamp(date),
        format.extension()
    )
}

fn count_levels(risks: &[RiskPoint]) -> RiskCount {
    RiskCount::from_levels(risks.iter().map(|risk| risk.level))
}
