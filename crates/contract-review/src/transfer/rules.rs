//! Audit rule CSV import and export.

use chrono::NaiveDate;
use tracing::debug;

use super::{date_stamp, write_quoted_csv, BOM};
use crate::error::Result;
use crate::model::{AuditRule, ContractType, RiskLevel, RuleDraft};

/// Column headers of the rule CSV, in order.
pub const RULE_HEADERS: [&str; 6] = [
    "规则类别",
    "规则名称",
    "标准约定",
    "风险等级",
    "规则描述",
    "适用合同类型",
];

/// Separator between contract types in the applicability column.
const TYPE_SEPARATOR: &str = "、";

/// Example rows of the import template.
const TEMPLATE_ROWS: [[&str; 6]; 3] = [
    [
        "商务条款",
        "付款条件审核",
        "预付款比例不得超过30%，质保金不低于5%",
        "高风险",
        "审核合同中的付款条件是否符合公司财务政策",
        "风机、储能",
    ],
    [
        "法务条款",
        "违约责任条款",
        "必须明确违约责任及赔偿上限",
        "高风险",
        "检查违约责任条款的完整性和合理性",
        "风机、储能",
    ],
    [
        "技术条款",
        "技术参数验收标准",
        "必须包含明确的技术参数和验收标准",
        "中风险",
        "确保技术规格和验收标准清晰可执行",
        "风机",
    ],
];

/// Parse rule drafts from CSV text.
///
/// The first row is a header and is skipped. Rows with fewer than six cells
/// are skipped. Every draft is [normalized](RuleDraft::normalized).
///
/// # Errors
///
/// Returns an error if the CSV is malformed (e.g. invalid UTF-8).
pub fn import_rules(content: &str) -> Result<Vec<RuleDraft>> {
    let content = content.strip_prefix(BOM).unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut drafts = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < RULE_HEADERS.len() {
            debug!(
                row = index + 2,
                cells = record.len(),
                "Skipping short rule row"
            );
            continue;
        }

        let cell = |i: usize| record.get(i).unwrap_or_default().to_string();
        drafts.push(
            RuleDraft {
                category: cell(0),
                name: cell(1),
                standard: cell(2),
                level: parse_level(&cell(3)),
                description: cell(4),
                contract_types: parse_contract_types(&cell(5)),
            }
            .normalized(),
        );
    }

    Ok(drafts)
}

/// Render rules as CSV.
///
/// # Errors
///
/// Returns an error if writing the CSV fails.
pub fn export_rules(rules: &[AuditRule]) -> Result<String> {
    write_quoted_csv(
        &RULE_HEADERS,
        rules.iter().map(|rule| {
            [
                rule.category.clone(),
                rule.name.clone(),
                rule.standard.clone(),
                rule.level.label().to_string(),
                rule.description.clone(),
                format_contract_types(&rule.contract_types),
            ]
        }),
    )
}

/// The import template: headers plus example rows.
///
/// # Errors
///
/// Returns an error if writing the CSV fails.
pub fn rule_template() -> Result<String> {
    write_quoted_csv(&RULE_HEADERS, TEMPLATE_ROWS)
}

/// Download name of a rule export, `审核规则-<date>.csv`.
#[must_use]
pub fn export_file_name(date: NaiveDate) -> String {
    format!("审核规则-{}.csv", date_stamp(date))
}

/// Download name of the import template, `审核规则导入模板-<date>.csv`.
#[must_use]
pub fn template_file_name(date: NaiveDate) -> String {
    format!("审核规则导入模板-{}.csv", date_stamp(date))
}

/// `高…` is high, `低…` is low, anything else is medium.
fn parse_level(cell: &str) -> RiskLevel {
    if cell.contains('高') || cell.eq_ignore_ascii_case("high") {
        RiskLevel::High
    } else if cell.contains('低') || cell.eq_ignore_ascii_case("low") {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

fn parse_contract_types(cell: &str) -> Vec<ContractType> {
    ContractType::ALL
        .into_iter()
        .filter(|ty| cell.contains(ty.short_label()) || cell.contains(ty.as_str()))
        .collect()
}

fn format_contract_types(types: &[ContractType]) -> String {
    types
        .iter()
        .map(|ty| ty.short_label())
        .collect::<Vec<_>>()
        .join(TYPE_SEPARATOR)
}
