//! Audit rule routes, including CSV import and export.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use super::response::{file_response, ApiError, ApiResult, Envelope};
use super::AppState;
use crate::error::Error;
use crate::model::{AuditRule, ContractType, RiskLevel, RuleDraft, RuleQuery};
use crate::transfer::rules as rule_csv;

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/rules/import", post(import_rules))
        .route("/api/rules/export", get(export_rules))
        .route("/api/rules/template", get(rule_template))
        .route(
            "/api/rules/:id",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
}

fn rule_id(id: &str) -> ApiResult<&str> {
    let id = id.trim();
    if id.is_empty() {
        Err(ApiError::bad_request("缺少规则ID"))
    } else {
        Ok(id)
    }
}

fn draft_from(payload: Result<Json<RuleDraft>, JsonRejection>) -> ApiResult<RuleDraft> {
    payload.map(|Json(draft)| draft).map_err(|rejection| {
        ApiError::new(rejection.status(), "请求数据格式错误").with_detail(rejection.body_text())
    })
}

#[derive(Debug, Deserialize)]
struct RuleParams {
    category: Option<String>,
    level: Option<String>,
    #[serde(rename = "type")]
    contract_type: Option<String>,
    q: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

async fn list_rules(
    State(state): State<AppState>,
    params: Result<Query<RuleParams>, QueryRejection>,
) -> ApiResult<Envelope<Vec<AuditRule>>> {
    let Query(params) = params.map_err(|rejection| {
        ApiError::bad_request("查询参数无效").with_detail(rejection.body_text())
    })?;

    let query = RuleQuery {
        category: non_blank(params.category),
        level: non_blank(params.level)
            .map(|s| s.parse::<RiskLevel>())
            .transpose()
            .map_err(Error::from)?,
        contract_type: non_blank(params.contract_type)
            .map(|s| s.parse::<ContractType>())
            .transpose()
            .map_err(Error::from)?,
        text: non_blank(params.q),
    };

    let rules = state.with_storage(|storage| storage.list_rules(&query))?;
    Ok(Envelope::ok(rules))
}

async fn create_rule(
    State(state): State<AppState>,
    payload: Result<Json<RuleDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Envelope<AuditRule>)> {
    let draft = draft_from(payload)?;
    let rule = state.with_storage(|storage| storage.insert_rule(draft))?;
    Ok((
        StatusCode::CREATED,
        Envelope::ok(rule).with_message("规则创建成功"),
    ))
}

async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<AuditRule>> {
    let id = rule_id(&id)?;
    let rule = state
        .with_storage(|storage| storage.get_rule(id))?
        .ok_or_else(ApiError::rule_not_found)?;
    Ok(Envelope::ok(rule))
}

async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RuleDraft>, JsonRejection>,
) -> ApiResult<Envelope<AuditRule>> {
    let id = rule_id(&id)?;
    let draft = draft_from(payload)?;
    let rule = state
        .with_storage(|storage| storage.update_rule(id, draft))?
        .ok_or_else(ApiError::rule_not_found)?;
    Ok(Envelope::ok(rule).with_message("规则更新成功"))
}

async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<()>> {
    let id = rule_id(&id)?;
    if state.with_storage(|storage| storage.delete_rule(id))? {
        Ok(Envelope::message("规则删除成功"))
    } else {
        Err(ApiError::rule_not_found())
    }
}

async fn import_rules(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Envelope<Vec<AuditRule>>> {
    let drafts = rule_csv::import_rules(&body)?;
    if drafts.is_empty() {
        return Err(ApiError::bad_request("CSV文件中没有有效的规则数据"));
    }

    let rules = state.with_storage(|storage| storage.insert_rules(drafts))?;
    let message = format!("成功导入 {} 条规则", rules.len());
    Ok(Envelope::ok(rules).with_message(message))
}

async fn export_rules(State(state): State<AppState>) -> ApiResult<Response> {
    let rules = state.with_storage(|storage| storage.list_rules(&RuleQuery::default()))?;
    let csv = rule_csv::export_rules(&rules)?;
    let file_name = rule_csv::export_file_name(Utc::now().date_naive());
    Ok(file_response(CSV_CONTENT_TYPE, "attachment", &file_name, csv))
}

async fn rule_template() -> ApiResult<Response> {
    let csv = rule_csv::rule_template()?;
    let file_name = rule_csv::template_file_name(Utc::now().date_naive());
    Ok(file_response(CSV_CONTENT_TYPE, "attachment", &file_name, csv))
}
