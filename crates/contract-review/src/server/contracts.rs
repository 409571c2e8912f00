//! Contract routes: listing, upload, detail, file download, locate, risk
//! points, payment terms and risk reports.

use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::response::{file_response, ApiError, ApiResult, Envelope};
use super::{AppState, MAX_PAGE_SIZE};
use crate::convert::DocumentKind;
use crate::error::Error;
use crate::locate::{TextLocator, TextMatch, HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN};
use crate::model::{
    Contract, ContractQuery, ContractStandard, ContractStatus, ContractType, NewContract,
    PaymentTerm, RiskDraft, RiskPoint,
};
use crate::transfer::report::{self, ReportFormat};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/contracts", get(list_contracts))
        .route("/api/upload", post(upload))
        .route(
            "/api/contracts/:id",
            get(get_contract).delete(delete_contract),
        )
        .route("/api/contracts/:id/file", get(contract_file))
        .route("/api/contracts/:id/analyze", post(analyze_contract))
        .route("/api/contracts/:id/locate", get(locate))
        .route("/api/contracts/:id/risks", get(list_risks).post(add_risk))
        .route(
            "/api/contracts/:id/payment-terms",
            get(get_payment_terms).put(put_payment_terms),
        )
        .route("/api/contracts/:id/report", get(download_report))
}

/// Trimmed path id, or 400 `缺少合同ID`.
fn contract_id(id: &str) -> ApiResult<&str> {
    let id = id.trim();
    if id.is_empty() {
        Err(ApiError::missing_contract_id())
    } else {
        Ok(id)
    }
}

fn load_contract(state: &AppState, id: &str) -> ApiResult<Contract> {
    state
        .with_storage(|storage| storage.get_contract(id))?
        .ok_or_else(ApiError::contract_not_found)
}

fn require_contract(state: &AppState, id: &str) -> ApiResult<()> {
    load_contract(state, id).map(|_| ())
}

fn query_rejected(rejection: &QueryRejection) -> ApiError {
    ApiError::bad_request("查询参数无效").with_detail(rejection.body_text())
}

fn json_rejected(rejection: &JsonRejection) -> ApiError {
    ApiError::new(rejection.status(), "请求数据格式错误").with_detail(rejection.body_text())
}

// === Listing ===

#[derive(Debug, Deserialize)]
struct ListParams {
    q: Option<String>,
    #[serde(rename = "type")]
    contract_type: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

async fn list_contracts(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Envelope<Vec<Contract>>> {
    let Query(params) = params.map_err(|rejection| query_rejected(&rejection))?;

    let contract_type = params
        .contract_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<ContractType>)
        .transpose()
        .map_err(Error::from)?;

    let query = ContractQuery {
        name_contains: params.q,
        contract_type,
        offset: params.offset.unwrap_or(0),
        limit: params
            .limit
            .unwrap_or(ContractQuery::default().limit)
            .clamp(1, MAX_PAGE_SIZE),
    };

    let contracts = state.with_storage(|storage| storage.list_contracts(&query))?;
    Ok(Envelope::ok(contracts).with_message("合同数据获取成功"))
}

// === Upload ===

struct UploadedFile {
    index: usize,
    file_name: String,
    bytes: Vec<u8>,
}

/// Multipart errors carry their own status, e.g. 413 for an oversized body.
fn multipart_rejected(err: &axum::extract::multipart::MultipartError) -> ApiError {
    let status = err.status();
    let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "文件大小超过限制"
    } else {
        "上传数据格式错误"
    };
    ApiError::new(status, message).with_detail(err.body_text())
}

async fn read_multipart(
    mut multipart: Multipart,
) -> ApiResult<(Vec<UploadedFile>, HashMap<String, String>)> {
    let mut files = Vec::new();
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_rejected(&err))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" || name == "files" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| multipart_rejected(&err))?;
            files.push(UploadedFile {
                index: files.len(),
                file_name,
                bytes: bytes.to_vec(),
            });
        } else if !name.is_empty() {
            let value = field
                .text()
                .await
                .map_err(|err| multipart_rejected(&err))?;
            fields.insert(name, value);
        }
    }

    Ok((files, fields))
}

/// `type_<i>` wins over `type`; a missing value falls back to the default.
fn file_option<T>(
    fields: &HashMap<String, String>,
    key: &str,
    index: usize,
    default: T,
) -> ApiResult<T>
where
    T: std::str::FromStr<Err = crate::model::ParseEnumError>,
{
    let value = fields
        .get(&format!("{key}_{index}"))
        .or_else(|| fields.get(key))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());
    match value {
        Some(value) => Ok(value.parse::<T>().map_err(Error::from)?),
        None => Ok(default),
    }
}

/// Final path component of a client supplied name.
fn display_name(file_name: &str) -> String {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim()
        .to_string()
}

async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Envelope<Vec<Contract>>> {
    let (files, fields) = read_multipart(multipart).await?;
    if files.is_empty() {
        return Err(ApiError::bad_request("没有文件被上传"));
    }

    // Everything is validated before anything is written.
    let mut accepted = Vec::with_capacity(files.len());
    for file in files {
        let kind = state.uploads.validate(&file.file_name, file.bytes.len())?;
        let contract_type = file_option(&fields, "type", file.index, ContractType::WindTurbine)?;
        let standard = file_option(&fields, "standard", file.index, ContractStandard::Standard)?;
        accepted.push((file, kind, contract_type, standard));
    }

    let mut created = Vec::with_capacity(accepted.len());
    for (file, kind, contract_type, standard) in accepted {
        created.push(store_upload(&state, &file, kind, contract_type, standard).await?);
    }

    info!(count = created.len(), "Uploaded contracts");
    let message = format!("成功上传 {} 个文件", created.len());
    Ok(Envelope::ok(created).with_message(message))
}

async fn store_upload(
    state: &AppState,
    file: &UploadedFile,
    kind: DocumentKind,
    contract_type: ContractType,
    standard: ContractStandard,
) -> ApiResult<Contract> {
    let stored = state.uploads.save(&file.file_name, &file.bytes).await?;

    if let Some(existing) =
        state.with_storage(|storage| storage.find_contract_by_hash(&stored.content_hash))?
    {
        info!(existing = %existing.id, name = %existing.name, "Same file was uploaded before");
    }

    let (status, markdown) = match state
        .converter
        .to_markdown(kind, &stored.file_name, &file.bytes)
        .await
    {
        Ok(markdown) => (ContractStatus::Completed, Some(markdown)),
        Err(err) => {
            warn!(file = %stored.file_name, error = %err, "Conversion failed, contract kept as pending");
            (ContractStatus::Pending, None)
        }
    };

    let new = NewContract {
        name: display_name(&file.file_name),
        contract_type,
        standard,
        file_name: stored.file_name.clone(),
        file_size_bytes: stored.size,
        file_type: crate::upload::mime_for(kind).to_string(),
        content_hash: stored.content_hash.clone(),
        status,
        markdown_content: markdown,
    };

    match state.with_storage(|storage| storage.insert_contract(new)) {
        Ok(contract) => Ok(contract),
        Err(err) => {
            if let Err(cleanup) = state.uploads.remove(&stored.file_name).await {
                warn!(file = %stored.file_name, error = %cleanup, "Failed to remove orphaned upload");
            }
            Err(err.into())
        }
    }
}

// === Detail and delete ===

async fn get_contract(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<Contract>> {
    let id = contract_id(&id)?;
    let contract = load_contract(&state, id)?;
    Ok(Envelope::ok(contract).with_message("合同详情获取成功"))
}

async fn delete_contract(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<()>> {
    let id = contract_id(&id)?;

    match state.with_storage(|storage| storage.delete_contract(id))? {
        Some(contract) => {
            if let Err(err) = state.uploads.remove(&contract.file_name).await {
                warn!(file = %contract.file_name, error = %err, "Failed to remove contract file");
            }
        }
        None => debug!(id, "Delete of missing contract"),
    }

    Ok(Envelope::message("合同删除成功"))
}

async fn contract_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = contract_id(&id)?;
    let contract = load_contract(&state, id)?;
    let bytes = state.uploads.read(&contract.file_name).await?;

    let mut response = file_response(&contract.file_type, "inline", &contract.name, bytes);
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    Ok(response)
}

// === Review ===

/// Mark a contract as under review and convert it if it has no Markdown yet.
///
/// A failed conversion puts the contract back to `pending` and answers with
/// the converter's error status, so the call can be retried.
async fn analyze_contract(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<Contract>> {
    let id = contract_id(&id)?;
    let contract = load_contract(&state, id)?;
    state.with_storage(|storage| storage.update_contract_status(id, ContractStatus::Analyzing))?;
    info!(id, name = %contract.name, "Contract review started");

    if contract.markdown_content.is_none() {
        if let Err(err) = convert_stored(&state, &contract).await {
            state.with_storage(|storage| {
                storage.update_contract_status(id, ContractStatus::Pending)
            })?;
            return Err(err.into());
        }
    }

    state.with_storage(|storage| storage.update_contract_status(id, ContractStatus::Completed))?;
    let contract = load_contract(&state, id)?;
    Ok(Envelope::ok(contract).with_message("合同审核完成"))
}

async fn convert_stored(state: &AppState, contract: &Contract) -> crate::Result<()> {
    let kind = DocumentKind::from_file_name(&contract.file_name)?;
    let bytes = state.uploads.read(&contract.file_name).await?;
    let markdown = state
        .converter
        .to_markdown(kind, &contract.file_name, &bytes)
        .await?;
    state.with_storage(|storage| storage.set_markdown(&contract.id, &markdown))?;
    debug!(id = %contract.id, len = markdown.len(), "Stored converted Markdown");
    Ok(())
}

// === Locate ===

#[derive(Debug, Deserialize)]
struct LocateParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Serialize)]
struct LocateResponse {
    #[serde(flatten)]
    found: TextMatch,
    highlighted: String,
}

async fn locate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<LocateParams>, QueryRejection>,
) -> ApiResult<Envelope<LocateResponse>> {
    let id = contract_id(&id)?;
    let Query(params) = params.map_err(|rejection| query_rejected(&rejection))?;
    if params.q.trim().is_empty() {
        return Err(ApiError::bad_request("缺少定位文本"));
    }

    let contract = load_contract(&state, id)?;
    let markdown = contract
        .markdown_content
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "合同文件内容不存在"))?;

    let locator = TextLocator::new(&markdown);
    let found = locator
        .locate(&params.q)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "未找到匹配文本"))?;
    let highlighted = locator.highlight_match(&found, HIGHLIGHT_OPEN, HIGHLIGHT_CLOSE);

    Ok(Envelope::ok(LocateResponse { found, highlighted }))
}

// === Risk points ===

async fn list_risks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<Vec<RiskPoint>>> {
    let id = contract_id(&id)?;
    require_contract(&state, id)?;
    let risks = state.with_storage(|storage| storage.risk_points(id))?;
    Ok(Envelope::ok(risks))
}

async fn add_risk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RiskDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Envelope<RiskPoint>)> {
    let id = contract_id(&id)?;
    let Json(draft) = payload.map_err(|rejection| json_rejected(&rejection))?;
    let risk = state.with_storage(|storage| storage.insert_risk_point(id, draft))?;
    Ok((
        StatusCode::CREATED,
        Envelope::ok(risk).with_message("风险点添加成功"),
    ))
}

// === Payment terms ===

async fn get_payment_terms(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<Vec<PaymentTerm>>> {
    let id = contract_id(&id)?;
    require_contract(&state, id)?;
    let terms = state.with_storage(|storage| storage.payment_terms(id))?;
    Ok(Envelope::ok(terms))
}

async fn put_payment_terms(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Vec<PaymentTerm>>, JsonRejection>,
) -> ApiResult<Envelope<Vec<PaymentTerm>>> {
    let id = contract_id(&id)?;
    let Json(terms) = payload.map_err(|rejection| json_rejected(&rejection))?;
    state.with_storage(|storage| storage.replace_payment_terms(id, &terms))?;
    Ok(Envelope::ok(terms).with_message("付款信息保存成功"))
}

// === Reports ===

#[derive(Debug, Deserialize)]
struct ReportParams {
    format: Option<String>,
}

async fn download_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<ReportParams>, QueryRejection>,
) -> ApiResult<Response> {
    let id = contract_id(&id)?;
    let Query(params) = params.map_err(|rejection| query_rejected(&rejection))?;
    let format = params
        .format
        .as_deref()
        .map(str::parse::<ReportFormat>)
        .transpose()
        .map_err(Error::from)?
        .unwrap_or_default();

    let (contract, risks) = state.with_storage(|storage| {
        let contract = storage
            .get_contract(id)?
            .ok_or_else(|| Error::not_found("contract", id))?;
        let risks = storage.risk_points(id)?;
        Ok((contract, risks))
    })?;

    let now = Utc::now();
    let body = match format {
        ReportFormat::Csv => report::report_csv(&risks)?,
        ReportFormat::Json => report::report_json(&contract, &risks, now)?,
        ReportFormat::Text => report::report_text(&contract, &risks, now.date_naive()),
    };
    let file_name = report::report_file_name(&contract, format, now.date_naive());

    debug!(id, format = format.extension(), risks = risks.len(), "Exporting risk report");
    Ok(file_response(
        format.content_type(),
        "attachment",
        &file_name,
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_id() {
        assert_eq!(contract_id(" abc ").unwrap(), "abc");
        let err = contract_id("  ").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "缺少合同ID");
    }

    #[test]
    fn test_file_option_precedence() {
        let mut fields = HashMap::new();
        fields.insert("type".to_string(), "energy-storage".to_string());
        fields.insert("type_1".to_string(), "wind-turbine".to_string());

        let first: ContractType = file_option(&fields, "type", 0, ContractType::WindTurbine).unwrap();
        let second: ContractType = file_option(&fields, "type", 1, ContractType::EnergyStorage).unwrap();
        let standard: ContractStandard =
            file_option(&fields, "standard", 0, ContractStandard::NonStandard).unwrap();

        assert_eq!(first, ContractType::EnergyStorage);
        assert_eq!(second, ContractType::WindTurbine);
        assert_eq!(standard, ContractStandard::NonStandard);

        fields.insert("standard".to_string(), "draft".to_string());
        let err = file_option::<ContractStandard>(&fields, "standard", 0, ContractStandard::Standard)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("C:\\docs\\风机合同.pdf"), "风机合同.pdf");
        assert_eq!(display_name("a/b/c.txt"), "c.txt");
        assert_eq!(display_name("plain.docx"), "plain.docx");
    }
}
