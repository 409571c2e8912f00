use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use contract_review::{
    build_router, AppState, Config, DocumentConverter, DocumentKind, Error, Storage, UploadStore,
};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

const CONTRACT_TEXT: &str = "第一条 合同标的\n\n第五条 付款方式：预付款为合同总价的50%，到货后支付40%。\n\n第九条 违约责任";

/// Converts Word and text; PDF only once `pdf_ready` is set.
struct FakeConverter {
    pdf_ready: Arc<AtomicBool>,
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn to_markdown(
        &self,
        kind: DocumentKind,
        file_name: &str,
        bytes: &[u8],
    ) -> contract_review::Result<String> {
        match kind {
            DocumentKind::Word => Ok(format!("# {file_name}\n\n{CONTRACT_TEXT}")),
            DocumentKind::Pdf if self.pdf_ready.load(Ordering::SeqCst) => {
                Ok(format!("# {file_name}\n\n{CONTRACT_TEXT}"))
            }
            DocumentKind::Pdf => Err(Error::conversion("PDF转换失败")),
            DocumentKind::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    pdf_ready: Arc<AtomicBool>,
    _dir: TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn upload(&self, form: Form) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn post_json(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.post(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn upload_text(&self, name: &str, text: &str) -> Value {
        let form = Form::new().part("file", Part::text(text.to_string()).file_name(name.to_string()));
        let (status, body) = self.upload(form).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"][0].clone()
    }
}

async fn spawn_with(configure: impl FnOnce(&mut Config)) -> TestServer {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.database_path = Some(dir.path().join("contracts.db"));
    config.upload.dir = Some(dir.path().join("contracts"));
    configure(&mut config);

    let storage = Storage::open(config.database_path()).unwrap();
    let uploads = UploadStore::from_config(&config);
    let pdf_ready = Arc::new(AtomicBool::new(false));
    let converter = FakeConverter {
        pdf_ready: Arc::clone(&pdf_ready),
    };
    let state = AppState::new(storage, uploads, Arc::new(converter), config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve app");
    });

    TestServer {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        pdf_ready,
        _dir: dir,
    }
}

async fn spawn() -> TestServer {
    spawn_with(|_| {}).await
}

#[tokio::test]
async fn root_and_health() {
    let server = spawn().await;

    let (status, body) = server.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy"}));

    let (status, body) = server.get_json("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("服务正在运行"));
}

#[tokio::test]
async fn request_id_is_echoed() {
    let server = spawn().await;

    let response = server.client.get(server.url("/health")).send().await.unwrap();
    assert!(!response.headers()["x-request-id"].is_empty());

    let response = server
        .client
        .get(server.url("/health"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn upload_list_and_detail() {
    let server = spawn().await;

    let form = Form::new()
        .part(
            "files",
            Part::bytes(b"PK\x03\x04".to_vec()).file_name("风机 采购合同.docx"),
        )
        .part(
            "files",
            Part::text("储能合同正文").file_name("储能合同.txt"),
        )
        .text("type_0", "wind-turbine")
        .text("type_1", "energy-storage")
        .text("standard", "non-standard");
    let (status, body) = server.upload(form).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "成功上传 2 个文件");

    let created = body["data"].as_array().unwrap();
    assert_eq!(created[0]["name"], "风机 采购合同.docx");
    assert_eq!(created[0]["fileName"], "风机_采购合同.docx");
    assert_eq!(created[0]["fileUrl"], "/contracts/风机_采购合同.docx");
    assert_eq!(created[0]["type"], "wind-turbine");
    assert_eq!(created[0]["standard"], "non-standard");
    assert_eq!(created[0]["status"], "completed");
    assert_eq!(created[0]["fileSize"], "0.00 MB");
    assert_eq!(created[1]["type"], "energy-storage");
    assert_eq!(created[1]["fileType"], "text/plain");

    let (status, list) = server.get_json("/api/contracts").await;
    assert_eq!(status, StatusCode::OK);
    let contracts = list["data"].as_array().unwrap();
    assert_eq!(contracts.len(), 2);
    assert!(contracts.iter().all(|c| c.get("markdownContent").is_none()));

    let (_, filtered) = server.get_json("/api/contracts?type=energy-storage").await;
    assert_eq!(filtered["data"].as_array().unwrap().len(), 1);

    let (_, searched) = server.get_json("/api/contracts?q=%E9%A3%8E%E6%9C%BA").await;
    assert_eq!(searched["data"][0]["name"], "风机 采购合同.docx");

    let id = created[0]["id"].as_str().unwrap();
    let (status, detail) = server.get_json(&format!("/api/contracts/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(detail["data"]["markdownContent"]
        .as_str()
        .unwrap()
        .contains("第五条 付款方式"));
    assert_eq!(detail["data"]["riskCount"], json!({"high": 0, "medium": 0, "low": 0}));
}

#[tokio::test]
async fn upload_rejections() {
    let server = spawn_with(|config| config.upload.max_file_size = 1024).await;

    let form = Form::new().part("file", Part::bytes(vec![0; 10]).file_name("setup.exe"));
    let (status, body) = server.upload(form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("仅支持"));

    let form = Form::new().part("file", Part::bytes(vec![b'a'; 2048]).file_name("big.txt"));
    let (status, body) = server.upload(form).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);

    let form = Form::new().text("type", "wind-turbine");
    let (status, body) = server.upload(form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "没有文件被上传");

    let form = Form::new()
        .part("file", Part::text("x").file_name("a.txt"))
        .text("type", "solar");
    let (status, _) = server.upload(form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = server.get_json("/api/contracts").await;
    assert!(list["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_conversion_keeps_pending_contract() {
    let server = spawn().await;

    let form = Form::new().part("file", Part::bytes(b"%PDF-1.7".to_vec()).file_name("a.pdf"));
    let (status, body) = server.upload(form).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["status"], "pending");

    let id = body["data"][0]["id"].as_str().unwrap();
    let (_, detail) = server.get_json(&format!("/api/contracts/{id}")).await;
    assert!(detail["data"].get("markdownContent").is_none());

    let (status, body) = server
        .get_json(&format!("/api/contracts/{id}/locate?q=付款"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "合同文件内容不存在");
}

#[tokio::test]
async fn missing_and_blank_ids() {
    let server = spawn().await;

    let (status, body) = server.get_json("/api/contracts/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"success": false, "message": "合同不存在"}));

    let (status, body) = server.get_json("/api/contracts/%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "缺少合同ID");

    let response = server
        .client
        .delete(server.url("/api/contracts/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"success": true, "message": "合同删除成功"}));

    let (status, body) = server.get_json("/api/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn file_download_and_delete() {
    let server = spawn().await;
    let contract = server.upload_text("合同 A.txt", CONTRACT_TEXT).await;
    let id = contract["id"].as_str().unwrap();

    let response = server
        .client
        .get(server.url(&format!("/api/contracts/{id}/file")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "text/plain");
    assert_eq!(headers["cache-control"], "public, max-age=3600");
    assert!(headers["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("inline; filename=\"%E5%90%88%E5%90%8C%20A.txt\""));
    assert_eq!(response.text().await.unwrap(), CONTRACT_TEXT);

    let response = server
        .client
        .delete(server.url(&format!("/api/contracts/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = server.get_json(&format!("/api/contracts/{id}/file")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn locate_excerpt() {
    let server = spawn().await;
    let contract = server.upload_text("a.txt", CONTRACT_TEXT).await;
    let id = contract["id"].as_str().unwrap();

    let (status, body) = server
        .get_json(&format!(
            "/api/contracts/{id}/locate?q=%E9%A2%84%E4%BB%98%E6%AC%BE%E4%B8%BA%20%E5%90%88%E5%90%8C%E6%80%BB%E4%BB%B7"
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["text"], "预付款为合同总价");
    assert_eq!(body["data"]["kind"]["type"], "exact");
    assert!(body["data"]["highlighted"]
        .as_str()
        .unwrap()
        .contains(r#"<mark class="highlight" id="highlight-target">预付款为合同总价</mark>"#));

    let (status, body) = server
        .get_json(&format!("/api/contracts/{id}/locate?q=违约责任，不存在的句子"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["kind"]["type"], "token");

    let (status, _) = server
        .get_json(&format!("/api/contracts/{id}/locate?q=zzzz"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .get_json(&format!("/api/contracts/{id}/locate?q="))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn risks_payment_terms_and_reports() {
    let server = spawn().await;
    let contract = server.upload_text("风机合同.txt", CONTRACT_TEXT).await;
    let id = contract["id"].as_str().unwrap();

    for (level, description) in [("high", "预付款比例过高"), ("low", "条款编号不连续")] {
        let response = server
            .client
            .post(server.url(&format!("/api/contracts/{id}/risks")))
            .json(&json!({
                "category": "付款条件",
                "riskType": "commercial",
                "level": level,
                "description": description,
                "location": "第五条",
                "suggestion": "调整预付款比例",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = server
        .client
        .post(server.url(&format!("/api/contracts/{id}/risks")))
        .json(&json!({"level": "high"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let (_, risks) = server.get_json(&format!("/api/contracts/{id}/risks")).await;
    assert_eq!(risks["data"].as_array().unwrap().len(), 2);

    let (_, detail) = server.get_json(&format!("/api/contracts/{id}")).await;
    assert_eq!(detail["data"]["riskCount"], json!({"high": 1, "medium": 0, "low": 1}));

    let terms = json!([
        {"node": "预付款", "ratio": "50%", "timeRegulation": "合同签订后30日内"},
        {"node": "到货款", "ratio": "40%"}
    ]);
    let response = server
        .client
        .put(server.url(&format!("/api/contracts/{id}/payment-terms")))
        .json(&terms)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let (_, stored) = server
        .get_json(&format!("/api/contracts/{id}/payment-terms"))
        .await;
    assert_eq!(stored["data"][0]["timeRegulation"], "合同签订后30日内");
    assert_eq!(stored["data"][1]["batch"], "");

    let response = server
        .client
        .get(server.url(&format!("/api/contracts/{id}/report?format=csv")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("attachment; filename="));
    let csv = response.text().await.unwrap();
    assert!(csv.starts_with('\u{feff}'));
    assert!(csv.contains("\"高风险\",\"商务风险\",\"付款条件\",\"预付款比例过高\""));

    let response = server
        .client
        .get(server.url(&format!("/api/contracts/{id}/report?format=json")))
        .send()
        .await
        .unwrap();
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["summary"]["totalRisks"], 2);
    assert_eq!(report["contract"]["name"], "风机合同.txt");

    let response = server
        .client
        .get(server.url(&format!("/api/contracts/{id}/report?format=text")))
        .send()
        .await
        .unwrap();
    let text = response.text().await.unwrap();
    assert!(text.starts_with("【合同风险审核报告】"));
    assert!(text.contains("1. 付款条件 - 预付款比例过高"));

    let (status, _) = server
        .get_json(&format!("/api/contracts/{id}/report?format=xlsx"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.get_json("/api/contracts/missing/risks").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rule_crud_and_csv() {
    let server = spawn().await;

    let response = server
        .client
        .post(server.url("/api/rules"))
        .json(&json!({
            "category": "商务条款",
            "name": "付款条件审核",
            "standard": "预付款比例不得超过30%",
            "level": "high",
            "contractTypes": ["wind-turbine"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let response = server
        .client
        .put(server.url(&format!("/api/rules/{id}")))
        .json(&json!({"name": "付款条件", "level": "medium"}))
        .send()
        .await
        .unwrap();
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["data"]["category"], "未分类");
    assert_eq!(
        updated["data"]["contractTypes"],
        json!(["wind-turbine", "energy-storage"])
    );

    let template = server
        .client
        .get(server.url("/api/rules/template"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let response = server
        .client
        .post(server.url("/api/rules/import"))
        .body(template)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let imported: Value = response.json().await.unwrap();
    assert_eq!(imported["message"], "成功导入 3 条规则");

    let (_, all) = server.get_json("/api/rules").await;
    assert_eq!(all["data"].as_array().unwrap().len(), 4);

    let (_, high) = server.get_json("/api/rules?level=high").await;
    assert_eq!(high["data"].as_array().unwrap().len(), 2);

    let (_, storage_rules) = server.get_json("/api/rules?type=energy-storage").await;
    assert_eq!(storage_rules["data"].as_array().unwrap().len(), 3);

    let response = server
        .client
        .get(server.url("/api/rules/export"))
        .send()
        .await
        .unwrap();
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let csv = response.text().await.unwrap();
    assert_eq!(csv.lines().count(), 5);

    let response = server
        .client
        .post(server.url("/api/rules/import"))
        .body("规则类别,规则名称\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server
        .client
        .delete(server.url(&format!("/api/rules/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let (status, body) = server.get_json(&format!("/api/rules/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "规则不存在");
}

#[tokio::test]
async fn error_detail_only_in_development() {
    let development = spawn().await;
    let (_, body) = development.get_json("/api/contracts/nope").await;
    assert_eq!(body["message"], "合同不存在");

    let (_, body) = development.get_json("/api/contracts?type=solar").await;
    assert!(body["error"].as_str().unwrap().contains("solar"));

    let production = spawn_with(|config| config.server.env = "production".to_string()).await;
    let (status, body) = production.get_json("/api/contracts?type=solar").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn same_name_parts_in_one_upload() {
    let server = spawn().await;

    let mut form = Form::new();
    for i in 0..3 {
        form = form.part("files", Part::text(format!("第{i}份")).file_name("a.txt"));
    }
    let (status, body) = server.upload(form).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let created = body["data"].as_array().unwrap();
    assert_eq!(created.len(), 3);
    let mut stored: Vec<_> = created
        .iter()
        .map(|c| c["fileName"].as_str().unwrap().to_string())
        .collect();
    stored.sort();
    stored.dedup();
    assert_eq!(stored.len(), 3);
    assert!(created.iter().all(|c| c["name"] == "a.txt"));

    let id = created[2]["id"].as_str().unwrap();
    let response = server
        .client
        .get(server.url(&format!("/api/contracts/{id}/file")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "第2份");
}

#[tokio::test]
async fn analyze_retries_pending_conversion() {
    let server = spawn().await;

    let form = Form::new().part("file", Part::bytes(b"%PDF-1.7".to_vec()).file_name("b.pdf"));
    let (_, body) = server.upload(form).await;
    let id = body["data"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"][0]["status"], "pending");

    let (status, body) = server.post_json(&format!("/api/contracts/{id}/analyze")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "文档转换失败");
    let (_, detail) = server.get_json(&format!("/api/contracts/{id}")).await;
    assert_eq!(detail["data"]["status"], "pending");

    server.pdf_ready.store(true, Ordering::SeqCst);
    let (status, body) = server.post_json(&format!("/api/contracts/{id}/analyze")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "completed");
    assert!(body["data"]["markdownContent"]
        .as_str()
        .unwrap()
        .contains("第五条 付款方式"));

    let (status, _) = server
        .get_json(&format!("/api/contracts/{id}/locate?q=违约责任"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.post_json("/api/contracts/nope/analyze").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "合同不存在");
}

#[tokio::test]
async fn analyze_converted_contract_completes() {
    let server = spawn().await;
    let contract = server.upload_text("c.txt", CONTRACT_TEXT).await;
    let id = contract["id"].as_str().unwrap();

    let (status, body) = server.post_json(&format!("/api/contracts/{id}/analyze")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["markdownContent"], CONTRACT_TEXT);
}

#[tokio::test]
async fn listing_pagination() {
    let server = spawn().await;

    // 205 rows so both the default page and the 200 cap are visible.
    let mut form = Form::new();
    for i in 0..205 {
        form = form.part("files", Part::text("x").file_name(format!("合同{i:03}.txt")));
    }
    let (status, _) = server.upload(form).await;
    assert_eq!(status, StatusCode::OK);

    let count = |body: &Value| body["data"].as_array().unwrap().len();

    let (_, body) = server.get_json("/api/contracts").await;
    assert_eq!(count(&body), 50);

    let (_, body) = server.get_json("/api/contracts?limit=1000").await;
    assert_eq!(count(&body), 200);

    let (_, body) = server.get_json("/api/contracts?limit=0").await;
    assert_eq!(count(&body), 1);

    let (_, body) = server.get_json("/api/contracts?offset=200&limit=200").await;
    assert_eq!(count(&body), 5);

    let (_, first) = server.get_json("/api/contracts?limit=2").await;
    let (_, second) = server.get_json("/api/contracts?offset=1&limit=1").await;
    assert_eq!(second["data"][0]["id"], first["data"][1]["id"]);

    let (status, _) = server.get_json("/api/contracts?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
