use std::str::FromStr;

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

use epro_api::app::{AppServices, build_app};

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory storage, on an ephemeral port.
        let app = build_app(AppServices::in_memory());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        read(res).await
    }

    async fn post_as(&self, actor: Uuid, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .header("x-actor-id", actor.to_string())
            .json(&body)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        read(res).await
    }

    async fn delete(&self, path: &str) -> StatusCode {
        self.client.delete(self.url(path)).send().await.unwrap().status()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read(res: reqwest::Response) -> (StatusCode, Value) {
    let status = res.status();
    let text = res.text().await.unwrap();
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, body)
}

fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn id(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

struct Seed {
    office: String,
    currency: String,
    unit: String,
    approver1: Uuid,
}

async fn seed(srv: &TestServer) -> Seed {
    let (status, office) = srv
        .post("/reference/offices", json!({"name": "Kabul", "country_code": "AF"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{office}");
    let (status, currency) = srv
        .post(
            "/reference/currencies",
            json!({"country_code": "AF", "code": "AFN", "name": "Afghani"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{currency}");
    let (status, unit) = srv
        .post("/reference/units", json!({"mnemonic": "pcs", "description": "pieces"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{unit}");

    Seed {
        office: id(&office),
        currency: id(&currency),
        unit: id(&unit),
        approver1: Uuid::now_v7(),
    }
}

fn request_body(seed: &Seed) -> Value {
    json!({
        "office_id": seed.office,
        "currency_id": seed.currency,
        "exchange_rate": "2.00",
        "delivery_address": "Main warehouse",
        "project_reference": "Winterization",
        "required_date": "2026-12-01",
        "originator": Uuid::now_v7(),
        "approver1": seed.approver1,
        "pr_type": "goods"
    })
}

async fn create_request(srv: &TestServer, seed: &Seed) -> Value {
    let (status, body) = srv.post("/requests", request_body(seed)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

async fn add_item(srv: &TestServer, seed: &Seed, request: &str, quantity: u32, price: &str) -> Value {
    let (status, body) = srv
        .post(
            &format!("/requests/{request}/items"),
            json!({
                "quantity": quantity,
                "unit_id": seed.unit,
                "description_pr": "Blanket",
                "unit_price_local": price
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn requests_get_office_serials_and_priced_items() {
    let srv = TestServer::spawn().await;
    let seed = seed(&srv).await;

    let first = create_request(&srv, &seed).await;
    let second = create_request(&srv, &seed).await;
    assert_eq!(first["sno"], 1);
    assert_eq!(second["sno"], 2);
    assert_eq!(first["status"], "drafted");

    let request = id(&first);
    let item = add_item(&srv, &seed, &request, 3, "10.00").await;
    assert_eq!(item["item_sno"], 1);
    assert_eq!(dec(&item["subtotal_local"]), Decimal::new(3000, 2));
    assert_eq!(dec(&item["unit_price_usd"]), Decimal::new(500, 2));
    assert_eq!(dec(&item["subtotal_usd"]), Decimal::new(1500, 2));

    let second_item = add_item(&srv, &seed, &request, 1, "1.00").await;
    assert_eq!(second_item["item_sno"], 2);

    let (status, list) = srv.get(&format!("/requests/{request}/items")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["items"].as_array().unwrap().len(), 2);

    let (status, list) = srv.get(&format!("/requests?office_id={}", seed.office)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn validation_failures_are_400_with_reason() {
    let srv = TestServer::spawn().await;
    let seed = seed(&srv).await;

    let mut body = request_body(&seed);
    body["approver1"] = Value::Null;
    let (status, err) = srv.post("/requests", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "validation_error");
    assert!(err["message"].as_str().unwrap().contains("approver"));

    let mut body = request_body(&seed);
    body["exchange_rate"] = json!("0");
    let (status, _) = srv.post("/requests", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let srv = TestServer::spawn().await;

    let (status, err) = srv.get(&format!("/requests/{}", Uuid::now_v7())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"], "not_found");

    let (status, err) = srv.get("/requests/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_id");

    let res = srv
        .client
        .get(srv.url("/requests"))
        .header("x-actor-id", "someone")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn allocation_cannot_exceed_one_hundred_percent() {
    let srv = TestServer::spawn().await;
    let seed = seed(&srv).await;
    let request = id(&create_request(&srv, &seed).await);
    let item = id(&add_item(&srv, &seed, &request, 1, "100.00").await);

    let (_, fund) = srv
        .post("/reference/codes/fund", json!({"country_code": "AF", "code": "F0001"}))
        .await;
    let (_, dept) = srv
        .post("/reference/codes/dept", json!({"country_code": "AF", "code": "D0001"}))
        .await;
    let split = |percent: &str| {
        json!({
            "gl_account": 4100,
            "fund_code_id": fund["id"],
            "dept_code_id": dept["id"],
            "office_code_id": seed.office,
            "allocation_percent": percent
        })
    };

    let path = format!("/items/{item}/finance-codes");
    let (status, first) = srv.post(&path, split("60")).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");

    let (status, err) = srv.post(&path, split("45")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "validation_error");

    let (status, _) = srv.post(&path, split("40")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, list) = srv.get(&path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["items"].as_array().unwrap().len(), 2);
    assert_eq!(dec(&list["allocation_total"]), Decimal::ONE_HUNDRED);

    let mut bad_gl = split("10");
    bad_gl["gl_account"] = json!("41A0");
    let (status, _) = srv.post(&path, bad_gl).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv
        .post("/reference/codes/region", json!({"country_code": "AF", "code": "R1"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn transitions_need_actor_and_are_logged() {
    let srv = TestServer::spawn().await;
    let seed = seed(&srv).await;
    let request = id(&create_request(&srv, &seed).await);
    let path = format!("/requests/{request}/transitions");

    let (status, err) = srv.post(&path, json!({"to": "procurement_verified"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "actor_required");

    let reviewer = Uuid::now_v7();
    let (status, body) = srv
        .post_as(reviewer, &path, json!({"to": "procurement_verified"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "procurement_verified");
    assert!(body["submission_date"].is_string());

    let (status, err) = srv.post_as(reviewer, &path, json!({"to": "approved"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "invariant_violation");

    let (status, body) = srv
        .post_as(seed.approver1, &path, json!({"to": "approved", "notes": "ok"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "approved");

    let (status, log) = srv.get(&format!("/requests/{request}/log")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(log["items"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn exchange_rate_change_reprices_items() {
    let srv = TestServer::spawn().await;
    let seed = seed(&srv).await;
    let request = id(&create_request(&srv, &seed).await);
    let item = id(&add_item(&srv, &seed, &request, 3, "10.00").await);

    let res = srv
        .client
        .patch(srv.url(&format!("/requests/{request}")))
        .json(&json!({"exchange_rate": "3.00"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, item) = srv.get(&format!("/items/{item}")).await;
    assert_eq!(dec(&item["unit_price_usd"]), Decimal::new(333, 2));
    assert_eq!(dec(&item["subtotal_usd"]), Decimal::new(999, 2));

    let (_, log) = srv.get(&format!("/requests/{request}/log")).await;
    let fields: Vec<&str> = log["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field_ref"].as_str())
        .collect();
    assert!(fields.contains(&"exchange_rate"), "{fields:?}");
}

#[tokio::test]
async fn attachments_upload_list_and_delete() {
    let srv = TestServer::spawn().await;
    let seed = seed(&srv).await;
    let request = id(&create_request(&srv, &seed).await);
    let item = id(&add_item(&srv, &seed, &request, 1, "1.00").await);

    let upload = |name: &str| {
        srv.client
            .post(srv.url(&format!("/items/{item}/attachments?file_name={name}")))
            .header("content-type", "application/pdf")
            .body(b"%PDF-1.4".to_vec())
            .send()
    };

    let (status, attachment) = read(upload("quote.pdf").await.unwrap()).await;
    assert_eq!(status, StatusCode::CREATED, "{attachment}");
    assert_eq!(attachment["size_bytes"], 8);
    assert_eq!(attachment["content_type"], "application/pdf");
    assert!(
        attachment["path"]
            .as_str()
            .unwrap()
            .starts_with(&format!("purchase_request/Kabul/pr_{request}/item_{item}/"))
    );

    let (status, _) = read(upload("quote.pdf").await.unwrap()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, list) = srv.get(&format!("/items/{item}/attachments")).await;
    assert_eq!(list["items"].as_array().unwrap().len(), 1);

    let status = srv.delete(&format!("/attachments/{}", id(&attachment))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, list) = srv.get(&format!("/items/{item}/attachments")).await;
    assert!(list["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn orders_total_their_lines_and_limit_receipts() {
    let srv = TestServer::spawn().await;
    let seed = seed(&srv).await;
    let request = id(&create_request(&srv, &seed).await);
    let item = id(&add_item(&srv, &seed, &request, 4, "10.00").await);

    let (status, order) = srv
        .post(&format!("/requests/{request}/orders"), json!({"notes": "urgent"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    let order = id(&order);

    let (status, detail) = srv
        .post(
            &format!("/orders/{order}/items"),
            json!({"item_id": item, "quantity_ordered": 4}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{detail}");
    assert_eq!(dec(&detail["order"]["total_local"]), Decimal::new(4000, 2));
    assert_eq!(dec(&detail["order"]["total_usd"]), Decimal::new(2000, 2));
    let line = id(&detail["items"][0]);

    let grns = format!("/orders/{order}/grns");
    let (status, grn) = srv
        .post(&grns, json!({"items": [{"order_item_id": line, "quantity_received": 3}]}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{grn}");

    let (status, _) = srv
        .post(&grns, json!({"items": [{"order_item_id": line, "quantity_received": 2}]}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, fetched) = srv.get(&format!("/grns/{}", id(&grn["note"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["items"][0]["quantity_received"], 3);
}

#[tokio::test]
async fn deleting_a_request_cascades() {
    let srv = TestServer::spawn().await;
    let seed = seed(&srv).await;
    let request = id(&create_request(&srv, &seed).await);
    let item = id(&add_item(&srv, &seed, &request, 1, "1.00").await);

    assert_eq!(srv.delete(&format!("/requests/{request}")).await, StatusCode::NO_CONTENT);
    let (status, _) = srv.get(&format!("/items/{item}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(srv.delete(&format!("/requests/{request}")).await, StatusCode::NOT_FOUND);
}
