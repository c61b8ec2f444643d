use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};
use stockroom_api::app::services::AppServices;
use stockroom_auth::{JwtClaims, Role, UserId};
use stockroom_core::{EntityId, TenantId};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over an in-memory store, on an ephemeral port.
        let app = stockroom_api::app::router_with(JWT_SECRET.as_bytes(), AppServices::in_memory());
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

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn send(&self, method: reqwest::Method, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, token, path, body).await
    }

    async fn register_sku(&self, token: &str, code: &str) -> String {
        let (status, body) = self
            .post(token, "/inventory/skus", json!({ "code": code, "name": code }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn stock(&self, token: &str, sku_id: &str) -> i64 {
        let (status, body) = self.get(token, &format!("/inventory/skus/{sku_id}")).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["current_stock"].as_i64().unwrap()
    }

    /// One-line delivery; returns (record id, item id).
    async fn receive(&self, token: &str, sku_id: &str, invoice: &str, total: i64, received: i64) -> (String, String) {
        let (status, body) = self
            .post(
                token,
                "/inventory/incoming",
                json!({
                    "invoice_number": invoice,
                    "vendor_id": EntityId::new(),
                    "receiving_date": "2024-03-01",
                    "items": [{
                        "sku_id": sku_id,
                        "total_quantity": total,
                        "received": received,
                        "unit_price": 50
                    }]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["id"].as_str().unwrap().to_string(),
            body["items"][0]["id"].as_str().unwrap().to_string(),
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        tenant_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin() -> String {
    mint_jwt(TenantId::new(), vec![Role::ADMIN])
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(srv.url("/inventory/incoming/history"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let token = mint_jwt(tenant_id, vec![Role::STOREKEEPER]);

    let (status, body) = srv.get(&token, "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], tenant_id.to_string());
    assert_eq!(body["roles"], json!(["storekeeper"]));
}

#[tokio::test]
async fn creating_a_record_adds_received_to_stock() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let sku = srv.register_sku(&token, "CBL-01").await;

    let (record_id, _) = srv.receive(&token, &sku, "INV-100", 100, 80).await;
    assert_eq!(srv.stock(&token, &sku).await, 80);

    let (status, items) = srv
        .get(&token, &format!("/inventory/incoming/{record_id}/items"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(items[0]["short"], 20);
    assert_eq!(items[0]["rejected"], 0);
    assert_eq!(items[0]["available"], 80);
    assert_eq!(items[0]["total_value"], 4000);
}

#[tokio::test]
async fn strict_short_update_enforces_the_total() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let sku = srv.register_sku(&token, "CBL-02").await;
    let (record_id, item_id) = srv.receive(&token, &sku, "INV-200", 100, 80).await;
    let path = format!("/inventory/incoming/{record_id}/items/{item_id}/short");

    let (status, body) = srv
        .send(reqwest::Method::PUT, &token, &path, json!({ "received": 81, "short": 20 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "received + short + rejected must equal Total Quantity");
    assert_eq!(srv.stock(&token, &sku).await, 80);

    let (status, body) = srv
        .send(
            reqwest::Method::PUT,
            &token,
            &path,
            json!({ "received": 90, "short": 10, "challan_number": "CH-9" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["stock_delta"]["delta"], 10);
    assert_eq!(body["item"]["total_value"], 4500);
    assert_eq!(body["item"]["challan_number"], "CH-9");
    assert_eq!(srv.stock(&token, &sku).await, 90);
}

#[tokio::test]
async fn oversized_quantities_are_rejected_without_moving_stock() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let sku = srv.register_sku(&token, "CBL-09").await;
    let (record_id, item_id) = srv.receive(&token, &sku, "INV-900", 100, 80).await;

    let (status, body) = srv
        .send(
            reqwest::Method::PUT,
            &token,
            &format!("/inventory/incoming/{record_id}/items/{item_id}/short"),
            json!({ "received": 102, "short": i64::MAX, "rejected": i64::MAX }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "received + short + rejected must equal Total Quantity");
    assert_eq!(srv.stock(&token, &sku).await, 80);
}

#[tokio::test]
async fn move_short_to_rejected_writes_off_the_shortfall() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let sku = srv.register_sku(&token, "CBL-03").await;
    let (record_id, item_id) = srv.receive(&token, &sku, "INV-300", 100, 80).await;
    let item_path = format!("/inventory/incoming/{record_id}/items/{item_id}");

    let (status, _) = srv
        .send(reqwest::Method::PATCH, &token, &item_path, json!({ "short": 20, "rejected": 5 }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv
        .post(&token, &format!("{item_path}/move-short-to-rejected"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["item"]["short"], 0);
    assert_eq!(body["item"]["rejected"], 25);
    assert_eq!(body["stock_delta"]["delta"], 20);
    assert_eq!(srv.stock(&token, &sku).await, 100);

    let (status, body) = srv
        .post(&token, &format!("{item_path}/move-short-to-rejected"), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "no outstanding short quantity to move to rejected");
}

#[tokio::test]
async fn ordinary_adjustment_never_touches_received_or_stock() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let sku = srv.register_sku(&token, "CBL-04").await;
    let (record_id, item_id) = srv.receive(&token, &sku, "INV-400", 100, 100).await;
    let item_path = format!("/inventory/incoming/{record_id}/items/{item_id}");

    let (status, body) = srv
        .send(reqwest::Method::PATCH, &token, &item_path, json!({ "rejected": 10 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["item"]["available"], 90);
    assert_eq!(body["item"]["received"], 100);
    assert_eq!(body["stock_delta"]["delta"], 0);
    assert_eq!(srv.stock(&token, &sku).await, 100);

    let (status, body) = srv
        .send(reqwest::Method::PATCH, &token, &item_path, json!({ "received": 90 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_body");
}

#[tokio::test]
async fn viewer_cannot_mutate() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = mint_jwt(tenant_id, vec![Role::ADMIN]);
    let viewer = mint_jwt(tenant_id, vec![Role::VIEWER]);
    let sku = srv.register_sku(&admin, "CBL-05").await;
    let (record_id, item_id) = srv.receive(&admin, &sku, "INV-500", 10, 8).await;

    let (status, _) = srv
        .post(
            &viewer,
            &format!("/inventory/incoming/{record_id}/items/{item_id}/move-short-to-rejected"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.get(&viewer, &format!("/inventory/incoming/{record_id}")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn records_of_other_tenants_are_not_found() {
    let srv = TestServer::spawn().await;
    let owner = admin();
    let stranger = admin();
    let sku = srv.register_sku(&owner, "CBL-06").await;
    let (record_id, item_id) = srv.receive(&owner, &sku, "INV-600", 10, 8).await;

    let (status, _) = srv.get(&stranger, &format!("/inventory/incoming/{record_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv
        .post(
            &stranger,
            &format!("/inventory/incoming/{record_id}/items/{item_id}/move-short-to-rejected"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(srv.stock(&owner, &sku).await, 8);

    let (status, body) = srv.get(&owner, "/inventory/incoming/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn history_groups_by_invoice_and_filters_by_status() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let sku = srv.register_sku(&token, "CBL-07").await;
    srv.receive(&token, &sku, "INV-700", 10, 10).await;
    let (_, _) = srv.receive(&token, &sku, "INV-701", 10, 6).await;

    let (status, all) = srv.get(&token, "/inventory/incoming/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (status, pending) = srv
        .get(&token, "/inventory/incoming/history?status=Pending")
        .await;
    assert_eq!(status, StatusCode::OK);
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["invoice_number"], "INV-701");
    assert_eq!(pending[0]["short"], 4);

    let (status, body) = srv
        .get(&token, "/inventory/incoming/history?status=done")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn cancelled_records_reject_line_item_changes() {
    let srv = TestServer::spawn().await;
    let token = admin();
    let sku = srv.register_sku(&token, "CBL-08").await;
    let (record_id, item_id) = srv.receive(&token, &sku, "INV-800", 10, 8).await;

    let (status, body) = srv
        .post(
            &token,
            &format!("/inventory/incoming/{record_id}/status"),
            json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["from"], "draft");
    assert_eq!(body["to"], "cancelled");

    let (status, _) = srv
        .post(
            &token,
            &format!("/inventory/incoming/{record_id}/items/{item_id}/move-short-to-rejected"),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(srv.stock(&token, &sku).await, 8);
}
