use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use stockroom_api::app::services::AppServices;
use stockroom_core::ActorId;
use stockroom_infra::config::{BranchSeed, StockroomConfig};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = StockroomConfig {
            branches: ["Cucuta", "Bogota", "Medellin"]
                .iter()
                .map(|name| BranchSeed {
                    name: name.to_string(),
                    main: *name == "Cucuta",
                })
                .collect(),
            ..StockroomConfig::default()
        };

        // Same router as prod, in-memory backend, ephemeral port.
        let services = AppServices::in_memory(&config).await.unwrap();
        let app = stockroom_api::app::router(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Api {
    srv: TestServer,
    client: reqwest::Client,
    actor: String,
}

impl Api {
    async fn start() -> Self {
        Self {
            srv: TestServer::spawn().await,
            client: reqwest::Client::new(),
            actor: ActorId::new().to_string(),
        }
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.srv.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.srv.url(path))
            .header("x-actor-id", &self.actor)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn branch_id(&self, name: &str) -> String {
        let (_, branches) = self.get("/branches").await;
        branches
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["name"] == name)
            .map(|b| b["id"].as_str().unwrap().to_string())
            .unwrap()
    }

    async fn new_product(&self) -> String {
        let (status, body) = self.post("/products", json!({})).await;
        assert_eq!(status, StatusCode::CREATED);
        body["product_id"].as_str().unwrap().to_string()
    }

    async fn quantity(&self, product: &str, branch: &str) -> i64 {
        let (status, body) = self.get(&format!("/inventory/{product}/{branch}")).await;
        assert_eq!(status, StatusCode::OK);
        body["quantity"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn health_reports_backend() {
    let api = Api::start().await;
    let (status, body) = api.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn actor_required_for_mutating_endpoints() {
    let api = Api::start().await;

    let res = api
        .client
        .post(api.srv.url("/products"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let res = api
        .client
        .post(api.srv.url("/inventory/assign"))
        .header("x-actor-id", "not-a-uuid")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Reads stay open.
    let (status, _) = api.get("/branches").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn assign_transfer_and_history_flow() {
    let api = Api::start().await;
    let a = api.branch_id("Bogota").await;
    let b = api.branch_id("Medellin").await;
    let p = api.new_product().await;

    let (status, movement) = api
        .post("/inventory/assign", json!({ "product_id": p, "branch_id": a, "quantity": 100 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(movement["kind"], "inbound");
    assert_eq!(movement["actor"], api.actor.as_str());

    let (status, movement) = api
        .post(
            "/inventory/transfer",
            json!({ "product_id": p, "from_branch_id": a, "to_branch_id": b, "quantity": 30 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(movement["kind"], "transfer");
    assert_eq!(movement["quantity"], 30);

    assert_eq!(api.quantity(&p, &a).await, 70);
    assert_eq!(api.quantity(&p, &b).await, 30);

    let (status, err) = api
        .post(
            "/inventory/transfer",
            json!({ "product_id": p, "from_branch_id": a, "to_branch_id": b, "quantity": 80 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"], "insufficient_stock");
    assert_eq!(err["available"], 70);
    assert_eq!(api.quantity(&p, &a).await, 70);

    let (status, grouped) = api.get(&format!("/inventory/{p}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grouped["total"], 100);
    assert_eq!(grouped["branches"].as_array().unwrap().len(), 3);

    let (status, page) = api.get(&format!("/movements?product_id={p}&kind=transfer")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["movements"][0]["from_branch_id"], a.as_str());

    let (status, page) = api.get(&format!("/movements?branch_id={a}&limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["has_more"], true);
    assert_eq!(page["movements"][0]["kind"], "transfer");
}

#[tokio::test]
async fn invalid_input_is_rejected_with_400() {
    let api = Api::start().await;
    let a = api.branch_id("Bogota").await;
    let p = api.new_product().await;

    let (status, err) = api
        .post("/inventory/assign", json!({ "product_id": p, "branch_id": a, "quantity": 0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_argument");

    let (status, _) = api
        .post(
            "/inventory/transfer",
            json!({ "product_id": p, "from_branch_id": a, "to_branch_id": a, "quantity": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .post(
            "/inventory/assign",
            json!({ "product_id": ActorId::new().to_string(), "branch_id": a, "quantity": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api.post("/inventory/assign", json!({ "quantity": "lots" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api.get("/inventory/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api.get("/movements?kind=teleport").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, page) = api.get("/movements").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn branch_management_and_bulk_unassign() {
    let api = Api::start().await;
    let main = api.branch_id("Cucuta").await;

    let (status, branch) = api.post("/branches", json!({ "name": "Cali" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(branch["is_main"], false);
    let cali = branch["id"].as_str().unwrap().to_string();

    let (status, _) = api.post("/branches", json!({ "name": " cali " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let p1 = api.new_product().await;
    let p2 = api.new_product().await;
    for (p, q) in [(&p1, 4), (&p2, 6)] {
        let (status, _) = api
            .post("/inventory/assign", json!({ "product_id": p, "branch_id": cali, "quantity": q }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, report) = api.post(&format!("/branches/{cali}/unassign"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["main_branch_id"], main.as_str());
    assert_eq!(report["succeeded"], 2);
    assert_eq!(report["failed"], 0);
    assert!(report["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .all(|o| o["status"] == "moved"));

    assert_eq!(api.quantity(&p1, &cali).await, 0);
    assert_eq!(api.quantity(&p2, &main).await, 6);

    let (status, _) = api.post(&format!("/branches/{main}/unassign"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, summary) = api.get("/branches/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_units"], 10);

    let (status, moved) = api.post(&format!("/branches/{cali}/main"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["is_main"], true);

    let (status, renamed) = api
        .post(&format!("/branches/{cali}/rename"), json!({ "name": "Cali Norte" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Cali Norte");
}

#[tokio::test]
async fn concurrent_transfers_over_http_never_oversell() {
    let api = Arc::new(Api::start().await);
    let a = api.branch_id("Bogota").await;
    let b = api.branch_id("Medellin").await;
    let p = api.new_product().await;

    api.post("/inventory/assign", json!({ "product_id": p, "branch_id": a, "quantity": 5 }))
        .await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let api = api.clone();
        let body = json!({ "product_id": p, "from_branch_id": a, "to_branch_id": b, "quantity": 1 });
        handles.push(tokio::spawn(async move { api.post("/inventory/transfer", body).await.0 }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::UNPROCESSABLE_ENTITY => {}
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(created, 5);
    assert_eq!(api.quantity(&p, &a).await, 0);
    assert_eq!(api.quantity(&p, &b).await, 5);

    let (status, report) = api.get("/inventory/reconcile").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["consistent"], true);
}
