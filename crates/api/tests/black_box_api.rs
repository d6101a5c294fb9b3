//! End-to-end tests driving the real router over HTTP on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use kejani_api::app::{build_app, AppState};
use kejani_api::config::{AppConfig, MpesaConfig};
use kejani_api::gate::Gate;
use kejani_api::mail::LogMailer;
use kejani_api::mpesa::MpesaClient;
use kejani_auth::TokenCodec;
use kejani_store::{Accounts, Collection, DocumentStore, MemoryStore};

const SECRET: &str = "black-box-secret";
const ISSUER: &str = "kejani-test";
const AUDIENCE: &str = "kejani-clients";

struct TestServer {
    base: String,
    store: Arc<MemoryStore>,
    codec: TokenCodec,
    http: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        let codec = TokenCodec::new(SECRET, ISSUER, AUDIENCE);
        let accounts = Arc::new(Accounts::new(store.clone()));
        let config = AppConfig {
            port: 0,
            jwt_secret: SECRET.to_string(),
            issuer: ISSUER.to_string(),
            audience: AUDIENCE.to_string(),
            max_body_kb: 5000,
            host_url: "http://localhost".to_string(),
            mpesa: MpesaConfig::default(),
        };
        let state = AppState {
            gate: Gate::new(codec.clone(), accounts, config.max_body_kb),
            store: store.clone(),
            codec: codec.clone(),
            mailer: Arc::new(LogMailer),
            mpesa: Arc::new(MpesaClient::new(config.mpesa.clone()).unwrap()),
            config,
        };
        let app = build_app(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{addr}"),
            store,
            codec,
            http: reqwest::Client::new(),
        }
    }

    /// Seeds a user document directly into the store.
    async fn seed_user(&self, email: &str, password: &str, verified: bool, roles: Value) {
        let hash = bcrypt::hash(password, 4).unwrap();
        self.store
            .save(
                Collection::AppUsers,
                json!({
                    "email": email,
                    "username": email.split('@').next().unwrap(),
                    "phone": "0712345678",
                    "password": hash,
                    "verified": verified,
                    "roles": roles,
                }),
            )
            .await
            .unwrap();
    }

    fn token_for(&self, email: &str) -> String {
        self.codec.issue_access(email).unwrap()
    }
}

async fn body_of(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}

#[tokio::test]
async fn ping_reports_running() {
    let server = TestServer::start().await;
    let response = server.http.get(&server.base).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body = body_of(response).await;
    assert_eq!(body["code"], 200);
    assert!(body["message"].as_str().unwrap().starts_with("Server running"));
}

#[tokio::test]
async fn protected_route_without_token_is_unauthorized() {
    let server = TestServer::start().await;
    let response = server
        .http
        .post(format!("{}/houses", server.base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let body = body_of(response).await;
    assert_eq!(body["message"], "Access token missing");
    assert!(body.get("payload").is_none());
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let server = TestServer::start().await;
    let exp = (Utc::now() - Duration::hours(1)).timestamp();
    let claims = json!({
        "sub": "admin@kejani.io",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "iat": exp - 60,
        "exp": exp,
    });
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let response = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(body_of(response).await["message"], "Invalid or expired token");
}

#[tokio::test]
async fn token_from_wrong_issuer_is_rejected_as_malformed() {
    let server = TestServer::start().await;
    let foreign = TokenCodec::new(SECRET, "someone-else", AUDIENCE);
    let token = foreign.issue_access("admin@kejani.io").unwrap();

    let response = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(body_of(response).await["message"], "Invalid access token");
}

#[tokio::test]
async fn valid_token_for_unknown_subject_is_not_found() {
    let server = TestServer::start().await;
    let response = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", server.token_for("ghost@kejani.io"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(body_of(response).await["message"], "User does not exist");
}

#[tokio::test]
async fn unverified_account_is_unauthorized() {
    let server = TestServer::start().await;
    server
        .seed_user("new@kejani.io", "pw", false, json!({ "admin": true }))
        .await;
    let response = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", server.token_for("new@kejani.io"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(body_of(response).await["message"], "Account not verified");
}

#[tokio::test]
async fn missing_role_is_unauthorized() {
    let server = TestServer::start().await;
    server
        .seed_user("tenant@kejani.io", "pw", true, json!({ "user": true }))
        .await;
    let response = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", server.token_for("tenant@kejani.io"))
        .json(&json!({
            "houseNumber": "A1", "rent": 100, "deposit": 100, "floorNumber": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(body_of(response).await["message"], "Not enough permissions");
}

#[tokio::test]
async fn missing_fields_are_listed_in_the_message() {
    let server = TestServer::start().await;
    server
        .seed_user("admin@kejani.io", "pw", true, json!({ "admin": true }))
        .await;
    let response = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", server.token_for("admin@kejani.io"))
        .json(&json!({ "houseNumber": "A1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let message = body_of(response).await["message"].as_str().unwrap().to_string();
    assert!(message.contains("rent"));
    assert!(message.contains("deposit"));
    assert!(message.contains("floorNumber"));
    assert!(!message.contains("houseNumber"));
}

#[tokio::test]
async fn oversized_body_gets_the_enveloped_413() {
    let server = TestServer::start().await;
    server
        .seed_user("admin@kejani.io", "pw", true, json!({ "admin": true }))
        .await;
    let response = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", server.token_for("admin@kejani.io"))
        .json(&json!({
            "houseNumber": "Z9",
            "rent": 1,
            "deposit": 1,
            "floorNumber": 9,
            "notes": "x".repeat(5001 * 1024),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
    let body = body_of(response).await;
    assert_eq!(body["code"], 413);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Request body is too large"));
}

#[tokio::test]
async fn large_body_under_the_ceiling_reaches_the_handler() {
    let server = TestServer::start().await;
    server
        .seed_user("admin@kejani.io", "pw", true, json!({ "admin": true }))
        .await;
    // 3 MB: above axum's default transport limit, below the 5000 KB ceiling.
    let response = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", server.token_for("admin@kejani.io"))
        .json(&json!({
            "houseNumber": "Z8",
            "rent": 1,
            "deposit": 1,
            "floorNumber": 8,
            "notes": "x".repeat(3 * 1024 * 1024),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(body_of(response).await["message"], "House created successfully");
}

#[tokio::test]
async fn house_lifecycle_create_conflict_list() {
    let server = TestServer::start().await;
    server
        .seed_user("admin@kejani.io", "pw", true, json!({ "admin": true }))
        .await;
    let token = server.token_for("admin@kejani.io");
    let house = json!({ "houseNumber": "B2", "rent": 15000, "deposit": 15000, "floorNumber": 2 });

    let created = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", &token)
        .json(&house)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    assert_eq!(body_of(created).await["message"], "House created successfully");

    let duplicate = server
        .http
        .post(format!("{}/houses", server.base))
        .header("access-token", &token)
        .json(&house)
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    let listed = server
        .http
        .get(format!("{}/houses/1", server.base))
        .header("access-token", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(listed.status(), 200);
    let body = body_of(listed).await;
    let data = body["payload"]["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["houseNumber"], "B2");
    assert_eq!(data[0]["addedBy"], "admin@kejani.io");
}

#[tokio::test]
async fn list_rejects_non_numeric_page() {
    let server = TestServer::start().await;
    server
        .seed_user("admin@kejani.io", "pw", true, json!({ "admin": true }))
        .await;
    let response = server
        .http
        .get(format!("{}/houses/latest", server.base))
        .header("access-token", server.token_for("admin@kejani.io"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(body_of(response).await["message"], "Expected param pageNumber");
}

#[tokio::test]
async fn login_issues_tokens_and_logout_invalidates_the_session() {
    let server = TestServer::start().await;
    server
        .seed_user("resident@kejani.io", "s3cret", true, json!({ "user": true }))
        .await;

    let wrong = server
        .http
        .post(format!("{}/login", server.base))
        .json(&json!({ "email": "resident@kejani.io", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let login = server
        .http
        .post(format!("{}/login", server.base))
        .json(&json!({ "email": "resident@kejani.io", "password": "s3cret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), 200);
    assert!(login.headers().contains_key("access-token"));
    assert!(login.headers().contains_key("refresh-token"));
    let body = body_of(login).await;
    let access = body["payload"]["accessToken"].as_str().unwrap().to_string();

    let logout = server
        .http
        .post(format!("{}/logout", server.base))
        .header("access-token", &access)
        .json(&json!({ "email": "resident@kejani.io" }))
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), 200);
    assert_eq!(body_of(logout).await["message"], "Logout successful");

    // Session record is gone; a second logout finds nothing to delete.
    let again = server
        .http
        .post(format!("{}/logout", server.base))
        .header("access-token", &access)
        .json(&json!({ "email": "resident@kejani.io" }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn logout_for_someone_else_is_not_allowed() {
    let server = TestServer::start().await;
    server
        .seed_user("a@kejani.io", "pw", true, json!({ "user": true }))
        .await;
    let response = server
        .http
        .post(format!("{}/logout", server.base))
        .header("access-token", server.token_for("a@kejani.io"))
        .json(&json!({ "email": "b@kejani.io" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(body_of(response).await["message"], "Operation not allowed");
}

#[tokio::test]
async fn admin_bootstrap_then_activation_flow() {
    let server = TestServer::start().await;
    let created = server
        .http
        .post(format!("{}/users/admin", server.base))
        .json(&json!({
            "firstName": "Asha",
            "lastName": "N",
            "username": "asha",
            "email": "asha@kejani.io",
            "phone": "0712345678",
            "idNumber": "12345678",
            "password": "pw",
            "profileImage": "",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    // Bootstrap admins are verified immediately and can create users.
    let token = server.token_for("asha@kejani.io");
    let user = server
        .http
        .post(format!("{}/users", server.base))
        .header("access-token", &token)
        .json(&json!({
            "username": "juma",
            "email": "juma@kejani.io",
            "phone": "0712000000",
            "idNumber": "87654321",
            "password": "pw",
            "profileImage": "",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(user.status(), 201);

    // New accounts cannot pass the gate until activated.
    let juma_token = server.token_for("juma@kejani.io");
    let blocked = server
        .http
        .get(format!("{}/payments/1", server.base))
        .header("access-token", &juma_token)
        .send()
        .await
        .unwrap();
    assert_eq!(blocked.status(), 401);

    let code = server
        .store
        .find_one(Collection::ActivationCodes, json!({ "owner": "juma@kejani.io" }))
        .await
        .unwrap()
        .unwrap()["code"]
        .as_str()
        .unwrap()
        .to_string();
    let activated = server
        .http
        .get(format!("{}/users/activate/juma@kejani.io/{code}", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(activated.status(), 200);

    let allowed = server
        .http
        .get(format!("{}/payments/1", server.base))
        .header("access-token", &juma_token)
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
}

#[tokio::test]
async fn non_admin_cannot_grant_roles() {
    let server = TestServer::start().await;
    server
        .seed_user("plain@kejani.io", "pw", true, json!({ "user": true }))
        .await;
    let response = server
        .http
        .put(format!("{}/users/some-id", server.base))
        .header("access-token", server.token_for("plain@kejani.io"))
        .json(&json!({ "roles": { "admin": true } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(
        body_of(response).await["message"],
        "You don't have permission for this task"
    );
}

#[tokio::test]
async fn payment_update_is_owner_scoped_and_strips_amount() {
    let server = TestServer::start().await;
    server
        .seed_user("payer@kejani.io", "pw", true, json!({ "user": true }))
        .await;
    let token = server.token_for("payer@kejani.io");

    let created = server
        .http
        .post(format!("{}/payments", server.base))
        .header("access-token", &token)
        .json(&json!({
            "title": "March rent",
            "description": "rent",
            "transactionCode": "QX12",
            "amount": 15000,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    // Spoofing another sender is rejected before any lookup.
    let spoofed = server
        .http
        .put(format!("{}/payments/QX12", server.base))
        .header("access-token", &token)
        .json(&json!({ "from": "other@kejani.io", "transactionCode": "QX12" }))
        .send()
        .await
        .unwrap();
    assert_eq!(spoofed.status(), 400);

    let updated = server
        .http
        .put(format!("{}/payments/QX12", server.base))
        .header("access-token", &token)
        .json(&json!({
            "from": "payer@kejani.io",
            "transactionCode": "QX12",
            "title": "March rent (edited)",
            "amount": 1,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), 200);

    let record = server
        .store
        .find_one(Collection::Payments, json!({ "transactionCode": "QX12" }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record["title"], "March rent (edited)");
    // Amount survives untouched.
    assert_eq!(record["amount"], 15000);
}

#[tokio::test]
async fn task_listing_joins_user_records() {
    let server = TestServer::start().await;
    server
        .seed_user("admin@kejani.io", "pw", true, json!({ "admin": true, "user": true }))
        .await;
    server
        .seed_user("fundi@kejani.io", "pw", true, json!({ "user": true }))
        .await;
    let token = server.token_for("admin@kejani.io");

    let created = server
        .http
        .post(format!("{}/tasks", server.base))
        .header("access-token", &token)
        .json(&json!({
            "to": "fundi@kejani.io",
            "title": "Fix leak",
            "description": "Kitchen tap",
            "scheduleDate": "2026-09-01",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    let listed = server
        .http
        .get(format!("{}/tasks/1", server.base))
        .header("access-token", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(listed.status(), 200);
    let body = body_of(listed).await;
    let data = body["payload"]["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["status"], "pending");
    assert_eq!(data[0]["assigneeName"], "fundi");
    assert_eq!(data[0]["creatorName"], "admin");
    // Joined user documents never leak password hashes.
    assert!(data[0].get("assignee").is_none());
}

#[tokio::test]
async fn stk_push_rejects_amount_below_one() {
    let server = TestServer::start().await;
    server
        .seed_user("payer@kejani.io", "pw", true, json!({ "user": true }))
        .await;
    let response = server
        .http
        .post(format!("{}/stk-push", server.base))
        .header("access-token", server.token_for("payer@kejani.io"))
        .json(&json!({ "amount": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(body_of(response).await["message"], "Amount cannot be less than 1");
}

#[tokio::test]
async fn stk_callback_is_open_and_persisted() {
    let server = TestServer::start().await;
    let payload = json!({ "Body": { "stkCallback": { "ResultCode": 0 } } });
    let response = server
        .http
        .post(format!("{}/stk/callback", server.base))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let saved = server
        .store
        .find(Collection::Callbacks, json!({}))
        .await
        .unwrap();
    assert_eq!(saved.len(), 1);
}
