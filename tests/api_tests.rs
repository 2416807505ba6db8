//! HTTP surface exercised through the router, without binding a socket.

mod test_utils;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use provisioning::models::ProviderTag;
use provisioning::server::create_app;
use serde_json::{Value, json};
use test_utils::{OPERATOR_TOKEN, Script, ScriptedFactory, configure_provider, create_employee};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    db: sea_orm::DatabaseConnection,
    state: provisioning::server::AppState,
}

async fn test_app(factory: std::sync::Arc<ScriptedFactory>) -> TestApp {
    let db = test_utils::setup_test_db().await.unwrap();
    let state = test_utils::test_state(db.clone(), factory).unwrap();
    TestApp {
        router: create_app(state.clone()),
        db,
        state,
    }
}

async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    actor: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", OPERATOR_TOKEN));
    if let Some(actor) = actor {
        builder = builder.header("X-Actor-Id", actor.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_public_routes_need_no_token() {
    let app = test_app(ScriptedFactory::new()).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let info: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["service"], "provisioning-engine");

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_reject_missing_token() {
    let app = test_app(ScriptedFactory::new()).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/providers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_provider_catalogue_reports_configuration() {
    let app = test_app(ScriptedFactory::new()).await;
    configure_provider(&app.state.secrets, ProviderTag::Slack)
        .await
        .unwrap();

    let (status, body) = call(&app.router, Method::GET, "/providers", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 4);

    let slack = providers.iter().find(|p| p["provider"] == "slack").unwrap();
    assert_eq!(slack["configured"], true);
    assert_eq!(slack["externalIdRule"], "email_local_part");
    let google = providers.iter().find(|p| p["provider"] == "google").unwrap();
    assert_eq!(google["configured"], false);
}

#[tokio::test]
async fn test_bulk_provisioning_records_a_bulk_onboarding_request() {
    let factory = ScriptedFactory::new();
    factory.script(ProviderTag::Slack, Script::Fail("rate_limited"));
    let app = test_app(factory).await;
    configure_provider(&app.state.secrets, ProviderTag::Google)
        .await
        .unwrap();
    configure_provider(&app.state.secrets, ProviderTag::Slack)
        .await
        .unwrap();
    let ada = create_employee(&app.db, "ada.lovelace@example.com")
        .await
        .unwrap();
    let operator = Uuid::new_v4();

    let (status, body) = call(
        &app.router,
        Method::POST,
        "/provisioning/bulk",
        Some(operator),
        Some(json!({ "employeeIds": [ada.id], "providers": ["google", "slack"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "partial_success");
    assert_eq!(body["summary"]["successRate"], "50.0%");
    assert_eq!(body["results"][0]["provider"], "google");
    assert_eq!(body["errors"][0]["code"], "PROVIDER_ERROR");

    let id = body["workflowRequestId"].as_str().unwrap().to_string();
    let (status, detail) = call(
        &app.router,
        Method::GET,
        &format!("/workflows/{}", id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["request"]["type"], "bulk_onboarding");
    assert_eq!(detail["request"]["requesterId"], operator.to_string());
    assert_eq!(detail["request"]["executionReport"]["errorCount"], 1);

    let (status, audit) = call(
        &app.router,
        Method::GET,
        "/audit-logs?action=account.created",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(audit["page"]["total"], 1);
}

#[tokio::test]
async fn test_bulk_request_stores_the_deduplicated_inputs() {
    let app = test_app(ScriptedFactory::new()).await;
    configure_provider(&app.state.secrets, ProviderTag::Google)
        .await
        .unwrap();
    let ada = create_employee(&app.db, "ada.lovelace@example.com")
        .await
        .unwrap();

    let (status, body) = call(
        &app.router,
        Method::POST,
        "/provisioning/bulk",
        Some(Uuid::new_v4()),
        Some(json!({
            "employeeIds": [ada.id, ada.id],
            "providers": ["google", "google"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["totalOperations"], 1);

    let id = body["workflowRequestId"].as_str().unwrap().to_string();
    let (_, detail) = call(
        &app.router,
        Method::GET,
        &format!("/workflows/{}", id),
        None,
        None,
    )
    .await;
    let data = &detail["request"]["data"];
    assert_eq!(data["employeeIds"], json!([ada.id]));
    assert_eq!(data["providers"], json!(["google"]));
    assert_eq!(data["summary"]["totalOperations"], 1);
}

#[tokio::test]
async fn test_bulk_provisioning_validates_input() {
    let app = test_app(ScriptedFactory::new()).await;

    let (status, body) = call(
        &app.router,
        Method::POST,
        "/provisioning/bulk",
        Some(Uuid::new_v4()),
        Some(json!({ "employeeIds": [], "providers": ["google"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, _) = call(
        &app.router,
        Method::POST,
        "/provisioning/bulk",
        Some(Uuid::new_v4()),
        Some(json!({ "employeeIds": [Uuid::new_v4()], "providers": ["myspace"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_single_account_creation_and_deactivation() {
    let app = test_app(ScriptedFactory::new()).await;
    configure_provider(&app.state.secrets, ProviderTag::Google)
        .await
        .unwrap();
    let ada = create_employee(&app.db, "ada.lovelace@example.com")
        .await
        .unwrap();
    let uri = format!("/employees/{}/accounts", ada.id);

    let (status, created) = call(
        &app.router,
        Method::POST,
        &uri,
        None,
        Some(json!({ "provider": "google" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["accountId"], "ada.lovelace@example.com");

    let (status, body) = call(
        &app.router,
        Method::POST,
        &uri,
        None,
        Some(json!({ "provider": "google" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_EXISTS");

    let account_id = created["providerAccountId"].as_str().unwrap();
    let (status, account) = call(
        &app.router,
        Method::DELETE,
        &format!("/accounts/{}", account_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["status"], "deleted");
}

#[tokio::test]
async fn test_approval_flow_over_http() {
    let app = test_app(ScriptedFactory::new()).await;
    let (requester, approver) = (Uuid::new_v4(), Uuid::new_v4());

    let (status, created) = call(
        &app.router,
        Method::POST,
        "/workflows",
        Some(requester),
        Some(json!({
            "type": "saas_access",
            "targetUserId": Uuid::new_v4(),
            "data": { "provider": "slack" },
            "approverIds": [approver]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["request"]["status"], "pending");
    assert_eq!(created["request"]["requesterId"], requester.to_string());
    let id = created["request"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app.router,
        Method::POST,
        &format!("/workflows/{}/advance", id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, decided) = call(
        &app.router,
        Method::POST,
        &format!("/workflows/{}/approvals", id),
        Some(approver),
        Some(json!({ "decision": "approve", "comment": "fine" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decided["request"]["status"], "approved");
    assert_eq!(decided["approvals"][0]["status"], "approved");

    let (status, advanced) = call(
        &app.router,
        Method::POST,
        &format!("/workflows/{}/advance", id),
        None,
        Some(json!({ "executionReport": { "successCount": 1, "errorCount": 0 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(advanced["status"], "completed");

    let (status, listed) = call(
        &app.router,
        Method::GET,
        "/workflows?status=completed",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["page"]["total"], 1);
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let app = test_app(ScriptedFactory::new()).await;

    let (status, body) = call(
        &app.router,
        Method::GET,
        &format!("/workflows/{}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = call(&app.router, Method::GET, "/workflows/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_secret_lifecycle_over_http() {
    let app = test_app(ScriptedFactory::new()).await;

    let (status, body) = call(&app.router, Method::GET, "/secrets/slack", None, None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["code"], "NOT_CONFIGURED");

    let (status, _) = call(&app.router, Method::GET, "/secrets/myspace", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = call(
        &app.router,
        Method::POST,
        "/secrets",
        None,
        Some(json!({
            "provider": "slack",
            "clientId": "client",
            "clientSecret": "s3cret",
            "signingSecret": "signing",
            "botToken": "xoxb-1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["isActive"], false);
    assert_eq!(created["hasBotToken"], true);
    assert!(created.get("clientSecret").is_none());
    let id = created["id"].as_str().unwrap().to_string();

    let (status, activated) = call(
        &app.router,
        Method::POST,
        &format!("/secrets/{}/activate", id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(activated["isActive"], true);

    let (status, active) = call(&app.router, Method::GET, "/secrets/slack", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["clientSecret"], "s3cret");
    assert_eq!(active["botToken"], "xoxb-1");

    let (status, tested) = call(
        &app.router,
        Method::POST,
        "/secrets/test",
        None,
        Some(json!({
            "provider": "slack",
            "clientId": "client",
            "clientSecret": "s3cret",
            "signingSecret": "signing"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tested["outcome"], "success");

    let (status, _) = call(
        &app.router,
        Method::DELETE,
        &format!("/secrets/{}", id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app.router, Method::GET, "/secrets/slack", None, None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = test_app(ScriptedFactory::new()).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/workflows")
        .header(header::AUTHORIZATION, format!("Bearer {}", OPERATOR_TOKEN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
