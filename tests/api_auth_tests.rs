//! 会话 API 集成测试

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::json;
use serial_test::serial;
use session_service::{models::api_key::NewApiKey, repository::ApiKeyRepository};
use tower::ServiceExt;

mod common;
use common::{
    bearer_request, body_json, create_app, create_offline_app_state, create_test_app_state,
    create_test_config, json_request, setup_test_db, ADMIN_EMAIL, ADMIN_PASSWORD, ADMIN_USERNAME,
};

fn login_body(password: &str) -> serde_json::Value {
    json!({
        "username": ADMIN_USERNAME,
        "password": password
    })
}

// ==================== 无需数据库 ====================

#[tokio::test]
async fn test_me_without_authorization_header() {
    let app = create_app(create_offline_app_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], 401);
    assert_eq!(json["error"]["message"], "Unauthorized");
}

#[tokio::test]
async fn test_me_with_malformed_authorization_header() {
    for value in ["Basic abc", "Bearer", "Bearer ", "token-without-scheme"] {
        let app = create_app(create_offline_app_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/me")
                    .header(header::AUTHORIZATION, value)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "header: {:?}", value);
    }
}

#[tokio::test]
async fn test_logout_without_authorization_header() {
    let app = create_app(create_offline_app_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_store_failure_during_verify_is_unauthorized() {
    // 数据库不可达时不泄露内部错误
    let app = create_app(create_offline_app_state());

    let response = app
        .oneshot(bearer_request("GET", "/api/me", "some-token"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route_with_token_is_not_authenticated() {
    // 认证中间件只挂在已匹配的路由上，未知路径不触发 key 校验
    for method in ["GET", "POST"] {
        let app = create_app(create_offline_app_state());

        let response = app
            .oneshot(bearer_request(method, "/api/mee", "some-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND, "method: {}", method);
    }
}

#[tokio::test]
async fn test_admin_sweep_without_authorization_header() {
    let app = create_app(create_offline_app_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/sweep-expired-keys")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_malformed_json() {
    let app = create_app(create_offline_app_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/root-login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    let message = json["error"]["message"].as_str().unwrap();
    assert!(message.starts_with("Invalid JSON string"), "message: {}", message);
}

#[tokio::test]
async fn test_login_missing_fields() {
    let app = create_app(create_offline_app_state());

    let response = app
        .oneshot(json_request("POST", "/api/root-login", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(
        json["error"]["message"],
        "password is a required field, username is a required field"
    );
    assert_eq!(json["error"]["fields"][0]["field"], "password");
    assert_eq!(json["error"]["fields"][1]["field"], "username");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = create_app(create_offline_app_state());

    let response = app
        .oneshot(json_request("POST", "/api/root-login", login_body("WrongPassword")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "Invalid Username or Password");
    assert!(json.get("token").is_none());
}

// ==================== 需要数据库 ====================

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_login_me_logout_flow() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(pool);

    // 登录
    let response = create_app(state.clone())
        .oneshot(json_request("POST", "/api/root-login", login_body(ADMIN_PASSWORD)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let token = json["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 48);

    // 当前身份
    let response = create_app(state.clone())
        .oneshot(bearer_request("GET", "/api/me", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["email_address"], ADMIN_EMAIL);
    assert_eq!(json["username"], "Administrator");
    assert_eq!(json["role"], json!(["admin"]));

    // 登出
    let response = create_app(state.clone())
        .oneshot(bearer_request("POST", "/api/logout", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));

    // 登出后 key 失效
    let response = create_app(state.clone())
        .oneshot(bearer_request("GET", "/api/me", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_login_wrong_password_inserts_nothing() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(pool.clone());

    let response = create_app(state)
        .oneshot(json_request("POST", "/api/root-login", login_body("WrongPassword")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_verify_extends_expiry() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(pool.clone());

    let repo = ApiKeyRepository::new(pool.clone());
    let soon = Utc::now() + Duration::minutes(1);
    repo.insert_api_keys(&[NewApiKey {
        key: "short-lived".to_string(),
        external_subject_id: "subject-1".to_string(),
        user_id: 7,
        email_address: Some("user@mail.com".to_string()),
        profile_picture: None,
        roles: vec![],
        expire_time: soon,
    }])
    .await
    .unwrap();

    let response = create_app(state)
        .oneshot(bearer_request("GET", "/api/me", "short-lived"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let expire_time: chrono::DateTime<Utc> =
        sqlx::query_scalar("SELECT expire_time FROM api_keys WHERE key = $1")
            .bind("short-lived")
            .fetch_one(&pool)
            .await
            .unwrap();
    // key_ttl_secs = 600
    assert!(expire_time > soon + Duration::minutes(8));
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_admin_sweep_requires_admin_role() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(pool.clone());

    let repo = ApiKeyRepository::new(pool);
    repo.insert_api_keys(&[NewApiKey {
        key: "no-roles".to_string(),
        external_subject_id: "subject-2".to_string(),
        user_id: 8,
        email_address: None,
        profile_picture: None,
        roles: vec![],
        expire_time: Utc::now() + Duration::hours(1),
    }])
    .await
    .unwrap();

    let response = create_app(state)
        .oneshot(bearer_request("POST", "/api/admin/sweep-expired-keys", "no-roles"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_admin_sweep_with_root_token() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(pool.clone());

    let repo = ApiKeyRepository::new(pool);
    repo.insert_api_keys(&[NewApiKey {
        key: "already-expired".to_string(),
        external_subject_id: "subject-3".to_string(),
        user_id: 9,
        email_address: None,
        profile_picture: None,
        roles: vec!["admin".to_string()],
        expire_time: Utc::now() - Duration::hours(1),
    }])
    .await
    .unwrap();

    let response = create_app(state.clone())
        .oneshot(json_request("POST", "/api/root-login", login_body(ADMIN_PASSWORD)))
        .await
        .unwrap();
    let token = body_json(response).await["token"].as_str().unwrap().to_string();

    let response = create_app(state)
        .oneshot(bearer_request("POST", "/api/admin/sweep-expired-keys", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "deleted": 1 }));
}

#[tokio::test]
#[ignore] // 需要数据库
#[serial]
async fn test_activity_log_records_requests() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(pool.clone());

    // 调用方重试时复用同一个 x-request-no，两次请求都要留下记录
    let caller_request_no = uuid::Uuid::new_v4().to_string();
    let mut request_ids = Vec::new();
    for _ in 0..2 {
        let response = create_app(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/root-login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-request-no", &caller_request_no)
                    .body(Body::from(login_body("WrongPassword").to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request_id = response.headers()["x-request-id"].to_str().unwrap();
        request_ids.push(uuid::Uuid::parse_str(request_id).unwrap());
    }
    assert_ne!(request_ids[0], request_ids[1]);

    for request_id in &request_ids {
        let (service_code, status, request_body): (String, i32, Option<String>) =
            sqlx::query_as(
                "SELECT service_code, http_status_code, request_body \
                 FROM activity_log WHERE request_no = $1",
            )
            .bind(request_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(service_code, "/api/root-login");
        assert_eq!(status, 400);

        // 密码不落库
        let request_body = request_body.unwrap();
        assert!(!request_body.contains("WrongPassword"));
        assert!(request_body.contains(ADMIN_USERNAME));
    }

    // 健康检查不写活动日志
    create_app(state)
        .oneshot(
            Request::builder()
                .uri("/api/health-check")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activity_log")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}
