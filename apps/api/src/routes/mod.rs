pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::billing::handlers as billing;
use crate::resume::handlers as resume;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resume API
        .route(
            "/api/resume",
            get(resume::handle_get_resume).post(resume::handle_save_resume),
        )
        .route("/api/resume/preview", get(resume::handle_preview))
        .route("/api/resume/export", get(resume::handle_export))
        // Billing API
        .route(
            "/api/subscription",
            get(billing::handle_subscription_status),
        )
        .route("/api/checkout", post(billing::handle_create_checkout))
        .route("/api/webhooks/stripe", post(billing::handle_stripe_webhook))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::billing::webhook::sign;
    use crate::models::resume::ResumeData;

    const ADA: &str = "token-ada";
    const GRACE: &str = "token-grace";

    fn test_state() -> AppState {
        AppState::for_tests(&[(ADA, "user_ada"), (GRACE, "user_grace")])
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(t) = token {
            builder = builder.header("authorization", format!("Bearer {t}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str, token: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn full_resume() -> Value {
        json!({
            "personal": {
                "name": "Ada Lovelace",
                "email": "ada@example.com",
                "phone": "555-0100",
                "linkedin": "linkedin.com/in/ada",
                "github": "github.com/ada"
            },
            "education": [
                { "school": "University of London", "degree": "BSc Mathematics", "start_date": "2015", "end_date": "2019" },
                { "school": "Royal Institution", "degree": "Certificate" }
            ],
            "experience": [
                { "company": "Analytical Engines", "role": "Engineer", "bullets": ["Wrote the first program", "Reduced errors by 40%"] }
            ],
            "projects": [
                { "name": "Note G", "tech_stack": "Punch cards", "bullets": ["Computed Bernoulli numbers"] }
            ],
            "skills": [
                { "category": "languages", "items": ["Rust", "TypeScript"] },
                { "category": "developer_tools", "items": ["Git"] }
            ]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state());
        let (status, body) = send_json(&app, get_req("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_resume_requires_auth() {
        let app = build_router(test_state());
        let (status, body) = send_json(&app, get_req("/api/resume", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = send(&app, get_req("/api/resume", Some("forged"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_cookie_authenticates() {
        let app = build_router(test_state());
        let request = Request::builder()
            .uri("/api/resume")
            .header("cookie", format!("__session={ADA}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_resume_null_before_first_save() {
        let app = build_router(test_state());
        let (status, body) = send_json(&app, get_req("/api/resume", Some(ADA))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["resume"].is_null());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let app = build_router(test_state());
        let payload = full_resume();

        let (status, saved) = send_json(&app, post_req("/api/resume", ADA, &payload)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, loaded) = send_json(&app, get_req("/api/resume", Some(ADA))).await;
        let expected: ResumeData = serde_json::from_value(payload).unwrap();
        let loaded_data: ResumeData = serde_json::from_value(loaded["resume"].clone()).unwrap();
        assert_eq!(loaded_data, expected);
        assert_eq!(loaded["resume"]["id"], saved["resume"]["id"]);
        assert_eq!(loaded["resume"]["education"][1]["school"], "Royal Institution");
    }

    #[tokio::test]
    async fn test_second_save_replaces_children() {
        let app = build_router(test_state());
        let (_, first) = send_json(&app, post_req("/api/resume", ADA, &full_resume())).await;

        let replacement = json!({
            "personal": { "name": "Ada King" },
            "experience": [{ "company": "Babbage & Co" }]
        });
        let (status, _) = send_json(&app, post_req("/api/resume", ADA, &replacement)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, loaded) = send_json(&app, get_req("/api/resume", Some(ADA))).await;
        let resume = &loaded["resume"];
        assert_eq!(resume["id"], first["resume"]["id"], "one resume per user");
        assert_eq!(resume["personal"]["name"], "Ada King");
        assert!(resume["personal"]["email"].is_null());
        assert_eq!(resume["education"].as_array().unwrap().len(), 0);
        assert_eq!(resume["experience"].as_array().unwrap().len(), 1);
        assert_eq!(resume["skills"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_resumes_are_per_user() {
        let app = build_router(test_state());
        send_json(&app, post_req("/api/resume", ADA, &full_resume())).await;
        let (_, body) = send_json(&app, get_req("/api/resume", Some(GRACE))).await;
        assert!(body["resume"].is_null());
    }

    #[tokio::test]
    async fn test_over_cap_rejected_and_not_stored() {
        let app = build_router(test_state());
        let payload = json!({ "education": [{}, {}, {}] });
        let (status, body) = send_json(&app, post_req("/api/resume", ADA, &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (_, loaded) = send_json(&app, get_req("/api/resume", Some(ADA))).await;
        assert!(loaded["resume"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_skill_category_is_bad_request() {
        let app = build_router(test_state());
        let payload = json!({ "skills": [{ "category": "databases", "items": ["Postgres"] }] });
        let (status, body) = send_json(&app, post_req("/api/resume", ADA, &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_nul_in_payload_is_bad_request() {
        let app = build_router(test_state());
        let payload = json!({ "personal": { "name": "Ada\u{0}" } });
        let (status, body) = send_json(&app, post_req("/api/resume", ADA, &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("NUL"));
    }

    #[tokio::test]
    async fn test_preview_renders_saved_resume() {
        let app = build_router(test_state());
        let (status, _) = send(&app, get_req("/api/resume/preview", Some(ADA))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send_json(&app, post_req("/api/resume", ADA, &full_resume())).await;
        let (status, html) = send(&app, get_req("/api/resume/preview", Some(ADA))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<h1>Ada Lovelace</h1>"));
        assert!(!html.contains("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn test_export_is_paywalled() {
        let state = test_state();
        let app = build_router(state.clone());
        send_json(&app, post_req("/api/resume", ADA, &full_resume())).await;

        let (status, body) = send_json(&app, get_req("/api/resume/export", Some(ADA))).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"]["code"], "PAYMENT_REQUIRED");

        state
            .subscriptions
            .record_checkout("user_ada", Some("cus_1"), Some("sub_1"))
            .await
            .unwrap();
        let (status, html) = send(&app, get_req("/api/resume/export", Some(ADA))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn test_subscription_status() {
        let state = test_state();
        let app = build_router(state.clone());
        let (status, body) = send_json(&app, get_req("/api/subscription", Some(ADA))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], false);
        assert!(body["status"].is_null());

        state
            .subscriptions
            .record_checkout("user_ada", None, Some("sub_1"))
            .await
            .unwrap();
        let (_, body) = send_json(&app, get_req("/api/subscription", Some(ADA))).await;
        assert_eq!(body["active"], true);
        assert_eq!(body["status"], "active");
    }

    #[tokio::test]
    async fn test_checkout_session_created_once() {
        let state = test_state();
        let app = build_router(state.clone());
        let (status, body) =
            send_json(&app, post_req("/api/checkout", ADA, &json!({ "email": "ada@example.com" })))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "cs_test_user_ada");
        assert!(body["url"].as_str().unwrap().starts_with("https://"));

        state
            .subscriptions
            .record_checkout("user_ada", None, Some("sub_1"))
            .await
            .unwrap();
        let (status, _) = send_json(&app, post_req("/api/checkout", ADA, &json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_checkout_without_body() {
        let app = build_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/checkout")
            .header("authorization", format!("Bearer {GRACE}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "cs_test_user_grace");
    }

    #[tokio::test]
    async fn test_webhook_rejects_unsigned() {
        let app = build_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/webhooks/stripe")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_WEBHOOK");
    }

    #[tokio::test]
    async fn test_signed_webhook_unlocks_export() {
        let state = test_state();
        let app = build_router(state.clone());
        send_json(&app, post_req("/api/resume", GRACE, &full_resume())).await;

        let payload = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "client_reference_id": "user_grace",
                "payment_status": "paid",
                "customer": "cus_2",
                "subscription": "sub_2"
            } }
        })
        .to_string();
        let signature = sign(
            payload.as_bytes(),
            &state.config.stripe_webhook_secret,
            chrono::Utc::now().timestamp(),
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/webhooks/stripe")
            .header("stripe-signature", signature)
            .body(Body::from(payload))
            .unwrap();
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);

        let (status, _) = send(&app, get_req("/api/resume/export", Some(GRACE))).await;
        assert_eq!(status, StatusCode::OK);
    }
}
