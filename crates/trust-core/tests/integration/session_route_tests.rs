//! Session-protected routes exercised through an axum router.

use crate::support::{self, TestCore};
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceExt;
use trust_core::errors::TrustError;
use trust_core::middleware::{require_admin, require_session};
use trust_core::session::{InMemoryDenylist, SessionClaims, SessionDenylist};
use trust_core::TrustCore;
use trust_test_utils::{TestIdentityTokenBuilder, TEST_ADMIN_SUBJECT, TEST_USER_SUBJECT};

#[derive(Clone)]
struct AppState {
    core: TrustCore,
    denylist: Arc<InMemoryDenylist>,
}

#[derive(Serialize, Deserialize)]
struct SignInRequest {
    identity_token: String,
}

#[derive(Serialize, Deserialize)]
struct SessionResponse {
    session_token: String,
}

async fn sign_in(
    State(app): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<SessionResponse>, TrustError> {
    let session = app.core.sign_in(&request.identity_token).await?;
    Ok(Json(SessionResponse {
        session_token: session.into_token_string(),
    }))
}

async fn me(Extension(claims): Extension<SessionClaims>) -> String {
    claims.subject().to_string()
}

async fn refresh(
    State(app): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<SessionResponse>, TrustError> {
    let session = app.core.sessions.refresh_token(&claims)?;
    Ok(Json(SessionResponse {
        session_token: session.into_token_string(),
    }))
}

async fn logout(
    State(app): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<StatusCode, TrustError> {
    app.denylist.revoke(&claims).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn router(test: &TestCore) -> (Router, Arc<InMemoryDenylist>) {
    let denylist = Arc::new(InMemoryDenylist::new());
    let auth = test
        .core
        .session_auth_state(Some(Arc::clone(&denylist) as Arc<dyn SessionDenylist>));

    let app = Router::new()
        .route("/me", get(me))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&auth), require_session))
        .route(
            "/admin/me",
            get(me).route_layer(middleware::from_fn_with_state(auth, require_admin)),
        )
        .route("/auth/sign-in", post(sign_in))
        .with_state(AppState {
            core: test.core.clone(),
            denylist: Arc::clone(&denylist),
        });

    (app, denylist)
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Body) -> Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn body_json<T: for<'de> Deserialize<'de>>(response: Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn sign_in_as(test: &TestCore, app: &Router, subject: &str) -> String {
    let identity_token = TestIdentityTokenBuilder::new()
        .for_subject(subject)
        .sign_with(&test.idp_key);
    let request = serde_json::to_vec(&SignInRequest { identity_token }).unwrap();

    let response = send(app, "POST", "/auth/sign-in", None, Body::from(request)).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json::<SessionResponse>(response).await.session_token
}

#[tokio::test]
async fn test_sign_in_then_access_protected_route() -> Result<(), anyhow::Error> {
    let test = support::start().await?;
    let (app, _) = router(&test);

    let session = sign_in_as(&test, &app, TEST_USER_SUBJECT).await;
    let response = send(&app, "GET", "/me", Some(&session), Body::empty()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, TEST_USER_SUBJECT);
    Ok(())
}

#[tokio::test]
async fn test_invalid_identity_token_is_unauthorized() -> Result<(), anyhow::Error> {
    let test = support::start().await?;
    let (app, _) = router(&test);

    let request = serde_json::to_vec(&SignInRequest {
        identity_token: "not.a.token".to_string(),
    })?;
    let response = send(&app, "POST", "/auth/sign-in", None, Body::from(request)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    Ok(())
}

#[tokio::test]
async fn test_admin_route_requires_admin() -> Result<(), anyhow::Error> {
    let test = support::start().await?;
    let (app, _) = router(&test);

    let user = sign_in_as(&test, &app, TEST_USER_SUBJECT).await;
    let admin = sign_in_as(&test, &app, TEST_ADMIN_SUBJECT).await;

    let response = send(&app, "GET", "/admin/me", Some(&user), Body::empty()).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, "GET", "/admin/me", Some(&admin), Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, TEST_ADMIN_SUBJECT);

    let response = send(&app, "GET", "/admin/me", None, Body::empty()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_refresh_returns_working_token() -> Result<(), anyhow::Error> {
    let test = support::start().await?;
    let (app, _) = router(&test);

    let original = sign_in_as(&test, &app, TEST_ADMIN_SUBJECT).await;
    let response = send(&app, "POST", "/auth/refresh", Some(&original), Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = body_json::<SessionResponse>(response).await.session_token;

    assert_ne!(refreshed, original);
    for token in [&original, &refreshed] {
        let response = send(&app, "GET", "/me", Some(token), Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    Ok(())
}

#[tokio::test]
async fn test_logout_revokes_only_that_session() -> Result<(), anyhow::Error> {
    let test = support::start().await?;
    let (app, denylist) = router(&test);

    let first = sign_in_as(&test, &app, TEST_USER_SUBJECT).await;
    let second = sign_in_as(&test, &app, TEST_USER_SUBJECT).await;

    let response = send(&app, "POST", "/auth/logout", Some(&first), Body::empty()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(denylist.len().await, 1);

    let response = send(&app, "GET", "/me", Some(&first), Body::empty()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, "GET", "/me", Some(&second), Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_session_from_another_issuer_is_rejected() -> Result<(), anyhow::Error> {
    let ours = support::start().await?;
    let theirs = support::start_with(|vars| {
        vars.insert("SESSION_ISSUER".to_string(), "other-api".to_string());
    })
    .await?;
    let (app, _) = router(&ours);
    let (their_app, _) = router(&theirs);

    let foreign = sign_in_as(&theirs, &their_app, TEST_USER_SUBJECT).await;
    let response = send(&app, "GET", "/me", Some(&foreign), Body::empty()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
