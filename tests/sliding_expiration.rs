mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use domainauth::error::AuthError;
use domainauth::models::auth::TokenKind;
use domainauth::models::user::NewUser;
use domainauth::services::credentials::CredentialStore;
use domainauth::services::session_cache::token_key;

use common::test_app;

#[tokio::test(start_paused = true)]
async fn activity_keeps_the_session_alive_and_idleness_ends_it() {
    let app = test_app().await;
    let sessions = app.state.sessions.clone();
    let user = app
        .store
        .create_user(NewUser {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let pair = sessions.issue_token_pair(&user).await.unwrap();
    let claims = sessions.parse_token(&pair.access_token, TokenKind::Access).unwrap();

    // Use at 9 minutes renews the ten minute window.
    tokio::time::advance(Duration::from_secs(9 * 60)).await;
    sessions.validate_token(&claims, false).await.unwrap();
    sessions.renew(user.id).await.unwrap();

    // Past the first deadline, still inside the renewed one.
    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    sessions.validate_token(&claims, false).await.unwrap();

    // No further activity: the pair lapses while the JWT itself is unexpired.
    tokio::time::advance(Duration::from_secs(10 * 60)).await;
    assert_eq!(
        sessions.validate_token(&claims, false).await.unwrap_err(),
        AuthError::TokenExpired
    );
    assert_eq!(app.cache.ttl(&token_key(user.id)).await, None);
}

#[tokio::test(start_paused = true)]
async fn renewing_a_lapsed_session_does_not_revive_it() {
    let app = test_app().await;
    let sessions = app.state.sessions.clone();
    let user = app
        .store
        .create_user(NewUser {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let pair = sessions.issue_token_pair(&user).await.unwrap();
    let refresh = sessions.parse_token(&pair.refresh_token, TokenKind::Refresh).unwrap();

    tokio::time::advance(Duration::from_secs(11 * 60)).await;
    sessions.renew(user.id).await.unwrap();

    assert_eq!(
        sessions.validate_token(&refresh, true).await.unwrap_err(),
        AuthError::TokenExpired
    );
}

/// Let the renewal the session extractor spawned run to completion.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn authenticated_requests_slide_the_window() {
    let app = test_app().await;
    let (status, _) = app
        .call(
            "POST",
            "/register",
            None,
            None,
            Some(json!({ "name": "Ada", "email": "ada@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app
        .call(
            "POST",
            "/login",
            None,
            None,
            Some(json!({ "email": "ada@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"].as_str().unwrap().to_string();

    tokio::time::advance(Duration::from_secs(9 * 60)).await;
    let (status, _) = app.call("GET", "/me", Some(&token), None, None).await;
    assert_eq!(status, StatusCode::OK);
    settle().await;

    // Past the login-time deadline; alive only because of the request at 9m.
    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    let (status, _) = app.call("GET", "/me", Some(&token), None, None).await;
    assert_eq!(status, StatusCode::OK);
    settle().await;

    tokio::time::advance(Duration::from_secs(10 * 60)).await;
    let (status, body) = app.call("GET", "/me", Some(&token), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"].as_u64(), Some(100006));
}
