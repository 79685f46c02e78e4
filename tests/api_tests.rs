mod common;

use common::*;
use headscale_admin::{AppState, create_router, data_service::Table};
use reqwest::{StatusCode, redirect::Policy};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
}

async fn spawn_app(state: AppState) -> TestApp {
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address }
}

fn client() -> reqwest::Client {
    // Guard redirects are asserted, not followed.
    reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let backend = backend();
    let app = spawn_app(state_for(&backend)).await;

    let response = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let backend = backend();
    let app = spawn_app(state_for(&backend)).await;

    let doc: Value = client()
        .get(format!("{}/api-docs/openapi.json", app.address))
        .send()
        .await
        .expect("req fail")
        .json()
        .await
        .unwrap();

    let paths = doc["paths"].as_object().unwrap();
    assert!(paths.contains_key("/session"));
    assert!(paths.contains_key("/users/{id}"));
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let backend = backend();
    let app = spawn_app(state_for(&backend)).await;

    let response = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_console_lifecycle() {
    let backend = backend();
    let state = started_state(&backend).await;
    let app = spawn_app(state.clone()).await;
    let client = client();
    backend.seed(
        Table::Nodes,
        [node_row(1, &user_identity(), "laptop", "100.64.0.2", CREATED_AT)],
    );

    // Anonymous
    let session: Value = client
        .get(format!("{}/session", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["state"], "anonymous");

    // Sign in as a plain user
    let response = client
        .post(format!("{}/auth/sign-in", app.address))
        .json(&json!({ "email": USER_EMAIL, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["is_admin"], false);
    let routes: Vec<&str> = session["navigation"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|link| link["route"].as_str())
        .collect();
    assert!(!routes.contains(&"/users"));

    // Add a route, then enable it
    let response = client
        .post(format!("{}/routes", app.address))
        .json(&json!({ "node_id": 1, "route": "10.10.0.0/16" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let view: Value = response.json().await.unwrap();
    assert_eq!(view["routes"][0]["node_name"], "laptop");
    assert_eq!(view["routes"][0]["route"]["enabled"], false);

    let id = view["routes"][0]["route"]["id"].as_i64().unwrap();
    let view: Value = client
        .patch(format!("{}/routes/{}/toggle", app.address, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["routes"][0]["route"]["enabled"], true);

    // Admin pages redirect
    let response = client
        .get(format!("{}/users", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // Sign out
    let response: Value = client
        .post(format!("{}/auth/sign-out", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["redirect"], "/login");
    settle_anonymous(&state.session).await;

    let response = client
        .get(format!("{}/nodes", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    state.session.shutdown().await;
}
