#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use homeservices_backend::app::{create_app, AppState};
use homeservices_backend::auth::Claims;
use homeservices_backend::config::Settings;
use homeservices_backend::realtime::RoomHub;
use homeservices_backend::repository::InMemoryStore;

pub const SECRET: &str = "integration-test-secret";

pub fn state() -> Arc<AppState> {
    let settings = Settings::local(SECRET);
    let hub = RoomHub::new(settings.ws_broadcast_capacity);
    AppState::new(Arc::new(InMemoryStore::new()), settings, hub, None)
}

pub fn app() -> Router {
    create_app(state())
}

pub fn token_for(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: Utc::now().timestamp() + 3600,
        iat: Some(Utc::now().timestamp()),
        iss: None,
        email: Some(format!("{}@example.com", user_id.simple())),
        role: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Send a JSON request and return the status with the decoded body
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub async fn register_provider(app: &Router, user: Uuid, name: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/providers",
        Some(user),
        Some(json!({ "businessName": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["provider"].clone()
}

/// Checkout worth 1000 (two lines of 500) collecting bids
pub fn checkout() -> Value {
    json!({
        "address": "12 Lake Road",
        "city": "Pune",
        "scheduledDate": "2026-11-02",
        "scheduledTime": "10:00",
        "services": [{ "title": "Deep cleaning", "price": 500, "quantity": 2 }]
    })
}

pub async fn place_order(app: &Router, customer: Uuid) -> Value {
    let (status, body) = call(app, Method::POST, "/orders", Some(customer), Some(checkout())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["order"].clone()
}

pub fn id(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}
