use crate::helpers::{spawn_app, valid_payload};

#[tokio::test]
async fn a_preflight_from_an_allowed_origin_is_accepted() {
    let app = spawn_app().await;

    let response = app.preflight_contact("http://localhost:5173").await;

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("Access-Control-Allow-Origin")
            .unwrap(),
        "http://localhost:5173"
    );
}

#[tokio::test]
async fn a_preflight_from_an_unknown_origin_is_not_allowed() {
    let app = spawn_app().await;

    let response = app.preflight_contact("https://evil.example.com").await;

    assert!(response
        .headers()
        .get("Access-Control-Allow-Origin")
        .is_none());
}

#[tokio::test]
async fn a_cross_origin_post_carries_the_allow_origin_header() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .post(&format!("{}/contact", &app.address))
        .header("Origin", "http://localhost:3000")
        .json(&valid_payload())
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(201, response.status().as_u16());
    assert_eq!(
        response
            .headers()
            .get("Access-Control-Allow-Origin")
            .unwrap(),
        "http://localhost:3000"
    );
}
