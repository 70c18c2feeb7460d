use crate::helpers::{spawn_app, spawn_app_with, valid_payload, Outbox, StalledTransport};
use contact_mailer::email_client::EmailBody;
use std::time::Duration;

#[tokio::test]
async fn contact_returns_201_for_a_valid_payload() {
    let app = spawn_app().await;

    let response = app.post_contact(&valid_payload()).await;

    assert_eq!(201, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "message": "Correo(s) enviado(s) con éxito" })
    );
}

#[tokio::test]
async fn contact_sends_an_admin_notice_and_a_sender_confirmation() {
    let app = spawn_app().await;

    app.post_contact(&valid_payload()).await;

    let sent = app.wait_for_emails(2).await;
    assert_eq!(app.settled_emails().await.len(), 2);

    let notice = sent
        .iter()
        .find(|job| job.recipient.as_ref() == "contacto@example.com")
        .expect("No admin notice was sent");
    assert_eq!(notice.subject, "Nuevo mensaje de contacto: Hi");
    match &notice.body {
        EmailBody::Plain(body) => {
            assert!(body.contains("Nombre: A"));
            assert!(body.contains("Email: a@x.com"));
            assert!(body.contains("Hello"));
        }
        other => panic!("Expected a plain text notice, got {:?}", other),
    }

    let confirmation = sent
        .iter()
        .find(|job| job.recipient.as_ref() == "a@x.com")
        .expect("No confirmation was sent to the sender");
    assert_eq!(confirmation.subject, "Confirmación de recepción de mensaje");
    assert!(matches!(confirmation.body, EmailBody::Html(_)));
}

#[tokio::test]
async fn contact_returns_400_when_data_is_missing() {
    let app = spawn_app().await;
    let test_cases = vec![
        (
            serde_json::json!({"name": "A", "subject": "Hi", "message": "Hello"}),
            "email",
            "missing the email",
        ),
        (
            serde_json::json!({"email": "a@x.com", "subject": "Hi", "message": "Hello"}),
            "name",
            "missing the name",
        ),
        (serde_json::json!({}), "message", "missing everything"),
    ];

    for (invalid_body, field, description) in test_cases {
        let response = app.post_contact(&invalid_body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when the payload was {}.",
            description
        );
        let errors: serde_json::Value = response.json().await.unwrap();
        assert_eq!(
            errors[field],
            serde_json::json!(["This field is required."]),
            "The error body did not reference `{}` when the payload was {}.",
            field,
            description
        );
    }

    assert!(app.settled_emails().await.is_empty());
}

#[tokio::test]
async fn contact_returns_400_when_fields_are_present_but_invalid() {
    let app = spawn_app().await;
    let test_cases = vec![
        ("name", serde_json::json!(""), "empty name"),
        ("email", serde_json::json!(""), "empty email"),
        ("email", serde_json::json!("not-an-email"), "invalid email"),
        ("subject", serde_json::json!("Hi\r\nBcc: x@y.com"), "multi-line subject"),
        ("message", serde_json::json!("a".repeat(5001)), "overlong message"),
        ("name", serde_json::json!({"first": "A"}), "object as name"),
    ];

    for (field, value, description) in test_cases {
        let mut payload = valid_payload();
        payload[field] = value;

        let response = app.post_contact(&payload).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not return a 400 Bad Request when the payload was {}.",
            description
        );
        let errors: serde_json::Value = response.json().await.unwrap();
        assert!(
            errors.get(field).is_some(),
            "The error body did not reference `{}` when the payload was {}: {}",
            field,
            description,
            errors
        );
    }

    assert!(app.settled_emails().await.is_empty());
}

#[tokio::test]
async fn an_invalid_email_is_reported_on_the_email_field() {
    let app = spawn_app().await;
    let mut payload = valid_payload();
    payload["email"] = serde_json::json!("not-an-email");

    let response = app.post_contact(&payload).await;

    assert_eq!(400, response.status().as_u16());
    let errors: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        errors,
        serde_json::json!({ "email": ["Enter a valid email address."] })
    );
}

#[tokio::test]
async fn a_body_that_is_not_json_is_rejected() {
    let app = spawn_app().await;

    let response = app.post_raw_contact("name=A&email=a%40x.com").await;

    assert_eq!(400, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("JSON parse error"));
}

#[tokio::test]
async fn a_second_request_within_a_minute_is_rate_limited() {
    let app = spawn_app().await;

    let first = app.post_contact(&valid_payload()).await;
    app.clock.advance(Duration::from_secs(15));
    let second = app.post_contact(&valid_payload()).await;

    assert_eq!(201, first.status().as_u16());
    assert_eq!(429, second.status().as_u16());
    assert_eq!(second.headers().get("Retry-After").unwrap(), "45");
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "detail": "rate limit exceeded", "retry_after": 45 })
    );

    // Only the first request produced emails.
    app.wait_for_emails(2).await;
    assert_eq!(app.settled_emails().await.len(), 2);
}

#[tokio::test]
async fn a_request_is_accepted_again_once_the_window_elapses() {
    let app = spawn_app().await;

    assert_eq!(201, app.post_contact(&valid_payload()).await.status().as_u16());
    assert_eq!(429, app.post_contact(&valid_payload()).await.status().as_u16());

    app.clock.advance(Duration::from_secs(60));

    assert_eq!(201, app.post_contact(&valid_payload()).await.status().as_u16());
    assert_eq!(app.wait_for_emails(4).await.len(), 4);
}

#[tokio::test]
async fn different_clients_are_rate_limited_independently() {
    let app = spawn_app().await;
    let payload = valid_payload();

    let (first, second) = tokio::join!(
        app.post_contact_from("203.0.113.1", &payload),
        app.post_contact_from("203.0.113.2", &payload),
    );
    assert_eq!(201, first.status().as_u16());
    assert_eq!(201, second.status().as_u16());

    let (first, second) = tokio::join!(
        app.post_contact_from("203.0.113.1", &payload),
        app.post_contact_from("203.0.113.2", &payload),
    );
    assert_eq!(429, first.status().as_u16());
    assert_eq!(429, second.status().as_u16());
}

#[tokio::test]
async fn rotating_a_spoofed_first_hop_does_not_evade_the_limit() {
    let app = spawn_app().await;
    let payload = valid_payload();

    let mut statuses = Vec::new();
    for i in 0..5 {
        let forwarded_for = format!("10.9.9.{}, 198.51.100.7", i);
        let response = app.post_contact_from(&forwarded_for, &payload).await;
        statuses.push(response.status().as_u16());
    }

    assert_eq!(statuses, vec![201, 429, 429, 429, 429]);
}

#[tokio::test]
async fn a_saturated_mail_queue_returns_503() {
    let app = spawn_app_with(StalledTransport, Outbox::default(), |config| {
        config.dispatcher.workers = 1;
        config.dispatcher.queue_capacity = 2;
    })
    .await;
    let payload = valid_payload();

    // Fills the queue: the worker stalls on one job, the other stays queued.
    let accepted = app.post_contact_from("203.0.113.1", &payload).await;
    let rejected = app.post_contact_from("203.0.113.2", &payload).await;

    assert_eq!(201, accepted.status().as_u16());
    assert_eq!(503, rejected.status().as_u16());
    assert_eq!(rejected.headers().get("Retry-After").unwrap(), "5");
    let body: serde_json::Value = rejected.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "detail": "The mail queue is unavailable, please try again later" })
    );

    // The rate limit slot was taken before the queue refused the emails.
    let retried = app.post_contact_from("203.0.113.2", &payload).await;
    assert_eq!(429, retried.status().as_u16());
}

#[tokio::test]
async fn a_concurrent_burst_from_one_client_admits_a_single_request() {
    let app = spawn_app().await;

    let responses = burst_from_one_client(&app, 8).await;
    let created = responses.iter().filter(|status| **status == 201).count();
    let limited = responses.iter().filter(|status| **status == 429).count();

    assert_eq!(created, 1);
    assert_eq!(limited, 7);
    assert_eq!(app.settled_emails().await.len(), 2);
}

#[tokio::test]
async fn invalid_payloads_do_not_consume_the_rate_limit() {
    let app = spawn_app().await;
    let mut invalid = valid_payload();
    invalid["email"] = serde_json::json!("not-an-email");

    assert_eq!(400, app.post_contact(&invalid).await.status().as_u16());
    assert_eq!(201, app.post_contact(&valid_payload()).await.status().as_u16());
}

#[tokio::test]
async fn the_legacy_path_shares_the_same_limit() {
    let app = spawn_app().await;

    let legacy = app
        .post_contact_at("/web/email-django", &valid_payload(), None)
        .await;
    let current = app.post_contact(&valid_payload()).await;

    assert_eq!(201, legacy.status().as_u16());
    assert_eq!(429, current.status().as_u16());
}

async fn burst_from_one_client(app: &crate::helpers::TestApp, n: usize) -> Vec<u16> {
    let mut handles = Vec::with_capacity(n);
    for _ in 0..n {
        let client = app.api_client.clone();
        let url = format!("{}/contact", &app.address);
        handles.push(tokio::spawn(async move {
            client
                .post(&url)
                .header("X-Forwarded-For", "198.51.100.7")
                .json(&crate::helpers::valid_payload())
                .send()
                .await
                .expect("Failed to execute request.")
                .status()
                .as_u16()
        }));
    }
    let mut statuses = Vec::with_capacity(n);
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }
    statuses
}
