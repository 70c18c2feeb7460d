use std::fmt::Formatter;
use std::net::{IpAddr, SocketAddr};

use actix_web::body::BoxBody;
use actix_web::http::header::{FORWARDED, RETRY_AFTER};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use crate::domain::{ContactMessage, ValidationError, ValidationSettings};
use crate::email_dispatcher::{DispatchError, EmailDispatcher};
use crate::rate_limiter::{RateLimitExceeded, RateLimiter};

pub const SUCCESS_MESSAGE: &str = "Correo(s) enviado(s) con éxito";

/// Seconds suggested to clients when the mail queue is saturated.
const QUEUE_RETRY_AFTER_SECS: u64 = 5;

/// Per-request knobs of the contact endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ContactSettings {
    pub validation: ValidationSettings,
    pub trust_forwarded_headers: bool,
}

#[derive(thiserror::Error)]
pub enum ContactError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("JSON parse error - {0}")]
    MalformedBody(#[source] serde_json::Error),
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
    #[error("The mail queue is unavailable, please try again later")]
    MailQueueUnavailable(#[from] DispatchError),
}

impl std::fmt::Debug for ContactError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for ContactError {
    fn status_code(&self) -> StatusCode {
        match self {
            ContactError::Validation(_) | ContactError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ContactError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ContactError::MailQueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        let mut response = HttpResponse::build(self.status_code());
        match self {
            ContactError::Validation(errors) => response.json(errors),
            ContactError::MalformedBody(_) => response.json(serde_json::json!({
                "detail": self.to_string()
            })),
            ContactError::RateLimited(e) => {
                let retry_after = e.retry_after_secs();
                response
                    .insert_header((RETRY_AFTER, retry_after.to_string()))
                    .json(serde_json::json!({
                        "detail": "rate limit exceeded",
                        "retry_after": retry_after
                    }))
            }
            ContactError::MailQueueUnavailable(_) => response
                .insert_header((RETRY_AFTER, QUEUE_RETRY_AFTER_SECS.to_string()))
                .json(serde_json::json!({
                    "detail": self.to_string()
                })),
        }
    }
}

#[tracing::instrument(
    name = "Submit a contact message",
    skip(request, body, rate_limiter, dispatcher, settings),
    fields(client_key = tracing::field::Empty, sender_email = tracing::field::Empty)
)]
pub async fn contact(
    request: HttpRequest,
    body: web::Bytes,
    rate_limiter: web::Data<RateLimiter>,
    dispatcher: web::Data<EmailDispatcher>,
    settings: web::Data<ContactSettings>,
) -> Result<HttpResponse, ContactError> {
    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(ContactError::MalformedBody)?;
    let message = ContactMessage::parse(&payload, &settings.validation)?;
    tracing::Span::current().record(
        "sender_email",
        &tracing::field::display(message.sender_email()),
    );

    let client_key = client_key(&request, settings.trust_forwarded_headers);
    tracing::Span::current().record("client_key", &tracing::field::display(&client_key));
    rate_limiter.check(&client_key)?;

    dispatcher.dispatch(&message)?;

    Ok(HttpResponse::Created().json(serde_json::json!({ "message": SUCCESS_MESSAGE })))
}

/// The identity requests are rate limited by: the client IP address.
fn client_key(request: &HttpRequest, trust_forwarded_headers: bool) -> String {
    if trust_forwarded_headers {
        if let Some(address) = last_forwarded_hop(request) {
            return address;
        }
    }
    request
        .peer_addr()
        .map(|address| address.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The address appended by the proxy in front of us.
///
/// Earlier hops are written by the client and cannot be trusted.
fn last_forwarded_hop(request: &HttpRequest) -> Option<String> {
    let headers = request.headers();
    let x_forwarded_for = headers
        .get_all("x-forwarded-for")
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .last();
    let hop = match x_forwarded_for {
        Some(hop) => hop,
        None => headers
            .get_all(FORWARDED)
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .filter_map(|element| {
                element.split(';').find_map(|pair| {
                    let (name, value) = pair.trim().split_once('=')?;
                    if name.trim().eq_ignore_ascii_case("for") {
                        Some(value.trim().trim_matches('"'))
                    } else {
                        None
                    }
                })
            })
            .last()?,
    };
    Some(normalise_address(hop))
}

fn normalise_address(hop: &str) -> String {
    if let Ok(address) = hop.parse::<SocketAddr>() {
        return address.ip().to_string();
    }
    hop.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| hop.to_string())
}

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}
