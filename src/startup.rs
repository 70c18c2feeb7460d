use std::net::TcpListener;

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::http::header;
use actix_web::web::Data;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::email_client::SmtpMailTransport;
use crate::email_dispatcher::EmailDispatcher;
use crate::rate_limiter::{spawn_purge_task, RateLimiter};
use crate::routes;
use crate::routes::contact::ContactSettings;

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    /// Wire the SMTP transport, worker pool and rate limiter, and bind the listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(configuration: Settings) -> Result<Self, anyhow::Error> {
        let sender_email = configuration
            .email_client
            .sender()
            .map_err(anyhow::Error::msg)
            .context("Invalid sender email address")?;
        let admin_email = configuration
            .email_client
            .admin()
            .map_err(anyhow::Error::msg)
            .context("Invalid admin email address")?;
        let transport = SmtpMailTransport::new(&configuration.email_client, sender_email)
            .context("Failed to build the SMTP transport")?;
        let dispatcher = EmailDispatcher::start(transport, admin_email, &configuration.dispatcher);

        let rate_limiter = RateLimiter::new(configuration.rate_limit.policy());
        spawn_purge_task(rate_limiter.clone(), configuration.rate_limit.purge_interval());

        let address = format!(
            "{}:{}",
            configuration.application.host, configuration.application.port
        );
        let listener = TcpListener::bind(&address)
            .with_context(|| format!("Failed to bind {}", address))?;
        let port = listener.local_addr()?.port();
        tracing::info!(%address, "Listening for contact requests");

        let settings = ContactSettings {
            validation: configuration.validation,
            trust_forwarded_headers: configuration.application.trust_forwarded_headers,
        };
        let server = run(
            listener,
            rate_limiter,
            dispatcher,
            settings,
            configuration.application.allowed_origins,
        )?;
        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(
    listener: TcpListener,
    rate_limiter: RateLimiter,
    dispatcher: EmailDispatcher,
    settings: ContactSettings,
    allowed_origins: Vec<String>,
) -> Result<Server, std::io::Error> {
    let rate_limiter = Data::new(rate_limiter);
    let dispatcher = Data::new(dispatcher);
    let settings = Data::new(settings);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(cors(&allowed_origins))
            .wrap(TracingLogger::default())
            .route("/health", web::get().to(routes::health_check::health_check))
            .route("/contact", web::post().to(routes::contact::contact))
            .route("/web/email-django", web::post().to(routes::contact::contact))
            .app_data(rate_limiter.clone())
            .app_data(dispatcher.clone())
            .app_data(settings.clone())
    })
    .listen(listener)?
    .run();
    Ok(server)
}

/// Cross-origin access for the browser front ends listed in `allowed_origins`.
fn cors(allowed_origins: &[String]) -> Cors {
    allowed_origins.iter().fold(
        Cors::default()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
            .max_age(3600),
        |cors, origin| cors.allowed_origin(origin),
    )
}
