pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod email_dispatcher;
pub mod rate_limiter;
pub mod routes;
pub mod startup;
pub mod telemetry;
