use contact_mailer::configuration::get_configuration;
use contact_mailer::startup::Application;
use contact_mailer::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber(
        "contact_mailer".into(),
        "info".into(),
        std::io::stdout,
    );
    init_subscriber(subscriber);

    let configuration = get_configuration()
        .expect("Failed to read configuration");
    let application = Application::build(configuration)?;
    application.run_until_stopped().await?;
    Ok(())
}
