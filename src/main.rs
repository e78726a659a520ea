use anyhow::Context;

use entra_aws_auth::aws::StsExchange;
use entra_aws_auth::chrome::ChromeBrowser;
use entra_aws_auth::credentials::CredentialsFile;
use entra_aws_auth::session::LoginSession;
use entra_aws_auth::settings::Settings;
use entra_aws_auth::ui;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("Failed to load settings")?;
    log::debug!("tenant: {}", settings.tenant_id);

    let browser = ChromeBrowser::locate(settings.chrome_path.as_deref())?;
    let store = CredentialsFile::new(settings.credentials_path()?);
    let exchange = StsExchange::new(&settings.region, settings.session_duration_secs).await;

    println!("Complete the sign-in in the browser window.");
    let outcome = LoginSession::new(&settings, &browser, &exchange, &store)
        .run()
        .await
        .context("Login failed")?;

    ui::print_summary(&outcome);
    Ok(())
}
