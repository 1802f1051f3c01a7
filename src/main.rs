use anyhow::Context;

use ferry::SessionManager;
use ferry::config::Settings;
use ferry::ssh::ConnectRequest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with file output.
    let log_dir = ferry::config::paths::ensure_log_dir().ok();
    let _guard = ferry::logging::init_logging(log_dir);

    tracing::info!("Starting Ferry");
    if let Some(dir) = ferry::config::paths::log_dir() {
        tracing::info!("Logging to {}", dir.display());
    }

    let settings = Settings::load().context("Failed to load settings")?;
    let manager = SessionManager::with_settings(settings)?;

    let mut args = std::env::args().skip(1);
    let Some(alias) = args.next() else {
        let (profiles, default_user) = manager.list_profiles()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "hosts": profiles,
                "default_user": default_user,
            }))?
        );
        return Ok(());
    };
    let path = args.next();

    let info = manager
        .connect(ConnectRequest::alias(&alias))
        .await
        .with_context(|| format!("Failed to connect to '{}'", alias))?;
    tracing::info!("Connected to {} as {}", info.host_label, info.username);

    let listing = manager.list(path.as_deref()).await;
    manager.disconnect().await;

    let listing = listing.with_context(|| {
        format!(
            "Failed to list {}",
            path.as_deref().unwrap_or("home directory")
        )
    })?;
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
