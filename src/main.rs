use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pgpeek::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment variables win
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let settings = Settings::parse();
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "pgpeek starting: RUST_LOG='{}', bind={}, http_port={}, default_target={}:{}, secure_cookies={}",
        rust_log, settings.bind, settings.http_port, settings.default_host, settings.default_port, settings.secure_cookies
    );

    pgpeek::server::run(settings).await
}
