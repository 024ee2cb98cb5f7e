use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use worklocus::cli::{parse_flag, parse_port_arg};
use worklocus::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::from_env();
    if let Some(port) = parse_port_arg(&args, "--port") { config.http_port = port; }
    if let Some(api) = parse_flag(&args, "--api") { config.api.base_url = api; }
    if let Some(frontend) = parse_flag(&args, "--frontend") { config.frontend_url = Some(frontend); }

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "worklocus",
        "WorkLocus gateway starting: RUST_LOG='{}', http_port={}, api='{}', frontend={:?}, secure_cookies={}, routes={}",
        rust_log,
        config.http_port,
        config.api.base_url,
        config.frontend_url,
        config.gate.secure_cookies,
        config.gate.permissions.entries().len()
    );

    worklocus::server::run(config).await
}
