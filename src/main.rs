use clap::Parser;
use research_gateway::config::ServerConfig;
use research_gateway::gateway::{router, AppState};
use research_gateway::model::DeploymentMode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "research-gateway", version, about = "Credential-injecting proxy for LLM providers")]
struct Cli {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// `proxy`: callers send access tokens and the server key is used.
    /// `local`: callers send their own provider keys.
    #[arg(long, env = "DEPLOYMENT_MODE", default_value = "proxy")]
    mode: DeploymentMode,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("research_gateway=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env()
        .with_listen(cli.host, cli.port)
        .with_mode(cli.mode);

    info!(config = ?config, "Configuration loaded");
    if config.mode == DeploymentMode::Proxy && config.access_password.is_empty() {
        warn!("ACCESS_PASSWORD is not set; proxy access control is disabled");
    }

    let addr = config.listen_addr();
    let app = router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Research gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
